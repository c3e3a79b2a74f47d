//! Native functions seeded into every module-root scope.

use conch_types::{ErrorCode, RuntimeError};

use crate::object::{
    is_truthy, obj_len, print_value, str_value, KwArgs, ObjectFactory, ObjectRef,
};

use super::{ExecCtx, SymbolTableStack};

/// Register the native functions into a module-root scope.
pub(crate) fn register_into(factory: &ObjectFactory, stack: &SymbolTableStack) {
    stack.insert_top("print", factory.new_native_func("print", native_print));
    stack.insert_top("len", factory.new_native_func("len", native_len));
    stack.insert_top("assert", factory.new_native_func("assert", native_assert));
}

/// `print(args...)`: space-joined print forms plus a newline, to stdout.
fn native_print(
    ctx: &ExecCtx<'_>,
    args: Vec<ObjectRef>,
    _kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in &args {
        parts.push(print_value(ctx, arg)?);
    }
    println!("{}", parts.join(" "));
    Ok(ctx.factory.new_null())
}

/// `len(x)`: length of a string, container, or `__len__`-bearing instance.
fn native_len(
    ctx: &ExecCtx<'_>,
    args: Vec<ObjectRef>,
    _kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::new(
            ErrorCode::FuncParams,
            "len() takes exactly 1 argument",
        ));
    }
    let length = obj_len(ctx, &args[0])?;
    Ok(ctx.factory.new_int(length))
}

/// `assert(cond)` / `assert(cond, msg)`: raise ASSERT when falsy.
fn native_assert(
    ctx: &ExecCtx<'_>,
    args: Vec<ObjectRef>,
    _kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::new(
            ErrorCode::FuncParams,
            "assert() takes 1 or 2 arguments",
        ));
    }
    if is_truthy(ctx, &args[0])? {
        return Ok(ctx.factory.new_null());
    }
    let message = match args.get(1) {
        Some(msg) => str_value(ctx, msg)?,
        None => "assertion failed".to_string(),
    };
    Err(RuntimeError::new(ErrorCode::Assert, message))
}
