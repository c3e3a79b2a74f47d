//! Calling things: functions, wrappers, constructors, callable instances.

use std::rc::Rc;

use conch_types::{ErrorCode, RuntimeError};

use crate::object::{
    is_truthy, str_value, FuncBody, FuncObject, Kind, KwArgs, Object, ObjectRef, Repr, TypeCtor,
    TypeObject,
};

use super::{exec_stmts, ExecCtx, Flow, ScopeExec, TableKind};

/// Call a callable object with evaluated positional and keyword arguments.
pub fn call_object(
    ctx: &ExecCtx<'_>,
    callee: &ObjectRef,
    args: Vec<ObjectRef>,
    kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    match &callee.repr {
        Repr::Func(func) => call_func(ctx, func, args, kwargs),
        Repr::Wrapper(wrapper) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Rc::clone(wrapper.bound_self()));
            full.extend(args);
            call_object(ctx, wrapper.func(), full, kwargs)
        }
        Repr::Type(type_obj) => construct_builtin(ctx, type_obj, args),
        Repr::DeclType(_) => construct_declared(ctx, callee, args, kwargs),
        Repr::Instance(instance) => {
            // callable instances go through __call__ with self prepended
            let class = crate::object::class_of(callee)?;
            let Some(attr) = class.search_attr("__call__") else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("'{}' object is not callable", class.name()),
                ));
            };
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(instance.self_obj()?);
            full.extend(args);
            call_object(ctx, &attr, full, kwargs)
        }
        Repr::Iface(iface) => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!("interface '{}' can not be instantiated", iface.name()),
        )),
        _ => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!("'{}' object is not callable", callee.kind().name()),
        )),
    }
}

fn call_func(
    ctx: &ExecCtx<'_>,
    func: &FuncObject,
    args: Vec<ObjectRef>,
    kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    match func.body() {
        FuncBody::Native(handler) => handler(ctx, args, kwargs),
        FuncBody::Declared { block, scope } => {
            let mut stack = scope.clone();
            stack.push_table(TableKind::Func);
            bind_params(ctx, func, &stack, args, kwargs)?;

            let mut scope_exec = ScopeExec::new();
            let flow = exec_stmts(ctx, &stack, &block.statements, &mut scope_exec);
            let drained = scope_exec.drain(ctx);
            let flow = match flow {
                Ok(flow) => flow,
                Err(err) => {
                    if let Err(defer_err) = drained {
                        tracing::warn!(%defer_err, "deferred statement failed during unwind");
                    }
                    return Err(err);
                }
            };
            drained?;
            match flow {
                Flow::Return(value) => Ok(value),
                Flow::Normal => Ok(ctx.factory.new_null()),
                Flow::Break | Flow::Continue => Err(RuntimeError::new(
                    ErrorCode::InvalidOpcode,
                    format!("break or continue outside of a loop in '{}'", func.name()),
                )),
            }
        }
    }
}

/// Bind call arguments to the function's parameter slots in the new frame.
///
/// Positional arguments fill slots in order; keyword arguments fill by
/// name; remaining slots take their declared defaults; extra positional
/// arguments go to the variadic tail when declared.
fn bind_params(
    ctx: &ExecCtx<'_>,
    func: &FuncObject,
    stack: &super::SymbolTableStack,
    args: Vec<ObjectRef>,
    kwargs: KwArgs,
) -> Result<(), RuntimeError> {
    let specs = func.params();
    let num_slots = specs.len();

    if args.len() > num_slots && func.variadic().is_none() {
        return Err(RuntimeError::new(
            ErrorCode::FuncParams,
            format!(
                "{}() takes at most {} arguments ({} given)",
                func.name(),
                num_slots,
                args.len()
            ),
        ));
    }

    let mut bound: Vec<Option<ObjectRef>> = vec![None; num_slots];
    let mut args = args.into_iter();
    for slot in bound.iter_mut() {
        match args.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    let rest: Vec<ObjectRef> = args.collect();

    for (name, value) in kwargs {
        let Some(at) = specs.iter().position(|p| p.name == name) else {
            return Err(RuntimeError::new(
                ErrorCode::FuncParams,
                format!("{}() got an unexpected keyword argument '{name}'", func.name()),
            ));
        };
        if bound[at].is_some() {
            return Err(RuntimeError::new(
                ErrorCode::FuncParams,
                format!("{}() got multiple values for argument '{name}'", func.name()),
            ));
        }
        bound[at] = Some(value);
    }

    for (slot, spec) in bound.into_iter().zip(specs.iter()) {
        let value = match slot {
            Some(value) => value,
            None => match &spec.default {
                Some(default) => Object::copy(default),
                None => {
                    return Err(RuntimeError::new(
                        ErrorCode::FuncParams,
                        format!(
                            "{}() missing required argument '{}'",
                            func.name(),
                            spec.name
                        ),
                    ))
                }
            },
        };
        stack.insert_top(&spec.name, value);
    }

    if let Some(tail) = func.variadic() {
        stack.insert_top(tail, ctx.factory.new_array(rest));
    }

    Ok(())
}

/// Run a builtin type object's constructor.
fn construct_builtin(
    ctx: &ExecCtx<'_>,
    type_obj: &TypeObject,
    args: Vec<ObjectRef>,
) -> Result<ObjectRef, RuntimeError> {
    let f = &ctx.factory;
    let one = |args: &[ObjectRef]| -> Result<ObjectRef, RuntimeError> {
        if args.len() != 1 {
            return Err(RuntimeError::new(
                ErrorCode::FuncParams,
                format!("{}() takes exactly 1 argument", type_obj.name()),
            ));
        }
        Ok(Rc::clone(&args[0]))
    };

    match type_obj.ctor() {
        TypeCtor::Type => {
            let arg = one(&args)?;
            Ok(match arg.obj_type() {
                Some(t) => Rc::clone(t),
                None => f.type_type(),
            })
        }
        TypeCtor::Null => {
            if !args.is_empty() {
                return Err(RuntimeError::new(
                    ErrorCode::FuncParams,
                    "null_t() takes no arguments",
                ));
            }
            Ok(f.new_null())
        }
        TypeCtor::Bool => {
            let arg = one(&args)?;
            Ok(f.new_bool(is_truthy(ctx, &arg)?))
        }
        TypeCtor::Int => {
            let arg = one(&args)?;
            match &arg.repr {
                Repr::Int(i) => Ok(f.new_int(*i)),
                Repr::Real(r) => Ok(f.new_int(*r as i64)),
                Repr::Bool(b) => Ok(f.new_int(i64::from(*b))),
                Repr::Str(s) => s.trim().parse::<i64>().map(|i| f.new_int(i)).map_err(|_| {
                    RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("invalid literal for int(): '{s}'"),
                    )
                }),
                _ => Err(cant_convert("int", &arg)),
            }
        }
        TypeCtor::Real => {
            let arg = one(&args)?;
            match &arg.repr {
                Repr::Real(r) => Ok(f.new_real(*r)),
                Repr::Int(i) => Ok(f.new_real(*i as f64)),
                Repr::Bool(b) => Ok(f.new_real(if *b { 1.0 } else { 0.0 })),
                Repr::Str(s) => s.trim().parse::<f64>().map(|r| f.new_real(r)).map_err(|_| {
                    RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("invalid literal for real(): '{s}'"),
                    )
                }),
                _ => Err(cant_convert("real", &arg)),
            }
        }
        TypeCtor::Str => {
            let arg = one(&args)?;
            Ok(f.new_str(str_value(ctx, &arg)?))
        }
        TypeCtor::Array => {
            let arg = one(&args)?;
            match &arg.repr {
                Repr::Array(_) => Ok(Object::copy(&arg)),
                Repr::Tuple(items) => Ok(f.new_array(items.clone())),
                Repr::Cmd(cmd) => Ok(f.new_array(
                    cmd.lines().into_iter().map(|l| f.new_str(l)).collect(),
                )),
                _ => Err(cant_convert("array", &arg)),
            }
        }
        TypeCtor::Tuple => {
            let arg = one(&args)?;
            match &arg.repr {
                Repr::Tuple(items) => Ok(f.new_tuple(items.clone())),
                Repr::Array(items) => Ok(f.new_tuple(items.borrow().clone())),
                _ => Err(cant_convert("tuple", &arg)),
            }
        }
        TypeCtor::Map => {
            let arg = one(&args)?;
            match &arg.repr {
                Repr::Map(_) => Ok(Object::copy(&arg)),
                _ => Err(cant_convert("map", &arg)),
            }
        }
        TypeCtor::Func => Err(RuntimeError::new(
            ErrorCode::FuncParams,
            "func() not constructable",
        )),
        TypeCtor::Opaque => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!("type '{}' is not constructable", type_obj.name()),
        )),
    }
}

fn cant_convert(to: &str, from: &ObjectRef) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::IncompatibleType,
        format!("can't convert '{}' to {to}", from.kind().name()),
    )
}

/// Construct a declared-class instance.
///
/// Abstract classes refuse construction; `__init__` runs with `self`
/// prepended when the class chain declares it as a function.
fn construct_declared(
    ctx: &ExecCtx<'_>,
    class_obj: &ObjectRef,
    args: Vec<ObjectRef>,
    kwargs: KwArgs,
) -> Result<ObjectRef, RuntimeError> {
    let Repr::DeclType(class) = &class_obj.repr else {
        unreachable!("checked by caller");
    };
    if class.is_abstract() {
        return Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!("abstract class '{}' can not be instantiated", class.name()),
        ));
    }

    let instance = ctx.factory.new_instance(class_obj);

    if let Some(init) = class.search_attr("__init__") {
        if init.kind() == Kind::Func {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Rc::clone(&instance));
            full.extend(args);
            call_object(ctx, &init, full, kwargs)?;
        }
    }

    Ok(instance)
}
