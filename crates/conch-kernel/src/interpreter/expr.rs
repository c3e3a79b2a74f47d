//! Expression evaluation.
//!
//! Identifier resolution applies SharedAccess semantics: scalars come back
//! as fresh copies, containers and declared objects as shared handles.
//! Binary operations evaluate left then right and dispatch on the left
//! operand's kind; `and`/`or` short-circuit for builtin kinds.

use std::rc::Rc;

use conch_types::{ErrorCode, RuntimeError};

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Param};
use crate::object::{
    binary_op, call_dunder, has_dunder, index_get, is_truthy, slice_value, unary_op, Kind,
    ObjectRef, ParamSpec, Repr,
};

use super::{call_object, ExecCtx, SymbolTableStack};

/// Evaluate an expression to an object.
pub(crate) fn eval_expr(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    expr: &Expr,
) -> Result<ObjectRef, RuntimeError> {
    eval_inner(ctx, stack, expr).map_err(|e| e.at(expr.pos))
}

fn eval_inner(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    expr: &Expr,
) -> Result<ObjectRef, RuntimeError> {
    let f = &ctx.factory;
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(match lit {
            Literal::Null => f.new_null(),
            Literal::Bool(b) => f.new_bool(*b),
            Literal::Int(i) => f.new_int(*i),
            Literal::Real(r) => f.new_real(*r),
            Literal::Str(s) => f.new_str(s.clone()),
        }),

        ExprKind::Identifier(name) => stack.shared_access(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("undefined symbol '{name}'"),
            )
        }),

        ExprKind::Binary { left, op, right } => {
            let left_obj = eval_expr(ctx, stack, left)?;
            // short-circuit logical operators for builtin kinds; declared
            // instances dispatch __and__/__or__ with both operands evaluated
            if left_obj.kind() != Kind::DeclObj {
                match op {
                    BinaryOp::And => {
                        if !is_truthy(ctx, &left_obj)? {
                            return Ok(f.new_bool(false));
                        }
                        let right_obj = eval_expr(ctx, stack, right)?;
                        return Ok(f.new_bool(is_truthy(ctx, &right_obj)?));
                    }
                    BinaryOp::Or => {
                        if is_truthy(ctx, &left_obj)? {
                            return Ok(f.new_bool(true));
                        }
                        let right_obj = eval_expr(ctx, stack, right)?;
                        return Ok(f.new_bool(is_truthy(ctx, &right_obj)?));
                    }
                    _ => {}
                }
            }
            let right_obj = eval_expr(ctx, stack, right)?;
            binary_op(ctx, *op, &left_obj, &right_obj)
        }

        ExprKind::Unary { op, operand } => {
            let obj = eval_expr(ctx, stack, operand)?;
            unary_op(ctx, *op, &obj)
        }

        ExprKind::Not(operand) => {
            let obj = eval_expr(ctx, stack, operand)?;
            // instances with __invert__ overload `not`; otherwise truthiness
            if obj.kind() == Kind::DeclObj && has_dunder(&obj, "__invert__") {
                return call_dunder(ctx, &obj, "__invert__", Vec::new());
            }
            Ok(f.new_bool(!is_truthy(ctx, &obj)?))
        }

        ExprKind::Attribute { object, name } => {
            let obj = eval_expr(ctx, stack, object)?;
            attr_get(ctx, &obj, name)
        }

        ExprKind::Index { object, index } => {
            let obj = eval_expr(ctx, stack, object)?;
            let key = eval_expr(ctx, stack, index)?;
            index_get(ctx, &obj, &key)
        }

        ExprKind::Slice {
            object,
            start,
            stop,
            step,
        } => {
            let obj = eval_expr(ctx, stack, object)?;
            let start = eval_slice_bound(ctx, stack, start.as_deref())?;
            let stop = eval_slice_bound(ctx, stack, stop.as_deref())?;
            let step = eval_slice_bound(ctx, stack, step.as_deref())?;
            slice_value(ctx, &obj, start, stop, step)
        }

        ExprKind::ArrayInst(items) => {
            let elems: Result<Vec<ObjectRef>, _> =
                items.iter().map(|e| eval_expr(ctx, stack, e)).collect();
            Ok(f.new_array(elems?))
        }

        ExprKind::TupleInst(items) => {
            let elems: Result<Vec<ObjectRef>, _> =
                items.iter().map(|e| eval_expr(ctx, stack, e)).collect();
            Ok(f.new_tuple(elems?))
        }

        ExprKind::MapInst(pairs) => {
            let map_obj = f.new_map();
            for (key_expr, value_expr) in pairs {
                let key = eval_expr(ctx, stack, key_expr)?;
                let value = eval_expr(ctx, stack, value_expr)?;
                crate::object::index_set(ctx, &map_obj, &key, value)?;
            }
            Ok(map_obj)
        }

        ExprKind::Call {
            callee,
            args,
            kwargs,
        } => {
            let callee_obj = eval_expr(ctx, stack, callee)?;
            let mut arg_objs = Vec::with_capacity(args.len());
            for arg in args {
                arg_objs.push(eval_expr(ctx, stack, arg)?);
            }
            let mut kwarg_objs = Vec::with_capacity(kwargs.len());
            for (name, value) in kwargs {
                kwarg_objs.push((name.clone(), eval_expr(ctx, stack, value)?));
            }
            call_object(ctx, &callee_obj, arg_objs, kwarg_objs)
        }

        ExprKind::Lambda {
            params,
            variadic,
            block,
        } => {
            let specs = eval_param_specs(ctx, stack, params)?;
            Ok(f.new_declared_func(
                None,
                specs,
                variadic.clone(),
                Rc::new(block.clone()),
                stack.clone(),
                false,
            ))
        }

        ExprKind::Cmd(cmd_expr) => crate::cmd::exec_cmd_expr(ctx, stack, cmd_expr),
    }
}

fn eval_slice_bound(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    bound: Option<&Expr>,
) -> Result<Option<i64>, RuntimeError> {
    match bound {
        None => Ok(None),
        Some(expr) => {
            let obj = eval_expr(ctx, stack, expr)?;
            obj.as_int().map(Some).ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    "slice bounds must be integers",
                )
            })
        }
    }
}

/// Evaluate declared parameter defaults into bound slots.
pub(crate) fn eval_param_specs(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    params: &[Param],
) -> Result<Vec<ParamSpec>, RuntimeError> {
    let mut specs = Vec::with_capacity(params.len());
    let mut saw_default = false;
    for param in params {
        let default = match &param.default {
            Some(expr) => Some(eval_expr(ctx, stack, expr)?),
            None => None,
        };
        if default.is_some() {
            saw_default = true;
        } else if saw_default {
            return Err(RuntimeError::new(
                ErrorCode::FuncParams,
                format!(
                    "parameter '{}' without default follows parameter with default",
                    param.name
                ),
            ));
        }
        specs.push(ParamSpec {
            name: param.name.clone(),
            default,
        });
    }
    Ok(specs)
}

/// Attribute read: `obj.name`.
///
/// Declared instances consult their own scope first, then the class chain;
/// functions found on either path come back wrapped with `self` bound,
/// except natives (returned as-is) and statics (an error through an
/// instance).
pub(crate) fn attr_get(
    ctx: &ExecCtx<'_>,
    obj: &ObjectRef,
    name: &str,
) -> Result<ObjectRef, RuntimeError> {
    let f = &ctx.factory;
    match &obj.repr {
        Repr::Instance(instance) => {
            if let Some(attr) = instance.scope().shared_access(name) {
                if attr.kind() == Kind::Func {
                    return Ok(f.new_wrapper(attr, instance.self_obj()?));
                }
                return Ok(attr);
            }
            let class = crate::object::class_of(obj)?;
            let Some(attr) = class.search_attr(name) else {
                return Err(RuntimeError::new(
                    ErrorCode::SymbolNotFound,
                    format!("'{}' object has no attribute '{name}'", class.name()),
                ));
            };
            if let Repr::Func(func) = &attr.repr {
                if !func.is_declared() {
                    return Ok(attr);
                }
                if func.is_static() {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("static method '{name}' must not be called through an instance"),
                    ));
                }
                return Ok(f.new_wrapper(attr, instance.self_obj()?));
            }
            Ok(attr)
        }
        Repr::DeclType(class) => class.search_attr(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("class '{}' has no attribute '{name}'", class.name()),
            )
        }),
        Repr::Type(type_obj) => type_obj.scope().shared_access(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("type '{}' has no attribute '{name}'", type_obj.name()),
            )
        }),
        Repr::Module(module) => module.scope.shared_access(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("module '{}' has no attribute '{name}'", module.name),
            )
        }),
        Repr::Cmd(cmd) => match name {
            "out" => Ok(f.new_str(cmd.output.clone())),
            "status" => Ok(f.new_int(cmd.status as i64)),
            _ => Err(RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("cmd object has no attribute '{name}'"),
            )),
        },
        Repr::Iface(_) => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            "methods from an interface can't be called",
        )),
        _ => Err(RuntimeError::new(
            ErrorCode::SymbolNotFound,
            format!("'{}' has no attribute '{name}'", obj.kind().name()),
        )),
    }
}

/// Attribute write: `obj.name = value`.
///
/// Assignment always targets the instance scope for declared objects, or
/// the class table for class objects.
pub(crate) fn attr_set(
    _ctx: &ExecCtx<'_>,
    obj: &ObjectRef,
    name: &str,
    value: ObjectRef,
) -> Result<(), RuntimeError> {
    match &obj.repr {
        Repr::Instance(instance) => {
            instance.set_attr(name, value);
            Ok(())
        }
        Repr::DeclType(class) => {
            class.scope().insert_top(name, value);
            Ok(())
        }
        _ => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!(
                "'{}' does not support attribute assignment",
                obj.kind().name()
            ),
        )),
    }
}
