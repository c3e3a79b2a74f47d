//! Per-kind operator dispatch.
//!
//! Builtin kinds resolve operators through the tables in this module.
//! Declared instances resolve every overloadable operator to its canonical
//! dunder name in the type's scope chain; the resolved attribute must be a
//! function object. `__print__`/`__str__`/`__cmd__` must return a string and
//! `__len__`/`__hash__` an int; violations raise INCOMPATIBLE_TYPE.

use std::rc::Rc;

use conch_types::{ErrorCode, RuntimeError};

use crate::ast::{BinaryOp, UnaryOp};
use crate::interpreter::{call_object, ExecCtx};

use super::class::{class_of, is_func};
use super::{Kind, MapKey, Object, ObjectRef, Repr};

type OpResult = Result<ObjectRef, RuntimeError>;

fn type_err(msg: String) -> RuntimeError {
    RuntimeError::new(ErrorCode::IncompatibleType, msg)
}

fn op_type_err(op: &str, left: &Object, right: &Object) -> RuntimeError {
    type_err(format!(
        "unsupported operand kinds for '{op}': '{}' and '{}'",
        left.kind().name(),
        right.kind().name()
    ))
}

/// Resolve and call a dunder method on a declared instance.
///
/// Lookup goes through the type's scope chain (never the instance scope),
/// and `self` is prepended to the argument vector — one call shape for
/// unary and binary operators alike.
pub fn call_dunder(
    ctx: &ExecCtx<'_>,
    obj: &ObjectRef,
    name: &str,
    args: Vec<ObjectRef>,
) -> OpResult {
    let Repr::Instance(instance) = &obj.repr else {
        return Err(type_err(format!(
            "'{}' has no '{name}' method",
            obj.kind().name()
        )));
    };
    let class = class_of(obj)?;
    let Some(attr) = class.search_attr(name) else {
        return Err(RuntimeError::new(
            ErrorCode::SymbolNotFound,
            format!("'{}' object has no method '{name}'", class.name()),
        ));
    };
    if !is_func(&attr) {
        return Err(type_err(format!("symbol '{name}' must be a function")));
    }
    let self_obj = instance.self_obj()?;
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(self_obj);
    full_args.extend(args);
    call_object(ctx, &attr, full_args, Vec::new())
}

/// Check whether a declared instance's type chain defines a dunder.
pub fn has_dunder(obj: &ObjectRef, name: &str) -> bool {
    match (&obj.repr, class_of(obj)) {
        (Repr::Instance(_), Ok(class)) => class.search_attr(name).map(|a| is_func(&a)).unwrap_or(false),
        _ => false,
    }
}

fn dunder_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "__add__",
        BinaryOp::Sub => "__sub__",
        BinaryOp::Mul => "__mul__",
        BinaryOp::Div => "__div__",
        BinaryOp::Mod => "__mod__",
        BinaryOp::Shl => "__lshift__",
        BinaryOp::Shr => "__rshift__",
        BinaryOp::Lt => "__lt__",
        BinaryOp::Gt => "__gt__",
        BinaryOp::Le => "__le__",
        BinaryOp::Ge => "__ge__",
        BinaryOp::Eq => "__eq__",
        BinaryOp::NotEq => "__ne__",
        BinaryOp::In => "__contains__",
        BinaryOp::BitAnd => "__rand__",
        BinaryOp::BitOr => "__ror__",
        BinaryOp::BitXor => "__rxor__",
        BinaryOp::And => "__and__",
        BinaryOp::Or => "__or__",
        // `is` never dispatches
        BinaryOp::Is => "__is__",
    }
}

/// Apply a binary operator to two evaluated operands.
///
/// Short-circuit evaluation of `and`/`or` for builtin kinds happens in the
/// expression evaluator before this is reached.
pub fn binary_op(ctx: &ExecCtx<'_>, op: BinaryOp, left: &ObjectRef, right: &ObjectRef) -> OpResult {
    let f = &ctx.factory;

    // `is` compares the operand's type name against a type object
    if op == BinaryOp::Is {
        let name = match &right.repr {
            Repr::Type(t) => t.name(),
            Repr::DeclType(c) => c.name(),
            Repr::Iface(i) => i.name(),
            _ => {
                return Err(type_err(
                    "right operand of 'is' must be a type".to_string(),
                ))
            }
        };
        return Ok(f.new_bool(left.type_name() == name));
    }

    // membership dispatches on the container (the right operand)
    if op == BinaryOp::In {
        if right.kind() == Kind::DeclObj {
            let result = call_dunder(ctx, right, "__contains__", vec![Rc::clone(left)])?;
            let truth = is_truthy(ctx, &result)?;
            return Ok(f.new_bool(truth));
        }
        return builtin_contains(ctx, left, right);
    }

    // declared instances resolve to dunder methods on their type
    if left.kind() == Kind::DeclObj {
        return call_dunder(ctx, left, dunder_name(op), vec![Rc::clone(right)]);
    }

    match op {
        BinaryOp::Add => add_values(ctx, left, right),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arith(ctx, op, left, right),
        BinaryOp::Mod | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitOr
        | BinaryOp::BitXor => int_op(ctx, op, left, right),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => compare(ctx, op, left, right),
        BinaryOp::Eq => Ok(f.new_bool(eq_values(ctx, left, right)?)),
        BinaryOp::NotEq => Ok(f.new_bool(!eq_values(ctx, left, right)?)),
        BinaryOp::And => {
            let truth = is_truthy(ctx, left)? && is_truthy(ctx, right)?;
            Ok(f.new_bool(truth))
        }
        BinaryOp::Or => {
            let truth = is_truthy(ctx, left)? || is_truthy(ctx, right)?;
            Ok(f.new_bool(truth))
        }
        BinaryOp::In | BinaryOp::Is => unreachable!("handled above"),
    }
}

fn add_values(ctx: &ExecCtx<'_>, left: &ObjectRef, right: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    match (&left.repr, &right.repr) {
        (Repr::Int(a), Repr::Int(b)) => Ok(f.new_int(a.wrapping_add(*b))),
        (Repr::Str(a), Repr::Str(b)) => Ok(f.new_str(format!("{a}{b}"))),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok(f.new_real(a + b)),
            _ => Err(op_type_err("+", left, right)),
        },
    }
}

fn arith(ctx: &ExecCtx<'_>, op: BinaryOp, left: &ObjectRef, right: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    let sym = match op {
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        _ => unreachable!(),
    };
    // integer arithmetic wraps, like the shift operators
    if let (Repr::Int(a), Repr::Int(b)) = (&left.repr, &right.repr) {
        return match op {
            BinaryOp::Sub => Ok(f.new_int(a.wrapping_sub(*b))),
            BinaryOp::Mul => Ok(f.new_int(a.wrapping_mul(*b))),
            BinaryOp::Div => {
                if *b == 0 {
                    Err(RuntimeError::new(ErrorCode::InvalidOpcode, "division by zero"))
                } else {
                    Ok(f.new_int(a.wrapping_div(*b)))
                }
            }
            _ => unreachable!(),
        };
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => match op {
            BinaryOp::Sub => Ok(f.new_real(a - b)),
            BinaryOp::Mul => Ok(f.new_real(a * b)),
            BinaryOp::Div => {
                if b == 0.0 {
                    Err(RuntimeError::new(ErrorCode::InvalidOpcode, "division by zero"))
                } else {
                    Ok(f.new_real(a / b))
                }
            }
            _ => unreachable!(),
        },
        _ => Err(op_type_err(sym, left, right)),
    }
}

fn int_op(ctx: &ExecCtx<'_>, op: BinaryOp, left: &ObjectRef, right: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    let (sym, apply): (&str, fn(i64, i64) -> Option<i64>) = match op {
        BinaryOp::Mod => ("%", |a, b| if b == 0 { None } else { Some(a.wrapping_rem(b)) }),
        BinaryOp::Shl => ("<<", |a, b| Some(a.wrapping_shl(b as u32))),
        BinaryOp::Shr => (">>", |a, b| Some(a.wrapping_shr(b as u32))),
        BinaryOp::BitAnd => ("&", |a, b| Some(a & b)),
        BinaryOp::BitOr => ("|", |a, b| Some(a | b)),
        BinaryOp::BitXor => ("^", |a, b| Some(a ^ b)),
        _ => unreachable!(),
    };
    match (&left.repr, &right.repr) {
        (Repr::Int(a), Repr::Int(b)) => apply(*a, *b)
            .map(|v| f.new_int(v))
            .ok_or_else(|| RuntimeError::new(ErrorCode::InvalidOpcode, "division by zero")),
        _ => Err(op_type_err(sym, left, right)),
    }
}

fn compare(ctx: &ExecCtx<'_>, op: BinaryOp, left: &ObjectRef, right: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    let ord = match (&left.repr, &right.repr) {
        (Repr::Str(a), Repr::Str(b)) => a.cmp(b),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| type_err("real comparison with nan".to_string()))?,
            _ => {
                let sym = match op {
                    BinaryOp::Lt => "<",
                    BinaryOp::Gt => ">",
                    BinaryOp::Le => "<=",
                    BinaryOp::Ge => ">=",
                    _ => unreachable!(),
                };
                return Err(op_type_err(sym, left, right));
            }
        },
    };
    let truth = match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Ge => ord.is_ge(),
        _ => unreachable!(),
    };
    Ok(f.new_bool(truth))
}

fn builtin_contains(ctx: &ExecCtx<'_>, item: &ObjectRef, container: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    let found = match &container.repr {
        Repr::Str(haystack) => match &item.repr {
            Repr::Str(needle) => haystack.contains(needle.as_str()),
            _ => return Err(op_type_err("in", item, container)),
        },
        Repr::Array(items) => {
            let items = items.borrow();
            items
                .iter()
                .map(|e| eq_values(ctx, item, e))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .any(|b| b)
        }
        Repr::Tuple(items) => items
            .iter()
            .map(|e| eq_values(ctx, item, e))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .any(|b| b),
        Repr::Map(map) => {
            let key = MapKey::try_from_object(item)?;
            map.borrow().entries.contains_key(&key)
        }
        _ => return Err(op_type_err("in", item, container)),
    };
    Ok(f.new_bool(found))
}

/// Equality with instance `__eq__` dispatch on the left operand; every other
/// kind uses structural builtin equality.
pub(crate) fn eq_values(
    ctx: &ExecCtx<'_>,
    left: &ObjectRef,
    right: &ObjectRef,
) -> Result<bool, RuntimeError> {
    if left.kind() == Kind::DeclObj && has_dunder(left, "__eq__") {
        let result = call_dunder(ctx, left, "__eq__", vec![Rc::clone(right)])?;
        return is_truthy(ctx, &result);
    }
    Ok(Object::eq_builtin(left, right))
}

/// Apply a unary operator.
pub fn unary_op(ctx: &ExecCtx<'_>, op: UnaryOp, operand: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    if operand.kind() == Kind::DeclObj {
        let name = match op {
            UnaryOp::Pos => "__pos__",
            UnaryOp::Neg => "__neg__",
            UnaryOp::BitNot => "__rinvert__",
        };
        return call_dunder(ctx, operand, name, Vec::new());
    }
    match (op, &operand.repr) {
        (UnaryOp::Pos, Repr::Int(i)) => Ok(f.new_int(*i)),
        (UnaryOp::Pos, Repr::Real(r)) => Ok(f.new_real(*r)),
        (UnaryOp::Neg, Repr::Int(i)) => Ok(f.new_int(i.wrapping_neg())),
        (UnaryOp::Neg, Repr::Real(r)) => Ok(f.new_real(-r)),
        (UnaryOp::BitNot, Repr::Int(i)) => Ok(f.new_int(!i)),
        _ => Err(type_err(format!(
            "unsupported operand kind for unary operator: '{}'",
            operand.kind().name()
        ))),
    }
}

/// Truthiness.
///
/// Null is false, bool is itself, numbers are non-zero, strings and
/// containers non-empty; declared instances consult `__bool__` when present
/// and default to true; everything else is true.
pub fn is_truthy(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<bool, RuntimeError> {
    Ok(match &obj.repr {
        Repr::Null => false,
        Repr::Bool(b) => *b,
        Repr::Int(i) => *i != 0,
        Repr::Real(r) => *r != 0.0,
        Repr::Str(s) => !s.is_empty(),
        Repr::Array(items) => !items.borrow().is_empty(),
        Repr::Tuple(items) => !items.is_empty(),
        Repr::Map(map) => !map.borrow().entries.is_empty(),
        Repr::Instance(_) => {
            if has_dunder(obj, "__bool__") {
                let result = call_dunder(ctx, obj, "__bool__", Vec::new())?;
                // whatever kind comes back is interpreted as truthy
                match &result.repr {
                    Repr::Instance(_) => true,
                    _ => is_truthy(ctx, &result)?,
                }
            } else {
                true
            }
        }
        _ => true,
    })
}

fn expect_str(name: &str, obj: &ObjectRef) -> Result<String, RuntimeError> {
    obj.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| type_err(format!("{name} must return a string")))
}

fn expect_int(name: &str, obj: &ObjectRef) -> Result<i64, RuntimeError> {
    obj.as_int()
        .ok_or_else(|| type_err(format!("{name} must return an integer")))
}

/// Render an object the way `print` shows it.
///
/// Declared instances use `__print__` when defined and fall back to a
/// `<Name instance>` tag otherwise.
pub fn print_value(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<String, RuntimeError> {
    Ok(match &obj.repr {
        Repr::Null => "null".to_string(),
        Repr::Bool(b) => b.to_string(),
        Repr::Int(i) => i.to_string(),
        Repr::Real(r) => fmt_real(*r),
        Repr::Str(s) => s.clone(),
        Repr::Array(items) => {
            let parts: Result<Vec<String>, _> =
                items.borrow().iter().map(|e| print_value(ctx, e)).collect();
            format!("[{}]", parts?.join(", "))
        }
        Repr::Tuple(items) => {
            let parts: Result<Vec<String>, _> = items.iter().map(|e| print_value(ctx, e)).collect();
            format!("({})", parts?.join(", "))
        }
        Repr::Map(map) => {
            let mut parts = Vec::new();
            for (key, value) in map.borrow().entries.values() {
                parts.push(format!(
                    "{}: {}",
                    print_value(ctx, key)?,
                    print_value(ctx, value)?
                ));
            }
            parts.sort();
            format!("{{{}}}", parts.join(", "))
        }
        Repr::Func(func) => format!("<function {}>", func.name()),
        Repr::Wrapper(wrapper) => match &wrapper.func().repr {
            Repr::Func(func) => format!("<bound method {}>", func.name()),
            _ => "<bound method>".to_string(),
        },
        Repr::Type(t) => format!("<type {}>", t.name()),
        Repr::DeclType(c) => format!("<class {}>", c.name()),
        Repr::Iface(i) => format!("<interface {}>", i.name()),
        Repr::Module(m) => format!("<module {}>", m.name),
        Repr::Cmd(cmd) => cmd.output.clone(),
        Repr::ArrayIter(_) => "<array_iter>".to_string(),
        Repr::CmdIter(_) => "<cmd_iter>".to_string(),
        Repr::Instance(_) => {
            if has_dunder(obj, "__print__") {
                let result = call_dunder(ctx, obj, "__print__", Vec::new())?;
                expect_str("__print__", &result)?
            } else {
                format!("<{} instance>", obj.type_name())
            }
        }
    })
}

/// Render an object as a string value (`str(x)`).
///
/// Same as printing except declared instances use `__str__`.
pub fn str_value(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<String, RuntimeError> {
    if obj.kind() == Kind::DeclObj && has_dunder(obj, "__str__") {
        let result = call_dunder(ctx, obj, "__str__", Vec::new())?;
        return expect_str("__str__", &result);
    }
    print_value(ctx, obj)
}

/// Render an object as a command argv word, preferring `__cmd__`.
pub(crate) fn cmd_value(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<String, RuntimeError> {
    if obj.kind() == Kind::DeclObj && has_dunder(obj, "__cmd__") {
        let result = call_dunder(ctx, obj, "__cmd__", Vec::new())?;
        return expect_str("__cmd__", &result);
    }
    str_value(ctx, obj)
}

fn fmt_real(r: f64) -> String {
    if r.is_finite() && r.fract() == 0.0 {
        format!("{r:.1}")
    } else {
        r.to_string()
    }
}

/// Hash an object, for map keys and embedders.
///
/// Ints hash to themselves, strings and hashable tuples through the map-key
/// hasher; declared instances dispatch `__hash__`, which must return an int.
pub fn obj_hash(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<i64, RuntimeError> {
    use std::hash::{Hash, Hasher};

    if obj.kind() == Kind::DeclObj {
        let result = call_dunder(ctx, obj, "__hash__", Vec::new())?;
        return expect_int("__hash__", &result);
    }
    let key = MapKey::try_from_object(obj)?;
    match key {
        MapKey::Int(i) => Ok(i),
        other => {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            other.hash(&mut hasher);
            Ok(hasher.finish() as i64)
        }
    }
}

/// Length of an object.
pub fn obj_len(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> Result<i64, RuntimeError> {
    Ok(match &obj.repr {
        // chars, the same unit string indexing and slicing address
        Repr::Str(s) => s.chars().count() as i64,
        Repr::Array(items) => items.borrow().len() as i64,
        Repr::Tuple(items) => items.len() as i64,
        Repr::Map(map) => map.borrow().entries.len() as i64,
        Repr::Cmd(cmd) => cmd.lines().len() as i64,
        Repr::Instance(_) => {
            let result = call_dunder(ctx, obj, "__len__", Vec::new())?;
            expect_int("__len__", &result)?
        }
        _ => {
            return Err(type_err(format!(
                "'{}' has no length",
                obj.kind().name()
            )))
        }
    })
}

/// Resolve a possibly-negative index against a length.
///
/// `-k` means `len - k` when `0 < k <= len`; anything outside raises
/// OUT_OF_RANGE.
fn resolve_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 || resolved >= len {
        return Err(RuntimeError::new(
            ErrorCode::OutOfRange,
            format!("index {index} out of range for length {len}"),
        ));
    }
    Ok(resolved as usize)
}

/// Indexed read: `obj[key]`.
pub fn index_get(ctx: &ExecCtx<'_>, obj: &ObjectRef, key: &ObjectRef) -> OpResult {
    match &obj.repr {
        Repr::Array(items) => {
            let index = key
                .as_int()
                .ok_or_else(|| type_err("array index must be an integer".to_string()))?;
            let items = items.borrow();
            let at = resolve_index(index, items.len())?;
            Ok(Rc::clone(&items[at]))
        }
        Repr::Tuple(items) => {
            let index = key
                .as_int()
                .ok_or_else(|| type_err("tuple index must be an integer".to_string()))?;
            let at = resolve_index(index, items.len())?;
            Ok(Rc::clone(&items[at]))
        }
        Repr::Str(s) => {
            let index = key
                .as_int()
                .ok_or_else(|| type_err("string index must be an integer".to_string()))?;
            let chars: Vec<char> = s.chars().collect();
            let at = resolve_index(index, chars.len())?;
            Ok(ctx.factory.new_str(chars[at].to_string()))
        }
        Repr::Map(map) => {
            let map_key = MapKey::try_from_object(key)?;
            let found = map
                .borrow()
                .entries
                .get(&map_key)
                .map(|(_, value)| Rc::clone(value));
            found.ok_or_else(|| {
                let shown = print_value(ctx, key).unwrap_or_else(|_| key.kind().name().to_string());
                RuntimeError::new(ErrorCode::KeyNotFound, format!("no entry for key '{shown}'"))
            })
        }
        Repr::Instance(_) => call_dunder(ctx, obj, "__getitem__", vec![Rc::clone(key)]),
        _ => Err(type_err(format!(
            "'{}' is not subscriptable",
            obj.kind().name()
        ))),
    }
}

/// Indexed write: `obj[key] = value`.
pub fn index_set(
    _ctx: &ExecCtx<'_>,
    obj: &ObjectRef,
    key: &ObjectRef,
    value: ObjectRef,
) -> Result<(), RuntimeError> {
    match &obj.repr {
        Repr::Array(items) => {
            let index = key
                .as_int()
                .ok_or_else(|| type_err("array index must be an integer".to_string()))?;
            let mut items = items.borrow_mut();
            let at = resolve_index(index, items.len())?;
            items[at] = value;
            Ok(())
        }
        Repr::Map(map) => {
            let map_key = MapKey::try_from_object(key)?;
            map.borrow_mut()
                .entries
                .insert(map_key, (Rc::clone(key), value));
            Ok(())
        }
        _ => Err(type_err(format!(
            "'{}' does not support item assignment",
            obj.kind().name()
        ))),
    }
}

/// Compute clamped slice bounds the way Python does.
fn slice_bounds(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, low: i64, high: i64| v.max(low).min(high);
    let norm = |v: i64| if v < 0 { v + len } else { v };

    let mut indices = Vec::new();
    if step > 0 {
        let start = clamp(start.map(norm).unwrap_or(0), 0, len);
        let stop = clamp(stop.map(norm).unwrap_or(len), 0, len);
        let mut i = start;
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(start.map(norm).unwrap_or(len - 1), -1, len - 1);
        let stop = clamp(stop.map(norm).unwrap_or(-1), -1, len - 1);
        let mut i = start;
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

/// Slice: produce a new container of the same kind restricted to
/// `[start, stop, step]` with Python-style clamping; out-of-range bounds
/// never raise.
pub fn slice_value(
    ctx: &ExecCtx<'_>,
    obj: &ObjectRef,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> OpResult {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(type_err("slice step cannot be zero".to_string()));
    }
    let f = &ctx.factory;
    match &obj.repr {
        Repr::Array(items) => {
            let items = items.borrow();
            let picked = slice_bounds(items.len(), start, stop, step)
                .into_iter()
                .map(|i| Rc::clone(&items[i]))
                .collect();
            Ok(f.new_array(picked))
        }
        Repr::Tuple(items) => {
            let picked = slice_bounds(items.len(), start, stop, step)
                .into_iter()
                .map(|i| Rc::clone(&items[i]))
                .collect();
            Ok(f.new_tuple(picked))
        }
        Repr::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_bounds(chars.len(), start, stop, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(f.new_str(picked))
        }
        _ => Err(type_err(format!(
            "'{}' cannot be sliced",
            obj.kind().name()
        ))),
    }
}

/// Get an iterator object over `obj`.
pub fn obj_iter(ctx: &ExecCtx<'_>, obj: &ObjectRef) -> OpResult {
    let f = &ctx.factory;
    match &obj.repr {
        Repr::Array(_) | Repr::Tuple(_) => Ok(f.new_array_iter(Rc::clone(obj))),
        Repr::Cmd(cmd) => Ok(f.new_cmd_iter(cmd.lines())),
        Repr::Map(map) => {
            // iterate over a snapshot of the key objects
            let keys: Vec<ObjectRef> = map
                .borrow()
                .entries
                .values()
                .map(|(key, _)| Rc::clone(key))
                .collect();
            Ok(f.new_array_iter(f.new_array(keys)))
        }
        Repr::Instance(_) => call_dunder(ctx, obj, "__iter__", Vec::new()),
        _ => Err(type_err(format!(
            "'{}' is not iterable",
            obj.kind().name()
        ))),
    }
}

/// Does the iterator have more elements?
pub fn iter_has_next(ctx: &ExecCtx<'_>, iter: &ObjectRef) -> Result<bool, RuntimeError> {
    match &iter.repr {
        Repr::ArrayIter(it) => Ok(it.remaining() > 0),
        Repr::CmdIter(it) => Ok(it.index.get() < it.lines.len()),
        Repr::Instance(_) => {
            let result = call_dunder(ctx, iter, "__has_next__", Vec::new())?;
            is_truthy(ctx, &result)
        }
        _ => Err(type_err(format!(
            "'{}' is not an iterator",
            iter.kind().name()
        ))),
    }
}

/// Advance the iterator and return the next element.
pub fn iter_next(ctx: &ExecCtx<'_>, iter: &ObjectRef) -> OpResult {
    match &iter.repr {
        Repr::ArrayIter(it) => {
            let index = it.index.get();
            let element = match &it.target.repr {
                Repr::Array(items) => items.borrow().get(index).map(Rc::clone),
                Repr::Tuple(items) => items.get(index).map(Rc::clone),
                _ => None,
            };
            let element = element.ok_or_else(|| {
                RuntimeError::new(ErrorCode::OutOfRange, "iterator exhausted")
            })?;
            it.index.set(index + 1);
            Ok(element)
        }
        Repr::CmdIter(it) => {
            let index = it.index.get();
            let line = it.lines.get(index).cloned().ok_or_else(|| {
                RuntimeError::new(ErrorCode::OutOfRange, "iterator exhausted")
            })?;
            it.index.set(index + 1);
            Ok(ctx.factory.new_str(line))
        }
        Repr::Instance(_) => call_dunder(ctx, iter, "__next__", Vec::new()),
        _ => Err(type_err(format!(
            "'{}' is not an iterator",
            iter.kind().name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::ShellEnv;
    use crate::object::ObjectFactory;

    fn with_ctx<R>(run: impl FnOnce(&ExecCtx<'_>) -> R) -> R {
        let shell = ShellEnv::default();
        let ctx = ExecCtx::new(ObjectFactory::new(), &shell);
        run(&ctx)
    }

    #[test]
    fn int_real_promotion_in_arithmetic() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let sum = binary_op(ctx, crate::ast::BinaryOp::Add, &f.new_int(1), &f.new_real(2.5))
                .unwrap();
            assert_eq!(sum.as_real(), Some(3.5));
        });
    }

    #[test]
    fn integer_arithmetic_wraps_instead_of_panicking() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let product = binary_op(
                ctx,
                crate::ast::BinaryOp::Mul,
                &f.new_int(9_999_999_999),
                &f.new_int(9_999_999_999),
            )
            .unwrap();
            assert_eq!(product.as_int(), Some(9_999_999_999i64.wrapping_mul(9_999_999_999)));

            let negated = unary_op(ctx, crate::ast::UnaryOp::Neg, &f.new_int(i64::MIN)).unwrap();
            assert_eq!(negated.as_int(), Some(i64::MIN));

            let quotient = binary_op(
                ctx,
                crate::ast::BinaryOp::Div,
                &f.new_int(i64::MIN),
                &f.new_int(-1),
            )
            .unwrap();
            assert_eq!(quotient.as_int(), Some(i64::MIN));
        });
    }

    #[test]
    fn division_by_zero_raises() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let err = binary_op(ctx, crate::ast::BinaryOp::Div, &f.new_int(1), &f.new_int(0))
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidOpcode);
        });
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let lt = binary_op(
                ctx,
                crate::ast::BinaryOp::Lt,
                &f.new_str("apple"),
                &f.new_str("banana"),
            )
            .unwrap();
            assert_eq!(lt.as_bool(), Some(true));
        });
    }

    #[test]
    fn slice_clamps_and_reverses() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let xs = f.new_array(vec![f.new_int(1), f.new_int(2), f.new_int(3)]);
            // out-of-range stop clamps, never raises
            let clamped = slice_value(ctx, &xs, Some(1), Some(99), None).unwrap();
            assert_eq!(obj_len(ctx, &clamped).unwrap(), 2);
            // negative step walks backwards
            let reversed = slice_value(ctx, &xs, None, None, Some(-1)).unwrap();
            let first = index_get(ctx, &reversed, &f.new_int(0)).unwrap();
            assert_eq!(first.as_int(), Some(3));
        });
    }

    #[test]
    fn zero_step_slice_is_rejected() {
        with_ctx(|ctx| {
            let xs = ctx.factory.new_array(vec![]);
            let err = slice_value(ctx, &xs, None, None, Some(0)).unwrap_err();
            assert_eq!(err.code, ErrorCode::IncompatibleType);
        });
    }

    #[test]
    fn hash_of_int_is_identity_and_strings_are_stable() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            assert_eq!(obj_hash(ctx, &f.new_int(42)).unwrap(), 42);
            let a = obj_hash(ctx, &f.new_str("key")).unwrap();
            let b = obj_hash(ctx, &f.new_str("key")).unwrap();
            assert_eq!(a, b);
            let err = obj_hash(ctx, &f.new_array(vec![])).unwrap_err();
            assert_eq!(err.code, ErrorCode::IncompatibleType);
        });
    }

    #[test]
    fn string_length_and_indexing_share_the_char_unit() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            let s = f.new_str("café");
            assert_eq!(obj_len(ctx, &s).unwrap(), 4);
            // the last valid index is len - 1
            let last = index_get(ctx, &s, &f.new_int(3)).unwrap();
            assert_eq!(last.as_str(), Some("é"));
            let tail = slice_value(ctx, &s, Some(-2), None, None).unwrap();
            assert_eq!(tail.as_str(), Some("fé"));
        });
    }

    #[test]
    fn truthiness_follows_kind_rules() {
        with_ctx(|ctx| {
            let f = &ctx.factory;
            assert!(!is_truthy(ctx, &f.new_null()).unwrap());
            assert!(!is_truthy(ctx, &f.new_int(0)).unwrap());
            assert!(is_truthy(ctx, &f.new_int(-1)).unwrap());
            assert!(!is_truthy(ctx, &f.new_str("")).unwrap());
            assert!(is_truthy(ctx, &f.new_str("x")).unwrap());
            assert!(!is_truthy(ctx, &f.new_array(vec![])).unwrap());
            assert!(is_truthy(ctx, &f.new_array(vec![f.new_int(1)])).unwrap());
        });
    }

    #[test]
    fn cmd_iteration_yields_lines() {
        with_ctx(|ctx| {
            let cmd = ctx.factory.new_cmd("a\nb\n".to_string(), 0);
            let iter = obj_iter(ctx, &cmd).unwrap();
            assert!(iter_has_next(ctx, &iter).unwrap());
            assert_eq!(iter_next(ctx, &iter).unwrap().as_str(), Some("a"));
            assert_eq!(iter_next(ctx, &iter).unwrap().as_str(), Some("b"));
            assert!(!iter_has_next(ctx, &iter).unwrap());
        });
    }
}
