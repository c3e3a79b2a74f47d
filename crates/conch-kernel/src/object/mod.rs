//! The object model.
//!
//! Every runtime value is an [`Object`] behind an `Rc` handle. An object
//! carries a kind-specific payload ([`Repr`]) and an owning reference to its
//! type object; only the root `type` object has no type reference.
//!
//! Scalars (`null`, `bool`, `int`, `real`, `string`) are immutable and get
//! value semantics at identifier resolution (the symbol table hands out
//! copies). Containers and declared instances are shared handles with
//! interior mutability.
//!
//! The capability set is closed: operator dispatch lives in [`dispatch`] as
//! per-kind tables, not as an open inheritance hierarchy.

mod class;
mod dispatch;
mod factory;
mod func;

pub use class::{AbstractMethod, DeclClass, Instance, Interface, TypeCtor, TypeObject};
pub use dispatch::{
    binary_op, call_dunder, has_dunder, index_get, index_set, is_truthy, iter_has_next, iter_next,
    obj_hash, obj_iter, obj_len, print_value, slice_value, str_value, unary_op,
};
pub(crate) use class::class_of;
pub(crate) use dispatch::{cmd_value, eq_values};
pub use factory::ObjectFactory;
pub use func::{FuncBody, FuncObject, KwArgs, NativeFn, ParamSpec, WrapperFunc};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use conch_types::{ErrorCode, RuntimeError};

use crate::interpreter::SymbolTableStack;

/// Shared handle to an object.
pub type ObjectRef = Rc<Object>;

/// The closed set of object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Real,
    Str,
    Array,
    Tuple,
    Map,
    Func,
    Type,
    DeclType,
    DeclIface,
    DeclObj,
    Module,
    Cmd,
    ArrayIter,
    CmdIter,
    WrapperFunc,
}

impl Kind {
    /// Short lowercase name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Real => "real",
            Kind::Str => "string",
            Kind::Array => "array",
            Kind::Tuple => "tuple",
            Kind::Map => "map",
            Kind::Func => "func",
            Kind::Type => "type",
            Kind::DeclType => "class",
            Kind::DeclIface => "interface",
            Kind::DeclObj => "object",
            Kind::Module => "module",
            Kind::Cmd => "cmdobj",
            Kind::ArrayIter => "array_iter",
            Kind::CmdIter => "cmd_iter",
            Kind::WrapperFunc => "method",
        }
    }
}

/// Kind-specific payload.
pub enum Repr {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Array(RefCell<Vec<ObjectRef>>),
    Tuple(Vec<ObjectRef>),
    Map(RefCell<MapRepr>),
    Func(FuncObject),
    Wrapper(WrapperFunc),
    Type(TypeObject),
    DeclType(DeclClass),
    Iface(Interface),
    Instance(Instance),
    Module(Module),
    Cmd(CmdObject),
    ArrayIter(ArrayIter),
    CmdIter(CmdIter),
}

/// A runtime value: payload plus an owning reference to its type object.
pub struct Object {
    pub(crate) repr: Repr,
    /// `None` only for the root `type` object.
    pub(crate) obj_type: Option<ObjectRef>,
}

impl Object {
    pub(crate) fn new(repr: Repr, obj_type: Option<ObjectRef>) -> ObjectRef {
        Rc::new(Object { repr, obj_type })
    }

    /// This object's kind tag.
    pub fn kind(&self) -> Kind {
        match &self.repr {
            Repr::Null => Kind::Null,
            Repr::Bool(_) => Kind::Bool,
            Repr::Int(_) => Kind::Int,
            Repr::Real(_) => Kind::Real,
            Repr::Str(_) => Kind::Str,
            Repr::Array(_) => Kind::Array,
            Repr::Tuple(_) => Kind::Tuple,
            Repr::Map(_) => Kind::Map,
            Repr::Func(_) => Kind::Func,
            Repr::Wrapper(_) => Kind::WrapperFunc,
            Repr::Type(_) => Kind::Type,
            Repr::DeclType(_) => Kind::DeclType,
            Repr::Iface(_) => Kind::DeclIface,
            Repr::Instance(_) => Kind::DeclObj,
            Repr::Module(_) => Kind::Module,
            Repr::Cmd(_) => Kind::Cmd,
            Repr::ArrayIter(_) => Kind::ArrayIter,
            Repr::CmdIter(_) => Kind::CmdIter,
        }
    }

    /// The object's type reference (`None` only for the root `type` object).
    pub fn obj_type(&self) -> Option<&ObjectRef> {
        self.obj_type.as_ref()
    }

    /// The canonical name of this object's type. Type equality is by name.
    pub fn type_name(&self) -> &str {
        match &self.obj_type {
            None => "type",
            Some(t) => match &t.repr {
                Repr::Type(tobj) => tobj.name(),
                Repr::DeclType(class) => class.name(),
                Repr::Iface(iface) => iface.name(),
                _ => t.kind().name(),
            },
        }
    }

    /// True when this object is callable.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.repr,
            Repr::Func(_) | Repr::Wrapper(_) | Repr::Type(_) | Repr::DeclType(_) | Repr::Instance(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.repr {
            Repr::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self.repr {
            Repr::Real(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.repr {
            Repr::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.repr {
            Repr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value widened to real, for int/real promotion.
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self.repr {
            Repr::Int(i) => Some(i as f64),
            Repr::Real(r) => Some(r),
            _ => None,
        }
    }

    /// Copy an object.
    ///
    /// Scalars come back as fresh objects with equal values; arrays, tuples
    /// and maps as new containers over the same element handles. Every other
    /// kind copies as the same shared handle.
    pub fn copy(obj: &ObjectRef) -> ObjectRef {
        let ty = obj.obj_type.clone();
        match &obj.repr {
            Repr::Null => Object::new(Repr::Null, ty),
            Repr::Bool(b) => Object::new(Repr::Bool(*b), ty),
            Repr::Int(i) => Object::new(Repr::Int(*i), ty),
            Repr::Real(r) => Object::new(Repr::Real(*r), ty),
            Repr::Str(s) => Object::new(Repr::Str(s.clone()), ty),
            Repr::Array(items) => {
                Object::new(Repr::Array(RefCell::new(items.borrow().clone())), ty)
            }
            Repr::Tuple(items) => Object::new(Repr::Tuple(items.clone()), ty),
            Repr::Map(map) => Object::new(Repr::Map(RefCell::new(map.borrow().clone())), ty),
            _ => Rc::clone(obj),
        }
    }

    /// Structural equality for builtin kinds.
    ///
    /// Int and real compare after numeric promotion; containers compare
    /// element-wise; types compare by name; every other kind compares by
    /// identity. Declared instances dispatch `__eq__` at the operator level,
    /// not here.
    pub fn eq_builtin(a: &ObjectRef, b: &ObjectRef) -> bool {
        match (&a.repr, &b.repr) {
            (Repr::Null, Repr::Null) => true,
            (Repr::Bool(x), Repr::Bool(y)) => x == y,
            (Repr::Int(x), Repr::Int(y)) => x == y,
            (Repr::Real(x), Repr::Real(y)) => x == y,
            (Repr::Int(x), Repr::Real(y)) | (Repr::Real(y), Repr::Int(x)) => *x as f64 == *y,
            (Repr::Str(x), Repr::Str(y)) => x == y,
            (Repr::Array(x), Repr::Array(y)) => {
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| Object::eq_builtin(a, b))
            }
            (Repr::Tuple(x), Repr::Tuple(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| Object::eq_builtin(a, b))
            }
            (Repr::Map(x), Repr::Map(y)) => {
                let (x, y) = (x.borrow(), y.borrow());
                x.entries.len() == y.entries.len()
                    && x.entries.iter().all(|(k, (_, v))| {
                        y.entries
                            .get(k)
                            .is_some_and(|(_, w)| Object::eq_builtin(v, w))
                    })
            }
            (Repr::Type(x), Repr::Type(y)) => x.name() == y.name(),
            (Repr::DeclType(x), Repr::DeclType(y)) => x.name() == y.name(),
            _ => Rc::ptr_eq(a, b),
        }
    }

    /// A hashable map key for this object, when its kind permits one.
    ///
    /// Only ints, strings, and tuples thereof are hashable.
    pub fn map_key(&self) -> Option<MapKey> {
        match &self.repr {
            Repr::Int(i) => Some(MapKey::Int(*i)),
            Repr::Str(s) => Some(MapKey::Str(s.clone())),
            Repr::Tuple(items) => {
                let keys: Option<Vec<MapKey>> = items.iter().map(|o| o.map_key()).collect();
                keys.map(MapKey::Tuple)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.kind().name())
    }
}

/// Map payload: entries keyed by hashable key, holding the original key
/// object alongside the value so iteration can recover it.
#[derive(Clone)]
pub struct MapRepr {
    pub entries: HashMap<MapKey, (ObjectRef, ObjectRef)>,
}

impl MapRepr {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl Default for MapRepr {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashable key for map entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    Str(String),
    Tuple(Vec<MapKey>),
}

impl MapKey {
    /// Build a key from an object, or fail with INCOMPATIBLE_TYPE.
    pub fn try_from_object(obj: &ObjectRef) -> Result<Self, RuntimeError> {
        obj.map_key().ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("'{}' is not a hashable map key", obj.kind().name()),
            )
        })
    }
}

/// Captured output of a command expression in its capture form.
pub struct CmdObject {
    /// Everything the pipeline wrote to its stdout.
    pub output: String,
    /// Exit status of the last pipeline stage.
    pub status: i32,
}

impl CmdObject {
    /// Output split into lines, the unit of CMD iteration.
    pub fn lines(&self) -> Vec<String> {
        self.output.lines().map(|l| l.to_string()).collect()
    }
}

/// Iterator over an array or tuple.
pub struct ArrayIter {
    pub target: ObjectRef,
    pub index: Cell<usize>,
}

impl ArrayIter {
    pub(crate) fn remaining(&self) -> usize {
        let len = match &self.target.repr {
            Repr::Array(items) => items.borrow().len(),
            Repr::Tuple(items) => items.len(),
            _ => 0,
        };
        len.saturating_sub(self.index.get())
    }
}

/// Iterator over a captured command's output lines.
pub struct CmdIter {
    pub lines: Vec<String>,
    pub index: Cell<usize>,
}

/// A module object: attribute reads go through the module's root scope.
pub struct Module {
    pub name: String,
    pub scope: SymbolTableStack,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f() -> ObjectFactory {
        ObjectFactory::new()
    }

    #[test]
    fn every_object_has_a_type_reference() {
        let f = f();
        for obj in [
            f.new_null(),
            f.new_bool(true),
            f.new_int(1),
            f.new_real(1.5),
            f.new_str("s"),
            f.new_array(vec![]),
            f.new_tuple(vec![]),
            f.new_map(),
        ] {
            assert!(obj.obj_type().is_some(), "{:?} missing type", obj);
        }
        // only the root `type` object has none
        assert!(f.type_type().obj_type().is_none());
    }

    #[test]
    fn scalar_copy_is_fresh_identity() {
        let f = f();
        let a = f.new_int(7);
        let b = Object::copy(&a);
        assert!(Object::eq_builtin(&a, &b));
        assert!(!Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn container_copy_shares_elements() {
        let f = f();
        let inner = f.new_array(vec![f.new_int(1)]);
        let outer = f.new_array(vec![Rc::clone(&inner)]);
        let copied = Object::copy(&outer);
        assert!(!Rc::ptr_eq(&outer, &copied));
        let Repr::Array(items) = &copied.repr else {
            panic!("copy changed kind");
        };
        assert!(Rc::ptr_eq(&items.borrow()[0], &inner));
    }

    #[test]
    fn int_real_promote_in_equality() {
        let f = f();
        assert!(Object::eq_builtin(&f.new_int(2), &f.new_real(2.0)));
        assert!(!Object::eq_builtin(&f.new_int(2), &f.new_real(2.5)));
    }

    #[test]
    fn tuple_keys_are_hashable() {
        let f = f();
        let key = f.new_tuple(vec![f.new_int(1), f.new_str("a")]);
        assert_eq!(
            key.map_key(),
            Some(MapKey::Tuple(vec![MapKey::Int(1), MapKey::Str("a".into())]))
        );
        // a tuple holding an array is not hashable
        let bad = f.new_tuple(vec![f.new_array(vec![])]);
        assert_eq!(bad.map_key(), None);
    }

    #[test]
    fn type_names_are_canonical() {
        let f = f();
        assert_eq!(f.new_int(1).type_name(), "int");
        assert_eq!(f.new_str("x").type_name(), "string");
        assert_eq!(f.new_array(vec![]).type_name(), "array");
    }
}
