//! Object construction.
//!
//! The factory owns the singleton builtin type objects and stamps every new
//! object with its type reference. The root `type` object is the only
//! object whose type reference is empty.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::interpreter::SymbolTableStack;

use super::class::{DeclClass, Instance, Interface, TypeCtor, TypeObject};
use super::func::{FuncObject, NativeFn, ParamSpec, WrapperFunc};
use super::{ArrayIter, CmdIter, CmdObject, MapRepr, Module, Object, ObjectRef, Repr};

use crate::ast::Block;

struct TypeRegistry {
    type_type: ObjectRef,
    null_type: ObjectRef,
    bool_type: ObjectRef,
    int_type: ObjectRef,
    real_type: ObjectRef,
    str_type: ObjectRef,
    array_type: ObjectRef,
    tuple_type: ObjectRef,
    map_type: ObjectRef,
    func_type: ObjectRef,
    module_type: ObjectRef,
    cmd_type: ObjectRef,
    array_iter_type: ObjectRef,
    cmd_iter_type: ObjectRef,
}

impl TypeRegistry {
    fn new() -> Self {
        // the root `type` object is its own fixed point: no type reference
        let type_type = Object::new(Repr::Type(TypeObject::new("type", TypeCtor::Type)), None);
        let mk = |name: &str, ctor: TypeCtor| {
            Object::new(
                Repr::Type(TypeObject::new(name, ctor)),
                Some(Rc::clone(&type_type)),
            )
        };
        Self {
            null_type: mk("null_t", TypeCtor::Null),
            bool_type: mk("bool", TypeCtor::Bool),
            int_type: mk("int", TypeCtor::Int),
            real_type: mk("real", TypeCtor::Real),
            str_type: mk("string", TypeCtor::Str),
            array_type: mk("array", TypeCtor::Array),
            tuple_type: mk("tuple", TypeCtor::Tuple),
            map_type: mk("map", TypeCtor::Map),
            func_type: mk("func", TypeCtor::Func),
            module_type: mk("module", TypeCtor::Opaque),
            cmd_type: mk("cmdobj", TypeCtor::Opaque),
            array_iter_type: mk("array_iter", TypeCtor::Opaque),
            cmd_iter_type: mk("cmd_iter", TypeCtor::Opaque),
            type_type,
        }
    }
}

/// Cheap-to-clone handle on the type registry; every executor carries one.
#[derive(Clone)]
pub struct ObjectFactory {
    types: Rc<TypeRegistry>,
}

impl ObjectFactory {
    pub fn new() -> Self {
        Self {
            types: Rc::new(TypeRegistry::new()),
        }
    }

    pub fn type_type(&self) -> ObjectRef {
        Rc::clone(&self.types.type_type)
    }

    pub fn new_null(&self) -> ObjectRef {
        Object::new(Repr::Null, Some(Rc::clone(&self.types.null_type)))
    }

    pub fn new_bool(&self, value: bool) -> ObjectRef {
        Object::new(Repr::Bool(value), Some(Rc::clone(&self.types.bool_type)))
    }

    pub fn new_int(&self, value: i64) -> ObjectRef {
        Object::new(Repr::Int(value), Some(Rc::clone(&self.types.int_type)))
    }

    pub fn new_real(&self, value: f64) -> ObjectRef {
        Object::new(Repr::Real(value), Some(Rc::clone(&self.types.real_type)))
    }

    pub fn new_str(&self, value: impl Into<String>) -> ObjectRef {
        Object::new(
            Repr::Str(value.into()),
            Some(Rc::clone(&self.types.str_type)),
        )
    }

    pub fn new_array(&self, items: Vec<ObjectRef>) -> ObjectRef {
        Object::new(
            Repr::Array(RefCell::new(items)),
            Some(Rc::clone(&self.types.array_type)),
        )
    }

    pub fn new_tuple(&self, items: Vec<ObjectRef>) -> ObjectRef {
        Object::new(
            Repr::Tuple(items),
            Some(Rc::clone(&self.types.tuple_type)),
        )
    }

    pub fn new_map(&self) -> ObjectRef {
        Object::new(
            Repr::Map(RefCell::new(MapRepr::new())),
            Some(Rc::clone(&self.types.map_type)),
        )
    }

    pub fn new_map_from(&self, map: MapRepr) -> ObjectRef {
        Object::new(
            Repr::Map(RefCell::new(map)),
            Some(Rc::clone(&self.types.map_type)),
        )
    }

    pub(crate) fn new_declared_func(
        &self,
        name: Option<String>,
        params: Vec<ParamSpec>,
        variadic: Option<String>,
        block: Rc<Block>,
        scope: SymbolTableStack,
        is_static: bool,
    ) -> ObjectRef {
        Object::new(
            Repr::Func(FuncObject::declared(
                name, params, variadic, block, scope, is_static,
            )),
            Some(Rc::clone(&self.types.func_type)),
        )
    }

    pub(crate) fn new_native_func(&self, name: &str, handler: NativeFn) -> ObjectRef {
        Object::new(
            Repr::Func(FuncObject::native(name, handler)),
            Some(Rc::clone(&self.types.func_type)),
        )
    }

    /// Wrap a function with a bound `self` (re-binding if already wrapped).
    pub fn new_wrapper(&self, func: ObjectRef, self_obj: ObjectRef) -> ObjectRef {
        Object::new(
            Repr::Wrapper(WrapperFunc::new(func, self_obj)),
            Some(Rc::clone(&self.types.func_type)),
        )
    }

    pub(crate) fn new_decl_class(&self, class: DeclClass) -> ObjectRef {
        Object::new(Repr::DeclType(class), Some(Rc::clone(&self.types.type_type)))
    }

    pub(crate) fn new_interface(&self, iface: Interface) -> ObjectRef {
        Object::new(Repr::Iface(iface), Some(Rc::clone(&self.types.type_type)))
    }

    /// Allocate a declared-class instance and bind its weak self reference.
    ///
    /// `__init__` invocation is the caller's job.
    pub fn new_instance(&self, class_obj: &ObjectRef) -> ObjectRef {
        let obj = Object::new(Repr::Instance(Instance::new()), Some(Rc::clone(class_obj)));
        if let Repr::Instance(instance) = &obj.repr {
            instance.bind_self(&obj);
        }
        obj
    }

    pub fn new_module(&self, name: &str, scope: SymbolTableStack) -> ObjectRef {
        Object::new(
            Repr::Module(Module {
                name: name.to_string(),
                scope,
            }),
            Some(Rc::clone(&self.types.module_type)),
        )
    }

    pub fn new_cmd(&self, output: String, status: i32) -> ObjectRef {
        Object::new(
            Repr::Cmd(CmdObject { output, status }),
            Some(Rc::clone(&self.types.cmd_type)),
        )
    }

    pub fn new_array_iter(&self, target: ObjectRef) -> ObjectRef {
        Object::new(
            Repr::ArrayIter(ArrayIter {
                target,
                index: Cell::new(0),
            }),
            Some(Rc::clone(&self.types.array_iter_type)),
        )
    }

    pub fn new_cmd_iter(&self, lines: Vec<String>) -> ObjectRef {
        Object::new(
            Repr::CmdIter(CmdIter {
                lines,
                index: Cell::new(0),
            }),
            Some(Rc::clone(&self.types.cmd_iter_type)),
        )
    }

    /// Seed a module-root scope with the builtin type objects and natives.
    pub(crate) fn register_into(&self, stack: &SymbolTableStack) {
        let t = &self.types;
        for (name, obj) in [
            ("type", &t.type_type),
            ("null_t", &t.null_type),
            ("bool", &t.bool_type),
            ("int", &t.int_type),
            ("real", &t.real_type),
            ("string", &t.str_type),
            ("array", &t.array_type),
            ("tuple", &t.tuple_type),
            ("map", &t.map_type),
            ("func", &t.func_type),
        ] {
            stack.insert_top(name, Rc::clone(obj));
        }
        // `str` is the conversion alias for the string type
        stack.insert_top("str", Rc::clone(&t.str_type));
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new()
    }
}
