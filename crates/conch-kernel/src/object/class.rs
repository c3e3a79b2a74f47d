//! Type objects, declared classes, interfaces, and instances.
//!
//! Types are tagged records with an optional base handle and a list of
//! interface handles. Method lookup is a single walk `self → base → ...`;
//! interface conformance is a one-shot check at class-declaration time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use conch_types::{ErrorCode, RuntimeError};

use crate::interpreter::{SymbolTableStack, TableKind};

use super::{Kind, Object, ObjectRef, Repr};

/// A builtin type object. Calling it runs the constructor selected by
/// [`TypeCtor`].
pub struct TypeObject {
    name: String,
    scope: SymbolTableStack,
    ctor: TypeCtor,
}

/// Which builtin constructor a type object runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCtor {
    /// `type(x)` — returns the argument's type object.
    Type,
    /// `null_t()` — not constructible.
    Null,
    /// `bool(x)` — truthiness conversion.
    Bool,
    /// `int(x)` — integer conversion.
    Int,
    /// `real(x)` — real conversion.
    Real,
    /// `string(x)` / `str(x)` — string conversion.
    Str,
    /// `array(x)` — container conversion/copy.
    Array,
    /// `tuple(x)` — container conversion/copy.
    Tuple,
    /// `map(x)` — map copy.
    Map,
    /// `func` — not constructible.
    Func,
    /// Internal types with no user-facing constructor.
    Opaque,
}

impl TypeObject {
    pub(crate) fn new(name: &str, ctor: TypeCtor) -> Self {
        let mut scope = SymbolTableStack::new();
        scope.push_table(TableKind::Class);
        Self {
            name: name.to_string(),
            scope,
            ctor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ctor(&self) -> TypeCtor {
        self.ctor
    }

    /// The type's attribute scope.
    pub fn scope(&self) -> &SymbolTableStack {
        &self.scope
    }
}

/// An abstract method signature.
///
/// Equality follows the conformance rule: when variadic, all three fields
/// must match; otherwise only the parameter count and variadicity are
/// compared — the total count fixes every legal call shape, so the default
/// split is not part of the contract.
#[derive(Debug, Clone, Copy)]
pub struct AbstractMethod {
    pub num_params: usize,
    pub num_default_params: usize,
    pub variadic: bool,
}

impl AbstractMethod {
    /// Does a concrete function satisfy this signature?
    pub fn matches(&self, num_params: usize, num_default_params: usize, variadic: bool) -> bool {
        if self.variadic {
            self.num_params == num_params
                && self.num_default_params == num_default_params
                && self.variadic == variadic
        } else {
            self.num_params == num_params && self.variadic == variadic
        }
    }
}

impl PartialEq for AbstractMethod {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.num_params, other.num_default_params, other.variadic)
    }
}

/// A user-declared class type.
pub struct DeclClass {
    name: String,
    scope: SymbolTableStack,
    base: Option<ObjectRef>,
    interfaces: Vec<ObjectRef>,
    is_abstract: bool,
    abstract_methods: RefCell<HashMap<String, AbstractMethod>>,
}

impl DeclClass {
    /// Build the class record, inheriting the base's abstract methods.
    ///
    /// Duplicate abstract-method names across base and self are rejected.
    pub(crate) fn new(
        name: &str,
        decl_scope: &SymbolTableStack,
        base: Option<ObjectRef>,
        interfaces: Vec<ObjectRef>,
        is_abstract: bool,
    ) -> Result<Self, RuntimeError> {
        let mut scope = decl_scope.clone();
        scope.push_table(TableKind::Class);

        let mut abstract_methods = HashMap::new();
        if let Some(base_obj) = &base {
            let Repr::DeclType(base_class) = &base_obj.repr else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("base of class '{name}' must be a declared class"),
                ));
            };
            for (mname, sig) in base_class.abstract_methods.borrow().iter() {
                if abstract_methods.insert(mname.clone(), *sig).is_some() {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("not allowed same name '{mname}' method on class"),
                    ));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            scope,
            base,
            interfaces,
            is_abstract,
            abstract_methods: RefCell::new(abstract_methods),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn base(&self) -> Option<&ObjectRef> {
        self.base.as_ref()
    }

    pub fn interfaces(&self) -> &[ObjectRef] {
        &self.interfaces
    }

    /// The class scope: declaration-site stack plus the class table.
    pub fn scope(&self) -> &SymbolTableStack {
        &self.scope
    }

    /// Register a method in the class table. Duplicate names are an error.
    pub(crate) fn register_method(&self, name: &str, func: ObjectRef) -> Result<(), RuntimeError> {
        if !self.scope.insert_unique(name, func) {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("not allowed same name '{name}' method on class"),
            ));
        }
        Ok(())
    }

    /// Declare an abstract method on this class.
    ///
    /// Only abstract classes may declare them; names must be unique against
    /// both inherited abstract methods and implemented attributes.
    pub(crate) fn add_abstract_method(
        &self,
        name: &str,
        sig: AbstractMethod,
    ) -> Result<(), RuntimeError> {
        if !self.is_abstract {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("not allowed abstract '{name}' method on non-abstract class"),
            ));
        }
        let mut methods = self.abstract_methods.borrow_mut();
        if methods.contains_key(name) {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("not allowed same name '{name}' method on class"),
            ));
        }
        if self.search_attr(name).is_some() {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("not allowed same name '{name}' attribute on class"),
            ));
        }
        methods.insert(name.to_string(), sig);
        Ok(())
    }

    /// The full abstract-method set (inherited plus declared).
    pub fn abstract_methods(&self) -> HashMap<String, AbstractMethod> {
        self.abstract_methods.borrow().clone()
    }

    /// Look up an attribute on this class and its base chain.
    ///
    /// Only the class table itself is consulted, then the walk recurses into
    /// the base; the declaration-site scope beneath the class table is not
    /// part of method resolution.
    pub fn search_attr(&self, name: &str) -> Option<ObjectRef> {
        if self.scope.exists_in_top(name) {
            return self.scope.shared_access(name);
        }
        match &self.base {
            Some(base_obj) => match &base_obj.repr {
                Repr::DeclType(base_class) => base_class.search_attr(name),
                _ => None,
            },
            None => None,
        }
    }

    /// Verify every abstract method has a matching implementation.
    ///
    /// Abstract classes skip the check; a derived class has to implement
    /// what they leave open.
    pub(crate) fn check_abstract_methods(&self) -> Result<(), RuntimeError> {
        if self.is_abstract {
            return Ok(());
        }
        for (name, sig) in self.abstract_methods.borrow().iter() {
            let Some(attr) = self.search_attr(name) else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("abstract method '{name}' not implemented"),
                ));
            };
            let Repr::Func(func) = &attr.repr else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("attribute '{name}' is not a method"),
                ));
            };
            // the declared parameter list includes the implicit self
            if !sig.matches(
                func.num_params().saturating_sub(1),
                func.num_default_params(),
                func.variadic().is_some(),
            ) {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("method '{name}' has wrong number of parameters"),
                ));
            }
        }
        Ok(())
    }

    /// Verify every interface method is satisfied.
    ///
    /// An interface method that this class re-declared as abstract with the
    /// same signature is deferred to derived classes.
    pub(crate) fn check_interfaces(&self) -> Result<(), RuntimeError> {
        for iface_obj in &self.interfaces {
            let Repr::Iface(iface) = &iface_obj.repr else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    "only interfaces can be implemented".to_string(),
                ));
            };
            for (name, sig) in iface.methods() {
                if let Some(own) = self.abstract_methods.borrow().get(name) {
                    if own == sig {
                        continue;
                    }
                }
                let Some(attr) = self.search_attr(name) else {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("interface method '{name}' not implemented"),
                    ));
                };
                let Repr::Func(func) = &attr.repr else {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("attribute '{name}' is not a method"),
                    ));
                };
                if !sig.matches(
                    func.num_params().saturating_sub(1),
                    func.num_default_params(),
                    func.variadic().is_some(),
                ) {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("method '{name}' has wrong number of parameters"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A declared interface: a named bag of method signatures.
pub struct Interface {
    name: String,
    methods: HashMap<String, AbstractMethod>,
}

impl Interface {
    /// Build an interface, merging methods from base interfaces uniquely.
    pub(crate) fn new(
        name: &str,
        bases: &[ObjectRef],
        own_methods: Vec<(String, AbstractMethod)>,
    ) -> Result<Self, RuntimeError> {
        let mut methods = HashMap::new();
        for base_obj in bases {
            let Repr::Iface(base) = &base_obj.repr else {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("base of interface '{name}' must be an interface"),
                ));
            };
            for (mname, sig) in base.methods() {
                if methods.insert(mname.clone(), *sig).is_some() {
                    return Err(RuntimeError::new(
                        ErrorCode::IncompatibleType,
                        format!("not allowed same name '{mname}' method on interface"),
                    ));
                }
            }
        }
        for (mname, sig) in own_methods {
            if methods.insert(mname.clone(), sig).is_some() {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("not allowed same name '{mname}' method on interface"),
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            methods,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &HashMap<String, AbstractMethod> {
        &self.methods
    }
}

/// A declared-class instance.
///
/// The instance owns its attribute scope; `self` is held as a weak
/// back-reference so the ownership graph stays acyclic even when the scope
/// ends up holding functions that close over the instance.
pub struct Instance {
    scope: SymbolTableStack,
    self_ref: RefCell<Weak<Object>>,
}

impl Instance {
    pub(crate) fn new() -> Self {
        let mut scope = SymbolTableStack::new();
        scope.push_table(TableKind::Block);
        Self {
            scope,
            self_ref: RefCell::new(Weak::new()),
        }
    }

    pub(crate) fn bind_self(&self, obj: &ObjectRef) {
        *self.self_ref.borrow_mut() = Rc::downgrade(obj);
    }

    /// Upgrade the weak back-reference. Cannot fail while the instance is
    /// alive, which is the only time code can reach it.
    pub fn self_obj(&self) -> Result<ObjectRef, RuntimeError> {
        self.self_ref.borrow().upgrade().ok_or_else(|| {
            RuntimeError::new(ErrorCode::InvalidOpcode, "instance self reference expired")
        })
    }

    /// The instance's attribute scope.
    pub fn scope(&self) -> &SymbolTableStack {
        &self.scope
    }

    /// Assign an attribute directly on the instance.
    pub fn set_attr(&self, name: &str, value: ObjectRef) {
        self.scope.insert_top(name, value);
    }
}

/// Resolve the declared class record behind an instance's type reference.
pub(crate) fn class_of(instance_obj: &Object) -> Result<&DeclClass, RuntimeError> {
    match instance_obj.obj_type() {
        Some(t) => match &t.repr {
            Repr::DeclType(class) => Ok(class),
            _ => Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                "object's type is not a declared class",
            )),
        },
        None => Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            "object has no type reference",
        )),
    }
}

/// Kind check shorthand used by attribute paths.
pub(crate) fn is_func(obj: &Object) -> bool {
    obj.kind() == Kind::Func
}
