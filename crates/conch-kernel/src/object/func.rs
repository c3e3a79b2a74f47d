//! Function and wrapper objects.

use std::rc::Rc;

use conch_types::RuntimeError;

use crate::ast::Block;
use crate::interpreter::{ExecCtx, SymbolTableStack};

use super::ObjectRef;

/// Keyword arguments for a call: name → value, in source order.
pub type KwArgs = Vec<(String, ObjectRef)>;

/// A native handler backing a builtin function.
pub type NativeFn = fn(&ExecCtx<'_>, Vec<ObjectRef>, KwArgs) -> Result<ObjectRef, RuntimeError>;

/// A callable: parameter metadata plus either a declared AST body with its
/// captured lexical scope, or a native handler.
pub struct FuncObject {
    name: Option<String>,
    params: Vec<ParamSpec>,
    variadic: Option<String>,
    body: FuncBody,
    is_static: bool,
}

/// A bound parameter slot: name plus its default value, evaluated once at
/// declaration time.
pub struct ParamSpec {
    pub name: String,
    pub default: Option<ObjectRef>,
}

/// What runs when the function is called.
pub enum FuncBody {
    /// A user-declared body over the AST, closed over the stack captured at
    /// declaration.
    Declared {
        block: Rc<Block>,
        scope: SymbolTableStack,
    },
    /// A native Rust handler.
    Native(NativeFn),
}

impl FuncObject {
    pub(crate) fn declared(
        name: Option<String>,
        params: Vec<ParamSpec>,
        variadic: Option<String>,
        block: Rc<Block>,
        scope: SymbolTableStack,
        is_static: bool,
    ) -> Self {
        Self {
            name,
            params,
            variadic,
            body: FuncBody::Declared { block, scope },
            is_static,
        }
    }

    pub(crate) fn native(name: &str, handler: NativeFn) -> Self {
        Self {
            name: Some(name.to_string()),
            params: Vec::new(),
            variadic: None,
            body: FuncBody::Native(handler),
            is_static: false,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_default_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_some()).count()
    }

    pub fn variadic(&self) -> Option<&str> {
        self.variadic.as_deref()
    }

    /// True for user-declared functions (as opposed to natives).
    pub fn is_declared(&self) -> bool {
        matches!(self.body, FuncBody::Declared { .. })
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn body(&self) -> &FuncBody {
        &self.body
    }
}

/// A function with a fixed first argument bound in front of every call.
///
/// Wrapping is idempotent: wrapping a wrapper re-binds the underlying
/// function, so the outermost `self` wins.
pub struct WrapperFunc {
    func: ObjectRef,
    bound_self: ObjectRef,
}

impl WrapperFunc {
    /// Bind `self_obj` as the first argument of `func`.
    ///
    /// If `func` is itself a wrapper, the inner function is re-bound instead
    /// of stacking bindings.
    pub(crate) fn new(func: ObjectRef, self_obj: ObjectRef) -> Self {
        let func = match &func.repr {
            super::Repr::Wrapper(w) => Rc::clone(&w.func),
            _ => func,
        };
        Self {
            func,
            bound_self: self_obj,
        }
    }

    pub fn func(&self) -> &ObjectRef {
        &self.func
    }

    pub fn bound_self(&self) -> &ObjectRef {
        &self.bound_self
    }
}
