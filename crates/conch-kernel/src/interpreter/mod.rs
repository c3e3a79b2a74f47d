//! The tree-walking evaluator.
//!
//! Statement execution returns a tagged [`Flow`] outcome instead of mutating
//! stop flags: `break`/`continue` are consumed by the enclosing loop or
//! switch, `return` by the enclosing function call, and throws travel as the
//! `Err` arm of `Result` until a `try/catch` frame matches their code.
//!
//! Scope executors (function bodies and the program root) own a defer stack;
//! deferred statements are captured with a snapshot of the symbol-table
//! stack and drained in LIFO order on every exit path.

mod call;
mod expr;
mod natives;
mod stmt;
mod symbol_table;

pub use call::call_object;
pub use symbol_table::{SymbolAttr, SymbolTable, SymbolTableStack, TableKind};

pub(crate) use expr::eval_expr;
pub(crate) use stmt::{exec_stmt, exec_stmts};

use conch_types::{ErrorCode, RuntimeError};
use tracing::{debug, warn};

use crate::ast::{Program, Stmt};
use crate::cmd::ShellEnv;
use crate::object::{ObjectFactory, ObjectRef};

/// Everything an evaluation step needs besides the symbol stack: the object
/// factory and the shell context for command execution.
pub struct ExecCtx<'a> {
    pub factory: ObjectFactory,
    pub shell: &'a ShellEnv,
}

impl<'a> ExecCtx<'a> {
    pub fn new(factory: ObjectFactory, shell: &'a ShellEnv) -> Self {
        Self { factory, shell }
    }
}

/// The outcome of executing one statement.
///
/// Throws are not a variant: they propagate as `Err(RuntimeError)`.
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next statement.
    Normal,
    /// Unwind to the enclosing loop or switch.
    Break,
    /// Unwind to the enclosing loop's next iteration.
    Continue,
    /// Unwind to the enclosing function call with a value.
    Return(ObjectRef),
}

/// Per-scope defer bookkeeping, owned by function bodies and the root.
///
/// Deferred statements registered anywhere inside the scope (loops and
/// nested blocks included) land here and run when the scope exits.
pub struct ScopeExec {
    defers: Vec<(Stmt, SymbolTableStack)>,
}

impl ScopeExec {
    pub fn new() -> Self {
        Self { defers: Vec::new() }
    }

    /// Register a deferred statement with its captured stack snapshot.
    pub fn push_defer(&mut self, stmt: Stmt, snapshot: SymbolTableStack) {
        self.defers.push((stmt, snapshot));
    }

    /// Drain the defer stack in LIFO order.
    ///
    /// Each deferred statement runs as a fresh scope rooted at its captured
    /// stack. A throw preempts the remaining defers at this level and
    /// propagates; outer scopes still drain their own.
    pub fn drain(&mut self, ctx: &ExecCtx<'_>) -> Result<(), RuntimeError> {
        while let Some((stmt, snapshot)) = self.defers.pop() {
            debug!(remaining = self.defers.len(), "running deferred statement");
            let mut nested = ScopeExec::new();
            let flow = exec_stmt(ctx, &snapshot, &stmt, &mut nested);
            let drained = nested.drain(ctx);
            flow?;
            drained?;
        }
        Ok(())
    }
}

impl Default for ScopeExec {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves module names to parsed programs for `import`.
///
/// Parsing lives outside this crate, so the embedder supplies the loader;
/// the default loader refuses every import.
pub trait ModuleLoader {
    fn load(&self, module: &str, is_path: bool) -> Result<Program, RuntimeError>;
}

/// The default loader: every import fails with IMPORT_ERROR.
pub struct NoModules;

impl ModuleLoader for NoModules {
    fn load(&self, module: &str, _is_path: bool) -> Result<Program, RuntimeError> {
        Err(RuntimeError::new(
            ErrorCode::ImportError,
            format!("no module loader configured, can't import '{module}'"),
        ))
    }
}

/// The interpreter: a root symbol stack seeded with the builtin types and
/// natives, plus the shell environment commands run against.
pub struct Interpreter {
    stack: SymbolTableStack,
    factory: ObjectFactory,
    shell: ShellEnv,
}

impl Interpreter {
    /// Create an interpreter with a default (non-interactive) shell
    /// environment.
    pub fn new() -> Self {
        Self::with_shell(ShellEnv::default())
    }

    /// Create an interpreter over an explicit shell environment.
    pub fn with_shell(shell: ShellEnv) -> Self {
        let factory = ObjectFactory::new();
        let stack = SymbolTableStack::new();
        factory.register_into(&stack);
        natives::register_into(&factory, &stack);
        Self {
            stack,
            factory,
            shell,
        }
    }

    /// The root symbol-table stack.
    pub fn sym_table_stack(&self) -> &SymbolTableStack {
        &self.stack
    }

    /// The shell environment commands run against.
    pub fn shell(&self) -> &ShellEnv {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut ShellEnv {
        &mut self.shell
    }

    /// Evaluate a parsed program in the root scope.
    ///
    /// The root scope's defer stack drains before this returns, on both the
    /// normal and the error path.
    pub fn exec(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let ctx = ExecCtx::new(self.factory.clone(), &self.shell);
        let mut scope = ScopeExec::new();
        let flow = exec_stmts(&ctx, &self.stack, &program.statements, &mut scope);
        let drained = scope.drain(&ctx);
        let flow = flow?;
        drained?;
        match flow {
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break | Flow::Continue => Err(RuntimeError::new(
                ErrorCode::InvalidOpcode,
                "break or continue outside of a loop",
            )),
        }
    }

    /// Evaluate a program; uncaught errors print message and position to
    /// stderr and turn into a non-zero exit status.
    pub fn exec_or_report(&mut self, program: &Program) -> i32 {
        match self.exec(program) {
            Ok(()) => 0,
            Err(err) => {
                warn!(code = ?err.code, "uncaught runtime error");
                eprintln!("{err}");
                1
            }
        }
    }

    /// Evaluate a single expression against the root scope (REPL helper).
    pub fn eval(&mut self, expr: &crate::ast::Expr) -> Result<ObjectRef, RuntimeError> {
        let ctx = ExecCtx::new(self.factory.clone(), &self.shell);
        eval_expr(&ctx, &self.stack, expr)
    }

    /// Run a nested interpreter over a module program and return its root
    /// stack, for module-object attribute read-through.
    pub(crate) fn exec_module(
        ctx: &ExecCtx<'_>,
        program: &Program,
    ) -> Result<SymbolTableStack, RuntimeError> {
        let stack = SymbolTableStack::new();
        ctx.factory.register_into(&stack);
        natives::register_into(&ctx.factory, &stack);
        let mut scope = ScopeExec::new();
        let flow = exec_stmts(ctx, &stack, &program.statements, &mut scope);
        let drained = scope.drain(ctx);
        flow?;
        drained?;
        Ok(stack)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
