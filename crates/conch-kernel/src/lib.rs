//! conch-kernel: the core of the conch shell-scripting language.
//!
//! This crate provides:
//!
//! - **AST**: type definitions consumed from an external parser
//! - **Object model**: runtime values, type objects, operator dispatch
//! - **Interpreter**: the tree-walking evaluator, symbol-table stacks,
//!   deferred statements, and the typed error plumbing
//! - **Cmd**: command-expression evaluation and the POSIX job/pipeline
//!   executor (process groups, pipes, terminal handoff)

pub mod ast;
pub mod cmd;
pub mod interpreter;
pub mod object;

pub use cmd::{BuiltinFn, Job, Process, ShellContext, ShellEnv};
pub use interpreter::{Interpreter, ModuleLoader, NoModules, SymbolTableStack};
pub use object::{Kind, Object, ObjectFactory, ObjectRef};

// the error taxonomy lives in the leaf types crate
pub use conch_types::{ErrorCode, JobId, JobInfo, JobStatus, Position, RuntimeError};
