//! AST type definitions.
//!
//! Lexing and parsing live outside this crate; the parser hands the
//! evaluator a [`Program`] built from these nodes. Every node carries the
//! source [`Position`] the parser recorded for it, which the evaluator
//! threads onto runtime errors.
//!
//! [`Position`]: conch_types::Position

mod types;

pub use types::*;
