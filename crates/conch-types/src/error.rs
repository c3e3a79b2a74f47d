//! The typed runtime-error taxonomy.
//!
//! Every semantic failure in the evaluator and the job executor is reported
//! as a [`RuntimeError`]: a closed [`ErrorCode`], a formatted message, and
//! an optional source [`Position`] propagated from the AST.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position in the source program, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// The closed set of runtime error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// An operation was applied to an object of the wrong kind.
    IncompatibleType,
    /// A command could not be launched (bad argv, fork/pipe failure, not found).
    InvalidCommand,
    /// Wrong number or shape of call arguments.
    FuncParams,
    /// An identifier or attribute could not be resolved.
    SymbolNotFound,
    /// An index fell outside a container's bounds.
    OutOfRange,
    /// A map lookup found no entry for the key.
    KeyNotFound,
    /// A control-flow statement was used where it has no meaning.
    InvalidOpcode,
    /// A module could not be loaded.
    ImportError,
    /// An assertion failed or a user `throw` was raised.
    Assert,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::IncompatibleType => "incompatible type",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::FuncParams => "invalid parameters",
            ErrorCode::SymbolNotFound => "symbol not found",
            ErrorCode::OutOfRange => "out of range",
            ErrorCode::KeyNotFound => "key not found",
            ErrorCode::InvalidOpcode => "invalid operation",
            ErrorCode::ImportError => "import error",
            ErrorCode::Assert => "assertion",
        };
        write!(f, "{name}")
    }
}

/// A runtime error raised during evaluation or job launch.
///
/// Propagation uses `Result` + `?`; `try/catch` frames examine [`code`]
/// and rethrow when unmatched.
///
/// [`code`]: RuntimeError::code
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}{}", pos_suffix(.pos))]
pub struct RuntimeError {
    /// Which class of failure this is.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Source position, when the AST provided one.
    pub pos: Option<Position>,
}

impl RuntimeError {
    /// Create an error with no source position.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            pos: None,
        }
    }

    /// Attach a source position if the error doesn't carry one yet.
    ///
    /// The innermost position wins: once set, outer frames never overwrite it.
    pub fn at(mut self, pos: Position) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }
}

fn pos_suffix(pos: &Option<Position>) -> String {
    match pos {
        Some(p) => format!(" at {p}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_position() {
        let err = RuntimeError::new(ErrorCode::KeyNotFound, "no entry for 'x'");
        assert_eq!(err.to_string(), "key not found: no entry for 'x'");
    }

    #[test]
    fn display_with_position() {
        let err = RuntimeError::new(ErrorCode::SymbolNotFound, "undefined symbol 'y'")
            .at(Position::new(3, 7));
        assert_eq!(err.to_string(), "symbol not found: undefined symbol 'y' at 3:7");
    }

    #[test]
    fn at_keeps_innermost_position() {
        let err = RuntimeError::new(ErrorCode::OutOfRange, "index 9")
            .at(Position::new(1, 1))
            .at(Position::new(5, 5));
        assert_eq!(err.pos, Some(Position::new(1, 1)));
    }
}
