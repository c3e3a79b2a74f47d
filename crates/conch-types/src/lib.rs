//! Pure data types for conch — runtime errors, source positions, job status.
//!
//! This crate is a leaf dependency with no process or I/O machinery. It
//! exists so that embedders (REPL frontends, editors) can work with conch's
//! error and job types without pulling conch-kernel's unix deps.

pub mod error;
pub mod job;

// Flat re-exports for convenience
pub use error::*;
pub use job::*;
