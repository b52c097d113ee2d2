//! # Command Schema - Typed, Validated Parameters
//!
//! A command is an ordered set of uniquely-named, typed parameters plus
//! the raw body it was parsed from. The schema is built once per command
//! definition; each invocation binds the `-name value` tokens of an
//! incoming envelope body to the declared parameters, type- and
//! range-checking every assignment before it is committed.
//!
//! Validation failures are never fatal: they come back as a local
//! `Err` and simultaneously push a diagnostic entry onto the calling
//! process's error stack.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod command;
pub mod param;

// Re-export main types
pub use command::Command;
pub use param::{Param, ParamType, ParamValue, SchemaError};

/// Module id stamped on diagnostic entries raised by this crate.
pub const MODULE_ID: &str = "cmd";
