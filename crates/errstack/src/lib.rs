//! # Error Stack - Ordered Per-Process Diagnostics
//!
//! Every process owns one bounded stack of diagnostic entries, created at
//! process init and torn down with the process. Operations push context
//! onto it as failures propagate; the reactor packs it into an error
//! reply so the full diagnostic trail reaches the caller over the wire.
//!
//! ## Ownership
//!
//! The stack is an explicit value passed to the operations that need it,
//! not a process-wide global. The reactor loop owns one instance; since a
//! single logical thread of control touches it, no locking is required.
//!
//! ## Wire Format
//!
//! `pack` renders entries oldest-to-newest, one record per entry, fields
//! separated by an ASCII unit separator and records by a record
//! separator:
//!
//! ```text
//! timestamp␟procName␟moduleId␟file:line␟code␟isUser␟severity␟message␞...
//! ```
//!
//! `unpack` reconstructs the same ordered sequence. Neither packs nor
//! unpacks ever panic; both return a local failure code.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entry;
pub mod stack;

// Re-export main types
pub use entry::{wall_clock_timestamp, ErrorEntry, Severity};
pub use stack::{ErrorStack, StackError, STACK_MAX_SIZE};
