//! # Reactor - Single-Threaded Event Dispatch
//!
//! A client process runs one reactor: a cooperative loop multiplexing
//! its connection to the broker, dispatching inbound command envelopes
//! to registered callbacks and managing reply and error propagation.
//!
//! ## Dispatch Protocol
//!
//! ```text
//! envelope arrives ──→ key built from command name
//!                          │
//!                          ▼
//!                 callback table lookup (Matches, registration order)
//!                          │
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//!     no match:                        handler runs
//!     auto NotFound reply                  │
//!                              ┌───────────┼───────────────┐
//!                              ▼           ▼               ▼
//!                          Replied   FailedWithReply    Deferred
//!                          auto OK   error stack packed  reactor stays
//!                          reply     into the reply      silent
//! ```
//!
//! The three-case completion result makes reply ownership explicit and
//! removes the double-reply hazard: the reactor answers unless the
//! handler declared it already did (or will).
//!
//! Shared mutable state (the error stack) is touched only by the single
//! reactor task, so no locking is required.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod debug_cb;
pub mod dispatch;
pub mod handler;
pub mod key;
pub mod logctl;
pub mod task;

// Re-export main types
pub use debug_cb::{debug_command_schema, make_debug_callback, DEBUG_CMD};
pub use dispatch::{Reactor, ReactorContext};
pub use handler::{Callback, CallbackResult, CallbackTable};
pub use key::EventKey;
pub use logctl::{LogControl, LogSettings, SharedLogSettings};
pub use task::{AppOptions, NoAppOptions, Task, TaskOutcome, UsageError};

/// Module id stamped on diagnostic entries raised by the dispatch layer.
pub const MODULE_ID: &str = "reactor";

/// Diagnostic code: no callback matched the command of an envelope.
pub const CODE_COMMAND_NOT_FOUND: i32 = 1;
