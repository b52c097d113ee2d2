//! # Message Protocol - Wire Layer for the instrubus Message Service
//!
//! Defines the envelope exchanged between processes, the length-prefixed
//! framing that carries it over a byte stream, and thin socket wrappers
//! used by both the broker and client reactors.
//!
//! ## Wire Format
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────────┐
//! │ u32 (BE)   │ bincode-encoded Envelope                 │
//! │ body length│ {sender, recipient, command, kind, body} │
//! └────────────┴──────────────────────────────────────────┘
//! ```
//!
//! A command-invocation body is the canonical parameter-assignment text
//! (`-name value` tokens); an error-reply body is a packed error stack.
//! Both are opaque bytes at this layer.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod socket;

// Re-export main types
pub use codec::{read_envelope, write_envelope, MAX_FRAME_LEN};
pub use envelope::{Envelope, MessageKind, RegisterRequest, BROADCAST_RECIPIENT, REGISTER_CMD};
pub use error::ProtocolError;
pub use socket::{
    EnvelopeReader, EnvelopeWriter, MsgSocket, MsgSocketClient, MsgSocketServer,
    RegistrationError,
};

/// Current protocol version carried in every envelope.
pub const PROTOCOL_VERSION: u16 = 1;
