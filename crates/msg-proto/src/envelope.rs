//! # Message Envelope
//!
//! The unit exchanged between processes: sender, recipient, command name
//! and an opaque body. Envelopes are transient: one is built per message
//! and released once routed or replied to.
//!
//! ## Addressing
//!
//! - `recipient` names a registered process, or [`BROADCAST_RECIPIENT`]
//!   to reach every registered peer except the sender.
//! - Replies keep the original command name so the requester can match
//!   them against the command it sent.

use serde::{Deserialize, Serialize};

/// Reserved recipient name addressing every registered peer but the sender.
pub const BROADCAST_RECIPIENT: &str = "*";

/// Command name of the registration handshake, the first message a process
/// must send after connecting to the broker.
pub const REGISTER_CMD: &str = "REGISTER";

/// Discriminates requests from the two reply flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// A command to be dispatched to a handler.
    Command,
    /// Reply to a command that completed successfully.
    SuccessReply,
    /// Reply to a command that failed; the body carries a packed error stack.
    ErrorReply,
}

/// The message envelope routed by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version, checked before processing.
    pub version: u16,
    /// Registered name of the sending process.
    pub sender: String,
    /// Registered name of the target process, or [`BROADCAST_RECIPIENT`].
    pub recipient: String,
    /// Command name; replies keep the name of the command they answer.
    pub command: String,
    /// Request or reply marker.
    pub kind: MessageKind,
    /// Opaque payload bytes.
    pub body: Vec<u8>,
}

impl Envelope {
    /// Build a command envelope.
    #[must_use]
    pub fn command(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        command: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sender: sender.into(),
            recipient: recipient.into(),
            command: command.into(),
            kind: MessageKind::Command,
            body: body.into(),
        }
    }

    /// Build a success reply to `request`, swapping sender and recipient.
    #[must_use]
    pub fn success_reply(request: &Envelope, replier: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sender: replier.into(),
            recipient: request.sender.clone(),
            command: request.command.clone(),
            kind: MessageKind::SuccessReply,
            body: body.into(),
        }
    }

    /// Build an error reply to `request`; `body` is expected to be a packed
    /// error stack but is not interpreted here.
    #[must_use]
    pub fn error_reply(request: &Envelope, replier: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sender: replier.into(),
            recipient: request.sender.clone(),
            command: request.command.clone(),
            kind: MessageKind::ErrorReply,
            body: body.into(),
        }
    }

    /// Whether this envelope is a reply of either flavour.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, MessageKind::SuccessReply | MessageKind::ErrorReply)
    }

    /// Whether this envelope is addressed to every peer.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST_RECIPIENT
    }

    /// Body bytes as lossy UTF-8, for logging and parameter parsing.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Payload of the [`REGISTER_CMD`] handshake sent as the first envelope on
/// a fresh connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Name under which the process wants to be reachable.
    pub name: String,
    /// Operating-system process id, for diagnostics.
    pub pid: u32,
    /// When set, at most one live registration may hold `name`.
    pub unique: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_swaps_addressing() {
        let req = Envelope::command("camera", "broker", "SETUP", b"-exposure 2.5".to_vec());
        let reply = Envelope::success_reply(&req, "broker", b"OK".to_vec());

        assert_eq!(reply.recipient, "camera");
        assert_eq!(reply.command, "SETUP");
        assert_eq!(reply.kind, MessageKind::SuccessReply);
        assert!(reply.is_reply());
    }

    #[test]
    fn test_broadcast_marker() {
        let env = Envelope::command("a", BROADCAST_RECIPIENT, "PING", Vec::new());
        assert!(env.is_broadcast());
        assert!(!env.is_reply());
    }

    #[test]
    fn test_register_request_roundtrip() {
        let req = RegisterRequest {
            name: "ccdServer".to_string(),
            pid: 4321,
            unique: true,
        };
        let bytes = bincode::serialize(&req).unwrap();
        let back: RegisterRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, req);
    }
}
