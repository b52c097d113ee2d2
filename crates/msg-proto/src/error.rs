//! # Protocol Errors
//!
//! Transport-level failures. Routing failures (unknown recipient,
//! duplicate registration) travel as error replies, not as these values.

use thiserror::Error;

/// Errors raised by the wire layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Frame length prefix exceeds the allowed maximum.
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Envelope bytes did not decode.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope version is not supported.
    #[error("Unsupported protocol version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u16, supported: u16 },

    /// Underlying socket error.
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the connection is gone and should be dropped from the
    /// watch set rather than retried.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
