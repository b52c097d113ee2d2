//! # Socket Wrappers
//!
//! Thin wrappers around TCP sockets that speak whole envelopes instead of
//! bytes. The server side is owned by the broker; the client side holds a
//! single connection to the broker and performs the registration
//! handshake on connect.

use crate::codec::{read_envelope, write_envelope};
use crate::envelope::{Envelope, MessageKind, RegisterRequest, REGISTER_CMD};
use crate::error::ProtocolError;
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// A duplex connection carrying framed envelopes.
#[derive(Debug)]
pub struct MsgSocket {
    stream: TcpStream,
    peer: SocketAddr,
}

impl MsgSocket {
    /// Wrap an accepted or connected stream.
    #[must_use]
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    /// Address of the remote endpoint.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ProtocolError> {
        write_envelope(&mut self.stream, envelope).await
    }

    /// Receive one complete envelope, blocking until a frame arrives.
    pub async fn recv(&mut self) -> Result<Envelope, ProtocolError> {
        read_envelope(&mut self.stream).await
    }

    /// Split into independently-owned read and write halves so a reader
    /// task and the owning loop can work the same connection.
    #[must_use]
    pub fn into_split(self) -> (EnvelopeReader, EnvelopeWriter) {
        let (read, write) = self.stream.into_split();
        (
            EnvelopeReader { inner: read },
            EnvelopeWriter { inner: write },
        )
    }
}

/// Read half of a split [`MsgSocket`].
pub struct EnvelopeReader {
    inner: OwnedReadHalf,
}

impl EnvelopeReader {
    /// Receive one complete envelope.
    pub async fn recv(&mut self) -> Result<Envelope, ProtocolError> {
        read_envelope(&mut self.inner).await
    }
}

/// Write half of a split [`MsgSocket`].
pub struct EnvelopeWriter {
    inner: OwnedWriteHalf,
}

impl EnvelopeWriter {
    /// Send one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ProtocolError> {
        write_envelope(&mut self.inner, envelope).await
    }
}

/// Listening socket owned by the broker.
pub struct MsgSocketServer {
    listener: TcpListener,
}

impl MsgSocketServer {
    /// Bind and listen on `host:port`.
    pub async fn open(host: &str, port: u16) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind((host, port)).await?;
        debug!(addr = %listener.local_addr()?, "Message service listening");
        Ok(Self { listener })
    }

    /// Local address, useful when bound to port 0 in tests.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next inbound connection.
    pub async fn accept(&self) -> Result<MsgSocket, ProtocolError> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%peer, "Accepted connection");
        Ok(MsgSocket::new(stream, peer))
    }
}

/// Client-side connection to the broker.
pub struct MsgSocketClient;

impl MsgSocketClient {
    /// Connect to the broker without registering. The caller must send the
    /// registration envelope itself before anything is routed.
    pub async fn connect(host: &str, port: u16) -> Result<MsgSocket, ProtocolError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(MsgSocket::new(stream, peer))
    }

    /// Connect and perform the registration handshake.
    ///
    /// Sends the [`REGISTER_CMD`] envelope and waits for the broker's
    /// reply. A refusal (for example a duplicate unique name) comes back
    /// as [`RegistrationError::Refused`] carrying the packed error text
    /// so the caller can show it to the user.
    pub async fn connect_and_register(
        host: &str,
        port: u16,
        request: &RegisterRequest,
    ) -> Result<MsgSocket, RegistrationError> {
        let mut socket = Self::connect(host, port).await?;

        let body = bincode::serialize(request)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
        let envelope = Envelope::command(request.name.clone(), "", REGISTER_CMD, body);
        socket.send(&envelope).await?;

        let reply = socket.recv().await?;
        match reply.kind {
            MessageKind::SuccessReply => {
                debug!(name = %request.name, "Registered to message service");
                Ok(socket)
            }
            MessageKind::ErrorReply => Err(RegistrationError::Refused {
                name: request.name.clone(),
                detail: reply.body_text(),
            }),
            MessageKind::Command => Err(RegistrationError::Protocol(
                ProtocolError::MalformedEnvelope(
                    "expected a reply to REGISTER, got a command".to_string(),
                ),
            )),
        }
    }
}

/// Outcome of a failed registration handshake.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The broker refused the registration; `detail` carries the packed
    /// error stack text from the reply body.
    #[error("Registration of '{name}' refused: {detail}")]
    Refused { name: String, detail: String },

    /// The handshake failed at the transport level.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
