//! # Frame Codec
//!
//! Length-prefixed framing over a byte stream. The stream carries no
//! message boundaries of its own, so every envelope is written as a
//! u32 big-endian length followed by its bincode encoding.

use crate::envelope::Envelope;
use crate::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is treated as a
/// malformed stream rather than buffered.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read one complete envelope from the stream.
///
/// # Errors
///
/// Returns [`ProtocolError::ConnectionClosed`] on a clean EOF at a frame
/// boundary, [`ProtocolError::FrameTooLarge`] when the prefix exceeds
/// [`MAX_FRAME_LEN`], and [`ProtocolError::MalformedEnvelope`] when the
/// payload does not decode.
pub async fn read_envelope<R>(stream: &mut R) -> Result<Envelope, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut len_buf).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(ProtocolError::ConnectionClosed);
        }
        return Err(ProtocolError::Io(e));
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    let envelope: Envelope = bincode::deserialize(&payload)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    if envelope.version != crate::PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            received: envelope.version,
            supported: crate::PROTOCOL_VERSION,
        });
    }

    Ok(envelope)
}

/// Write one envelope to the stream as a single length-prefixed frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Io`] on socket failure; a broken pipe here is
/// reported, never fatal to the caller's loop.
pub async fn write_envelope<W>(stream: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(envelope)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: payload.len(),
        max: MAX_FRAME_LEN,
    })?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}
