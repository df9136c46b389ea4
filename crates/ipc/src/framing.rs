//! Length-prefixed framing: `u32` little-endian payload length, then payload.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
const PREFIX_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("truncated frame: need {expected} bytes, have {available}")]
    Truncated { expected: usize, available: usize },
    #[error("frame io: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame codec: {0}")]
    Codec(#[from] bincode::Error),
}

fn check_len(len: usize, max: usize) -> Result<(), FrameError> {
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }
    Ok(())
}

pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    check_len(payload.len(), u32::MAX as usize)?;
    let mut out = Vec::with_capacity(PREFIX_BYTES + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split one frame off the front of `buf`, returning `(payload, remainder)`.
pub fn decode_frame(buf: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    if buf.len() < PREFIX_BYTES {
        return Err(FrameError::Truncated {
            expected: PREFIX_BYTES,
            available: buf.len(),
        });
    }
    let (prefix, rest) = buf.split_at(PREFIX_BYTES);
    let mut len_bytes = [0u8; PREFIX_BYTES];
    len_bytes.copy_from_slice(prefix);
    let len = u32::from_le_bytes(len_bytes) as usize;
    check_len(len, u32::MAX as usize)?;
    if rest.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            available: rest.len(),
        });
    }
    Ok(rest.split_at(len))
}

pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, FrameError> {
    Ok(bincode::serialize(msg)?)
}

pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(bincode::deserialize(payload)?)
}

/// Read one frame; `Ok(None)` when the peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_BYTES];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(prefix) as usize;
    check_len(len, max)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    check_len(payload.len(), max)?;
    writer.write_all(&encode_frame(payload)?).await?;
    writer.flush().await?;
    Ok(())
}
