// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload. Prompts carry a job definition and results
/// carry comments, so frames stay small; anything bigger is a broken peer.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out")]
    Timeout,
    #[error("frame of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message as JSON, without the length prefix.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed payload.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::TooLarge { size: len, max: MAX_FRAME_SIZE });
    }
    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

/// Write one payload with its length prefix.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::TooLarge { size: data.len(), max: MAX_FRAME_SIZE });
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame. `None` waits indefinitely.
pub async fn read_frame<T, R>(reader: &mut R, timeout: Option<Duration>) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let bytes = match timeout {
        Some(limit) => tokio::time::timeout(limit, read_message(reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??,
        None => read_message(reader).await?,
    };
    decode(&bytes)
}

/// Encode and write one frame.
pub async fn write_frame<T, W>(writer: &mut W, message: &T, timeout: Duration) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = encode(message)?;
    tokio::time::timeout(timeout, write_message(writer, &bytes))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
