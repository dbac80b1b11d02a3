//! TCP plumbing shared by the directory and transfer channels.
//!
//! Frames are single JSON values terminated by `\n`. A last frame that ends
//! at EOF without the newline is still accepted.

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::utils::{P2PError, Result};

pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub struct Transport;

impl Transport {
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                P2PError::ConnectionFailed(format!(
                    "Timed out connecting to {} after {:?}",
                    addr, connect_timeout
                ))
            })?
            .map_err(|e| {
                P2PError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;

        debug!("Connected to {}", addr);
        Ok(stream)
    }

    pub async fn listen(addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| P2PError::NetworkError(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let mut encoded = serde_json::to_vec(frame)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Next frame, or `None` on a clean end of stream.
    pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
    where
        R: AsyncBufRead + Unpin,
        T: DeserializeOwned,
    {
        let mut line = Vec::new();
        let read = (&mut *reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }
        let body_len = line.len() - usize::from(line.ends_with(b"\n"));
        if body_len > MAX_FRAME_SIZE {
            return Err(P2PError::MessageTooLarge(body_len));
        }

        let frame = serde_json::from_slice(&line)?;
        Ok(Some(frame))
    }
}
