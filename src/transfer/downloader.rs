use log::{debug, info};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;

use crate::core::PeerInfo;
use crate::core::config::CONNECT_TIMEOUT;
use crate::core::protocol::{Message, MessageType};
use crate::network::Transport;
use crate::utils::{P2PError, Result};

/// Client side of the transfer protocol.
#[derive(Debug, Clone)]
pub struct Downloader {
    connect_timeout: Duration,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Fetch a whole file into memory.
    ///
    /// The peer's explicit `error` frame surfaces as [`P2PError::Declined`]
    /// with its text. A stream that ends without `end_of_file` counts as a
    /// complete transfer.
    pub async fn request_file(&self, peer: &PeerInfo, filename: &str) -> Result<Vec<u8>> {
        let mut transfer = self.open_transfer(peer, filename).await?;

        let mut received = Vec::new();
        while let Some(chunk) = transfer.next_chunk().await? {
            debug!("Received file chunk: {} bytes", chunk.len());
            received.extend_from_slice(&chunk);
        }

        info!(
            "Received {} from {} ({} bytes)",
            filename,
            peer,
            received.len()
        );
        Ok(received)
    }

    /// Start a transfer and hand back the chunks as they arrive.
    pub async fn open_transfer(&self, peer: &PeerInfo, filename: &str) -> Result<Transfer> {
        let stream = Transport::connect(&peer.addr, self.connect_timeout).await?;
        let (read_half, mut write_half) = stream.into_split();

        debug!("Sending file request: {} to {}", filename, peer.addr);
        Transport::write_frame(&mut write_half, &Message::request_file(filename)).await?;

        Ok(Transfer {
            reader: BufReader::new(read_half),
            finished: false,
        })
    }

    /// Fire-and-forget text message.
    pub async fn send_message(&self, peer: &PeerInfo, text: &str) -> Result<()> {
        let mut stream = Transport::connect(&peer.addr, self.connect_timeout).await?;
        Transport::write_frame(&mut stream, &Message::text(text)).await?;
        debug!("Sent message to {}", peer);
        Ok(())
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight download, yielding chunks in the order the server sent them.
pub struct Transfer {
    reader: BufReader<OwnedReadHalf>,
    finished: bool,
}

impl Transfer {
    /// `Ok(None)` once `end_of_file` arrives or the peer closes the stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        while !self.finished {
            let frame: Message = match Transport::read_frame(&mut self.reader).await? {
                Some(frame) => frame,
                None => {
                    debug!("Peer closed the stream without end_of_file");
                    self.finished = true;
                    break;
                }
            };

            match frame.msg_type {
                MessageType::SendFileChunk => return Ok(Some(frame.content.unwrap_or_default())),
                MessageType::EndOfFile => {
                    debug!("File transfer complete");
                    self.finished = true;
                }
                MessageType::Error => {
                    self.finished = true;
                    return Err(P2PError::Declined(frame.content_text()));
                }
                other => debug!("Skipping {:?} frame during transfer", other),
            }
        }
        Ok(None)
    }
}
