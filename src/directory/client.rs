use log::debug;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::core::PeerInfo;
use crate::core::config::CONNECT_TIMEOUT;
use crate::core::protocol::{Message, Status, StatusReply};
use crate::network::Transport;
use crate::utils::{P2PError, Result};

/// Talks to a directory service; every call is its own connection.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    addr: String,
    connect_timeout: Duration,
}

impl DirectoryClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn register(&self, peer: &PeerInfo) -> Result<()> {
        let reply: StatusReply = self
            .exchange(&Message::register(&peer.id, &peer.addr))
            .await?
            .ok_or_else(|| {
                P2PError::ProtocolError("directory closed without a register reply".to_string())
            })?;

        match reply.status {
            Status::Ok => {
                debug!("Registered {} with directory {}", peer, self.addr);
                Ok(())
            }
            Status::Error => Err(P2PError::Declined(reply.error.unwrap_or_default())),
        }
    }

    pub async fn heartbeat(&self, peer_id: &str) -> Result<()> {
        let mut stream = self.connect().await?;
        Transport::write_frame(&mut stream, &Message::heartbeat(peer_id)).await?;
        debug!("Heartbeat sent for {}", peer_id);
        Ok(())
    }

    /// Everyone the directory knows about except `peer_id`.
    pub async fn get_peers(&self, peer_id: &str) -> Result<Vec<PeerInfo>> {
        let peers: Option<Option<Vec<PeerInfo>>> =
            self.exchange(&Message::get_peers(peer_id)).await?;

        match peers {
            Some(list) => Ok(list.unwrap_or_default()),
            None => Err(P2PError::ProtocolError(
                "directory closed without a peer list".to_string(),
            )),
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        Transport::connect(&self.addr, self.connect_timeout).await
    }

    async fn exchange<T>(&self, request: &Message) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        Transport::write_frame(&mut write_half, request).await?;

        let mut reader = BufReader::new(read_half);
        Transport::read_frame(&mut reader).await
    }
}
