use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};

use crate::core::DirectoryConfig;
use crate::core::protocol::{Message, MessageType, StatusReply, UNKNOWN_REQUEST};
use crate::directory::Registry;
use crate::network::Transport;
use crate::utils::Result;

/// The bootstrap service: one request per connection, plus a periodic
/// eviction sweep over the registry.
pub struct DirectoryServer {
    listener: TcpListener,
    registry: Registry,
    config: DirectoryConfig,
}

impl DirectoryServer {
    /// Failing to bind is fatal for the service.
    pub async fn bind(config: DirectoryConfig) -> Result<Self> {
        let listener = Transport::listen(&config.listen_addr).await?;
        Ok(Self {
            listener,
            registry: Registry::new(config.eviction_ttl),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Serves until `shutdown` fires or every sender is dropped. Connections
    /// already accepted run to completion on their own.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            "Directory service running on {} (sweep {:?}, ttl {:?})",
            self.listener.local_addr()?,
            self.config.sweep_interval,
            self.config.eviction_ttl
        );

        let sweeper = tokio::spawn(Self::sweep_loop(
            self.registry.clone(),
            self.config.sweep_interval,
        ));

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Directory service shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Directory connection from {}", addr);
                        let registry = self.registry.clone();
                        tokio::spawn(async move {
                            Self::handle_connection(stream, addr, registry).await;
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
            }
        }

        sweeper.abort();
        Ok(())
    }

    async fn sweep_loop(registry: Registry, period: std::time::Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_expired(Instant::now()).await;
            if !evicted.is_empty() {
                info!("Eviction sweep removed {} peers", evicted.len());
            }
        }
    }

    async fn handle_connection(stream: TcpStream, addr: SocketAddr, registry: Registry) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request: Message = match Transport::read_frame(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("{} closed without a request", addr);
                return;
            }
            Err(e) => {
                warn!("Failed to decode request from {}: {}", addr, e);
                return;
            }
        };

        let id = request.id.unwrap_or_default();
        let sent = match request.msg_type {
            MessageType::Register => {
                let peer_addr = request.addr.unwrap_or_default();
                registry.register(&id, &peer_addr).await;
                Transport::write_frame(&mut write_half, &StatusReply::ok()).await
            }
            MessageType::Heartbeat => {
                registry.heartbeat(&id).await;
                Ok(())
            }
            MessageType::GetPeers => {
                let peers = registry.peers_except(&id).await;
                debug!("Sending {} peers to {}", peers.len(), id);
                Transport::write_frame(&mut write_half, &peers).await
            }
            other => {
                debug!("Unknown directory request {:?} from {}", other, addr);
                Transport::write_frame(&mut write_half, &StatusReply::error(UNKNOWN_REQUEST)).await
            }
        };

        if let Err(e) = sent {
            warn!("Failed to reply to {}: {}", addr, e);
        }
    }
}
