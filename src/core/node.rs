use log::{debug, info, warn};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval, sleep};

use crate::core::{Config, PeerInfo, PeerManager, ServeMode};
use crate::directory::DirectoryClient;
use crate::network::{Discovery, DiscoveryHandle, Transport};
use crate::storage::{ChunkStore, FileSource, SharedFolder, validate_filename};
use crate::transfer::{Downloader, FileServer};
use crate::utils::{NetUtils, P2PError, Result};

/// A running peer: registered with the directory, serving files, and keeping
/// a roster of who else is around.
pub struct Node {
    local: PeerInfo,
    pub config: Config,
    directory: DirectoryClient,
    peer_manager: Arc<RwLock<PeerManager>>,
    downloader: Downloader,
    source: Arc<dyn FileSource>,
    listener: Option<TcpListener>,
    stop_tx: watch::Sender<bool>,
    server_shutdown: Option<mpsc::Sender<()>>,
    discovery: Option<DiscoveryHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ip = match config.listen_ip {
            Some(ip) => ip,
            None => NetUtils::local_ip().await,
        };
        let listener = Transport::listen(&SocketAddr::new(ip, config.port).to_string()).await?;
        let local = PeerInfo::from_socket(config.peer_id.clone(), listener.local_addr()?);

        let source: Arc<dyn FileSource> = match config.serve_mode {
            ServeMode::Chunks => Arc::new(
                ChunkStore::open(&config.storage_dir)
                    .await?
                    .verify_chunks(config.verify_chunks),
            ),
            ServeMode::Shared => Arc::new(SharedFolder::new(config.shared_dir.clone()).await?),
        };

        let directory = DirectoryClient::new(config.bootstrap_addr.clone())
            .with_connect_timeout(config.connect_timeout);
        let downloader = Downloader::new().with_connect_timeout(config.connect_timeout);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            local,
            config,
            directory,
            peer_manager: Arc::new(RwLock::new(PeerManager::new())),
            downloader,
            source,
            listener: Some(listener),
            stop_tx,
            server_shutdown: None,
            discovery: None,
            tasks: Vec::new(),
        })
    }

    pub fn local_peer(&self) -> &PeerInfo {
        &self.local
    }

    /// Registers with the directory (failure here is fatal) and spawns the
    /// heartbeat, roster refresh, file server and optional discovery tasks.
    pub async fn start(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| P2PError::ConfigError("node already started".to_string()))?;

        info!(
            "Starting peer {} on {} (directory {}, serving {:?})",
            self.local.id,
            self.local.addr,
            self.directory.addr(),
            self.config.serve_mode
        );

        self.directory.register(&self.local).await?;
        info!("Peer {} registered with directory {}", self.local.id, self.directory.addr());

        self.start_heartbeat();
        self.start_peer_refresh();

        let (server_tx, server_rx) = mpsc::channel(1);
        let server = FileServer::new(listener, self.source.clone());
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(server_rx).await {
                warn!("File server stopped with error: {}", e);
            }
        }));
        self.server_shutdown = Some(server_tx);

        if let Some(port) = self.config.discovery_port {
            self.start_discovery(port).await?;
        }

        Ok(())
    }

    fn start_heartbeat(&mut self) {
        let directory = self.directory.clone();
        let peer_id = self.local.id.clone();
        let period = self.config.heartbeat_interval;
        let mut stop_rx = self.stop_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = directory.heartbeat(&peer_id).await {
                            warn!("Heartbeat error: {}", e);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        }));
    }

    fn start_peer_refresh(&mut self) {
        let directory = self.directory.clone();
        let peer_manager = self.peer_manager.clone();
        let peer_id = self.local.id.clone();
        let period = self.config.peer_refresh_interval;
        let mut stop_rx = self.stop_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Self::refresh_roster(&directory, &peer_manager, &peer_id).await {
                            warn!("Failed to get peers from directory: {}", e);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        }));
    }

    async fn start_discovery(&mut self, port: u16) -> Result<()> {
        let (handle, mut found) = Discovery::new(self.local.addr.clone(), port).start().await?;
        let peer_manager = self.peer_manager.clone();
        let mut stop_rx = self.stop_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    peer = found.recv() => match peer {
                        Some(peer) => peer_manager.write().await.add_discovered_peer(peer.into()),
                        None => break,
                    },
                    _ = stop_rx.changed() => break,
                }
            }
        }));
        self.discovery = Some(handle);
        Ok(())
    }

    async fn refresh_roster(
        directory: &DirectoryClient,
        peer_manager: &Arc<RwLock<PeerManager>>,
        peer_id: &str,
    ) -> Result<usize> {
        let peers = directory.get_peers(peer_id).await?;
        let count = peers.len();
        peer_manager.write().await.replace_directory_roster(peers);
        debug!("Directory lists {} other peers", count);
        Ok(count)
    }

    /// One roster refresh outside the periodic loop.
    pub async fn refresh_peers(&self) -> Result<usize> {
        Self::refresh_roster(&self.directory, &self.peer_manager, &self.local.id).await
    }

    pub async fn known_peers(&self) -> Vec<PeerInfo> {
        self.peer_manager.read().await.get_all_peers()
    }

    pub async fn resolve_peer(&self, peer_id: &str) -> Result<PeerInfo> {
        self.peer_manager
            .read()
            .await
            .resolve(peer_id)
            .cloned()
            .ok_or_else(|| P2PError::PeerNotFound(peer_id.to_string()))
    }

    /// Poll the roster until `peer_id` shows up.
    pub async fn wait_for_peer(&self, peer_id: &str, limit: Duration) -> Result<PeerInfo> {
        let deadline = Instant::now() + limit;
        loop {
            match self.resolve_peer(peer_id).await {
                Ok(peer) => return Ok(peer),
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(_) => sleep(Duration::from_millis(200)).await,
            }
        }
    }

    pub async fn fetch(&self, peer_id: &str, filename: &str) -> Result<Vec<u8>> {
        let peer = self.resolve_peer(peer_id).await?;
        info!("Requesting file '{}' from peer {}", filename, peer);
        self.downloader.request_file(&peer, filename).await
    }

    /// Fetch and save as `received_<filename>` under `dir`.
    pub async fn fetch_to(&self, peer_id: &str, filename: &str, dir: &Path) -> Result<PathBuf> {
        validate_filename(filename)?;
        let data = self.fetch(peer_id, filename).await?;

        let path = dir.join(format!("received_{}", filename));
        async_fs::write(&path, &data)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to save received file: {}", e)))?;
        info!("File '{}' saved as {:?} ({} bytes)", filename, path, data.len());
        Ok(path)
    }

    pub async fn send_message(&self, peer_id: &str, text: &str) -> Result<()> {
        let peer = self.resolve_peer(peer_id).await?;
        self.downloader.send_message(&peer, text).await
    }

    /// Blocks until Ctrl+C, then stops the node.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Ctrl+C received, shutting down peer");
        self.stop().await;
        Ok(())
    }

    /// Stops scheduling background work. Iterations and transfers already
    /// running finish on their own.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(server_tx) = self.server_shutdown.take() {
            let _ = server_tx.send(()).await;
        }
        if let Some(discovery) = self.discovery.take() {
            discovery.stop();
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Peer {} stopped", self.local.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DirectoryConfig;
    use crate::directory::DirectoryServer;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    async fn start_directory() -> (String, mpsc::Sender<()>) {
        let server = DirectoryServer::bind(DirectoryConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..DirectoryConfig::default()
        })
        .await
        .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(server.run(rx));
        (addr, tx)
    }

    fn peer_config(id: &str, bootstrap: &str, dir: &TempDir) -> Config {
        Config {
            peer_id: id.to_string(),
            bootstrap_addr: bootstrap.to_string(),
            listen_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            storage_dir: dir.path().to_path_buf(),
            shared_dir: dir.path().join("shared"),
            peer_refresh_interval: Duration::from_millis(100),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_start_fails_without_directory() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let mut config = peer_config("A", &dead, &dir);
        config.connect_timeout = Duration::from_secs(1);
        let mut node = Node::new(config).await.unwrap();
        assert!(matches!(
            node.start().await,
            Err(P2PError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_roster_excludes_self_and_fetch_unknown_peer() {
        let (bootstrap, _dir_tx) = start_directory().await;
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let mut a = Node::new(peer_config("A", &bootstrap, &dir_a)).await.unwrap();
        let mut b = Node::new(peer_config("B", &bootstrap, &dir_b)).await.unwrap();
        a.start().await.unwrap();
        b.start().await.unwrap();

        let seen = a.wait_for_peer("B", Duration::from_secs(5)).await.unwrap();
        assert_eq!(&seen, b.local_peer());
        assert!(a.known_peers().await.iter().all(|p| p.id != "A"));

        assert!(matches!(
            a.fetch("Z", "doc.bin").await,
            Err(P2PError::PeerNotFound(_))
        ));

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn test_fetch_to_saves_received_copy() {
        let (bootstrap, _dir_tx) = start_directory().await;
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let mut config_b = peer_config("B", &bootstrap, &dir_b);
        config_b.serve_mode = ServeMode::Shared;
        SharedFolder::new(config_b.shared_dir.clone())
            .await
            .unwrap()
            .add_file("notes.txt", b"raw bytes")
            .await
            .unwrap();

        let mut a = Node::new(peer_config("A", &bootstrap, &dir_a)).await.unwrap();
        let mut b = Node::new(config_b).await.unwrap();
        a.start().await.unwrap();
        b.start().await.unwrap();
        a.refresh_peers().await.unwrap();

        let saved = a.fetch_to("B", "notes.txt", dir_a.path()).await.unwrap();
        assert_eq!(saved, dir_a.path().join("received_notes.txt"));
        assert_eq!(async_fs::read(&saved).await.unwrap(), b"raw bytes");

        a.stop().await;
        b.stop().await;
    }
}
