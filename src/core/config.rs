use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{P2PError, Result};

pub const DEFAULT_DIRECTORY_PORT: u16 = 9999;
pub const CHUNK_SIZE: usize = 4096;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const PEER_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const EVICTION_TTL: Duration = Duration::from_secs(10 * 60);

/// Where the transfer server reads the files it serves from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Reassemble from the content-addressed chunk store.
    #[default]
    Chunks,
    /// Read plain files from the shared folder.
    Shared,
}

/// Peer process settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub peer_id: String,
    /// Directory service address (`host:port`).
    pub bootstrap_addr: String,
    /// Address to advertise; detected when `None`.
    pub listen_ip: Option<IpAddr>,
    /// Transfer listener port; 0 lets the OS choose.
    pub port: u16,
    /// Root under which `chunks/` lives.
    pub storage_dir: PathBuf,
    pub shared_dir: PathBuf,
    pub serve_mode: ServeMode,
    /// Re-hash chunks on read.
    pub verify_chunks: bool,
    /// LAN discovery port; `None` disables discovery.
    pub discovery_port: Option<u16>,
    pub heartbeat_interval: Duration,
    pub peer_refresh_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_id: String::new(),
            bootstrap_addr: format!("127.0.0.1:{}", DEFAULT_DIRECTORY_PORT),
            listen_ip: None,
            port: 0,
            storage_dir: PathBuf::from("."),
            shared_dir: PathBuf::from("shared_folder"),
            serve_mode: ServeMode::default(),
            verify_chunks: false,
            discovery_port: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            peer_refresh_interval: PEER_REFRESH_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.peer_id.trim().is_empty() {
            return Err(P2PError::ConfigError("peer id must not be empty".to_string()));
        }
        if self.bootstrap_addr.trim().is_empty() {
            return Err(P2PError::ConfigError(
                "bootstrap address must not be empty".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() || self.peer_refresh_interval.is_zero() {
            return Err(P2PError::ConfigError(
                "background intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Listen address, e.g. `0.0.0.0:9999`.
    pub listen_addr: String,
    pub sweep_interval: Duration,
    pub eviction_ttl: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_DIRECTORY_PORT),
            sweep_interval: SWEEP_INTERVAL,
            eviction_ttl: EVICTION_TTL,
        }
    }
}
