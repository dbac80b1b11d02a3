//! Mini file distribution network
//!
//! A bootstrap directory that tracks live peers, LAN discovery, a
//! content-addressed chunk store and a line-delimited JSON transfer protocol.

pub mod core;
pub mod directory;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use core::{Config, DirectoryConfig, Node, PeerInfo, ServeMode};
pub use directory::{DirectoryClient, DirectoryServer};
pub use network::Discovery;
pub use storage::{ChunkStore, FileSource, SharedFolder};
pub use transfer::{Downloader, FileServer};
pub use utils::{
    NetUtils,
    error::{P2PError, Result},
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
