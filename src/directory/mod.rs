//! Bootstrap directory: who is online and where to reach them.

pub mod client;
pub mod registry;
pub mod server;

pub use client::DirectoryClient;
pub use registry::{PeerRecord, Registry};
pub use server::DirectoryServer;
