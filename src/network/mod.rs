pub mod discovery;
pub mod transport;

pub use discovery::{DiscoveredPeer, Discovery, DiscoveryHandle};
pub use transport::Transport;
