pub mod config;
pub mod node;
pub mod peer;
pub mod protocol;

pub use config::{Config, DirectoryConfig, ServeMode};
pub use node::Node;
pub use peer::{PeerInfo, PeerManager};
pub use protocol::{Message, MessageType};
