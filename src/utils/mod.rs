pub mod error;
pub mod logger;
pub mod net_utils;

pub use error::{P2PError, Result};
pub use logger::setup_logging;
pub use net_utils::NetUtils;
