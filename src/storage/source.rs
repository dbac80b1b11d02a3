use async_trait::async_trait;
use std::path::{Component, Path};

use crate::utils::{P2PError, Result};

/// Resolves a requested filename to the full file contents.
///
/// The transfer server is written against this seam so it can serve either
/// reassembled chunk-store files or plain files from the shared folder.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn load(&self, filename: &str) -> Result<Vec<u8>>;
}

/// Accept only a single, normal path component.
pub fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == filename => Ok(()),
        _ => Err(P2PError::InvalidFilename(filename.to_string())),
    }
}
