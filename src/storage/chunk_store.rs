//! Content-addressed, deduplicating file storage.
//!
//! Layout under the store root:
//!
//! ```text
//! chunks/<sha256-hex>      raw chunk bytes, written once
//! chunks/<filename>.meta   JSON FileMetadata, rewritten on every store
//! ```
//!
//! Chunks are never deleted and carry no reference count. Two concurrent
//! `store` calls for the same filename race on the metadata file and the last
//! write wins; callers are expected to own a filename from a single task.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs as async_fs;

use crate::storage::chunk::{Chunk, split_chunks};
use crate::storage::source::{FileSource, validate_filename};
use crate::utils::{P2PError, Result};

const META_SUFFIX: &str = ".meta";

/// Per-file reconstruction recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub chunk_hashes: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunks_dir: PathBuf,
    verify_on_read: bool,
}

impl ChunkStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let chunks_dir = root.as_ref().join("chunks");
        async_fs::create_dir_all(&chunks_dir).await.map_err(|e| {
            P2PError::IoError(format!("Failed to create chunks directory: {}", e))
        })?;

        info!("Chunk store opened at: {:?}", chunks_dir);
        Ok(Self {
            chunks_dir,
            verify_on_read: false,
        })
    }

    /// Re-hash every chunk during `retrieve`. Off by default.
    pub fn verify_chunks(mut self, enabled: bool) -> Self {
        self.verify_on_read = enabled;
        self
    }

    pub async fn store(&self, filename: &str, data: &[u8]) -> Result<FileMetadata> {
        validate_filename(filename)?;

        let chunks = split_chunks(data);
        let mut written = 0usize;
        for chunk in &chunks {
            if self.write_chunk_once(&chunk.hash, &chunk.data).await? {
                written += 1;
            }
        }

        let metadata = FileMetadata {
            filename: filename.to_string(),
            chunk_hashes: chunks.into_iter().map(|c| c.hash).collect(),
        };
        let encoded = serde_json::to_vec(&metadata)?;
        async_fs::write(self.meta_path(filename), encoded)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write metadata file: {}", e)))?;

        info!(
            "Stored {} ({} bytes, {} chunks, {} new)",
            filename,
            data.len(),
            metadata.chunk_hashes.len(),
            written
        );
        Ok(metadata)
    }

    /// Writes the chunk unless a file with that hash already exists.
    /// Returns whether anything was written.
    async fn write_chunk_once(&self, hash: &str, data: &[u8]) -> Result<bool> {
        let path = self.chunk_path(hash);
        if async_fs::try_exists(&path).await? {
            debug!("Chunk {} already present", &hash[..8]);
            return Ok(false);
        }

        let dir = self.chunks_dir.clone();
        let bytes = data.to_vec();
        let written = tokio::task::spawn_blocking(move || publish_chunk(&dir, &path, &bytes))
            .await
            .map_err(|e| P2PError::IoError(format!("Chunk writer task failed: {}", e)))?
            .map_err(|e| P2PError::IoError(format!("Failed to write chunk {}: {}", hash, e)))?;

        if written {
            debug!("Wrote chunk {} ({} bytes)", &hash[..8], data.len());
        } else {
            debug!("Chunk {} already present", &hash[..8]);
        }
        Ok(written)
    }

    pub async fn metadata(&self, filename: &str) -> Result<FileMetadata> {
        validate_filename(filename)?;

        let raw = async_fs::read(self.meta_path(filename))
            .await
            .map_err(|_| P2PError::FileNotFound(filename.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| {
            debug!("Unparsable metadata for {}: {}", filename, e);
            P2PError::FileNotFound(filename.to_string())
        })
    }

    pub async fn retrieve(&self, filename: &str) -> Result<Vec<u8>> {
        let metadata = self.metadata(filename).await?;

        let mut content = Vec::new();
        for (index, hash) in metadata.chunk_hashes.iter().enumerate() {
            let chunk = self.load_chunk(index, hash).await?;
            content.extend_from_slice(&chunk.data);
        }

        debug!(
            "Reconstructed {} from {} chunks ({} bytes)",
            filename,
            metadata.chunk_hashes.len(),
            content.len()
        );
        Ok(content)
    }

    async fn load_chunk(&self, index: usize, hash: &str) -> Result<Chunk> {
        let data = match async_fs::read(self.chunk_path(hash)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(P2PError::ChunkNotFound(hash.to_string()));
            }
            Err(e) => {
                return Err(P2PError::IoError(format!(
                    "Failed to read chunk {}: {}",
                    hash, e
                )));
            }
        };

        let chunk = Chunk {
            index,
            hash: hash.to_string(),
            data,
        };
        if self.verify_on_read && !chunk.verify() {
            return Err(P2PError::ChunkVerificationFailed(chunk.hash));
        }
        Ok(chunk)
    }

    pub async fn has_chunk(&self, hash: &str) -> bool {
        async_fs::try_exists(self.chunk_path(hash))
            .await
            .unwrap_or(false)
    }

    /// Names of every stored file, sorted.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = async_fs::read_dir(&self.chunks_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(META_SUFFIX) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn chunk_path(&self, hash: &str) -> PathBuf {
        self.chunks_dir.join(hash)
    }

    fn meta_path(&self, filename: &str) -> PathBuf {
        self.chunks_dir.join(format!("{}{}", filename, META_SUFFIX))
    }
}

#[async_trait]
impl FileSource for ChunkStore {
    async fn load(&self, filename: &str) -> Result<Vec<u8>> {
        self.retrieve(filename).await
    }
}

/// Fills a temp file next to `path` and moves it into place only when nothing
/// is there yet. A failed write never leaves a file at `path`.
fn publish_chunk(dir: &Path, path: &Path, data: &[u8]) -> io::Result<bool> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CHUNK_SIZE;
    use crate::storage::chunk::content_hash;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn chunk_files(dir: &TempDir) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut entries = async_fs::read_dir(dir.path().join("chunks")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(META_SUFFIX) {
                names.insert(name);
            }
        }
        names
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();

        for (name, len) in [("a", 1), ("b", CHUNK_SIZE), ("c", CHUNK_SIZE * 2 + 17)] {
            let data = sample(len);
            store.store(name, &data).await.unwrap();
            assert_eq!(store.retrieve(name).await.unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();

        let meta = store.store("empty", &[]).await.unwrap();
        assert!(meta.chunk_hashes.is_empty());
        assert!(store.retrieve("empty").await.unwrap().is_empty());
        assert!(chunk_files(&dir).await.is_empty());
    }

    #[tokio::test]
    async fn test_null_hash_list_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        async_fs::write(
            dir.path().join("chunks").join("legacy.meta"),
            br#"{"filename":"legacy","chunk_hashes":null}"#,
        )
        .await
        .unwrap();

        assert!(store.retrieve("legacy").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_write_is_repaired_by_next_store() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        let data = sample(CHUNK_SIZE + 100);
        let hashes: Vec<String> = split_chunks(&data).into_iter().map(|c| c.hash).collect();

        async_fs::remove_dir_all(dir.path().join("chunks")).await.unwrap();
        assert!(matches!(
            store.store("doc.bin", &data).await,
            Err(P2PError::IoError(_))
        ));

        async_fs::create_dir_all(dir.path().join("chunks")).await.unwrap();
        for hash in &hashes {
            assert!(!store.has_chunk(hash).await);
        }

        store.store("doc.bin", &data).await.unwrap();
        assert_eq!(store.retrieve("doc.bin").await.unwrap(), data);
        assert_eq!(chunk_files(&dir).await.len(), 2);
    }

    #[test]
    fn test_publish_chunk_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(content_hash(b"payload"));

        assert!(publish_chunk(dir.path(), &path, b"payload").unwrap());
        assert!(!publish_chunk(dir.path(), &path, b"other bytes").unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_dedup_across_filenames() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        let data = sample(10_000);

        let first = store.store("one.bin", &data).await.unwrap();
        let after_first = chunk_files(&dir).await;
        let second = store.store("two.bin", &data).await.unwrap();

        assert_eq!(first.chunk_hashes, second.chunk_hashes);
        assert_eq!(chunk_files(&dir).await, after_first);
        assert_eq!(after_first.len(), 3);
        assert_eq!(store.list_files().await.unwrap(), vec!["one.bin", "two.bin"]);
    }

    #[tokio::test]
    async fn test_restore_keeps_existing_chunk_and_overwrites_meta() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();

        store.store("f", b"first version").await.unwrap();
        let meta = store.store("f", b"second").await.unwrap();

        assert_eq!(store.metadata("f").await.unwrap(), meta);
        assert_eq!(store.retrieve("f").await.unwrap(), b"second");
        assert!(store.has_chunk(&content_hash(b"first version")).await);
    }

    #[tokio::test]
    async fn test_chunk_sizes_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        let meta = store.store("doc.bin", &sample(10_000)).await.unwrap();

        let mut sizes = Vec::new();
        for hash in &meta.chunk_hashes {
            let len = async_fs::metadata(dir.path().join("chunks").join(hash))
                .await
                .unwrap()
                .len();
            sizes.push(len);
        }
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_missing_metadata_and_chunk() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.retrieve("ghost").await,
            Err(P2PError::FileNotFound(_))
        ));

        let meta = store.store("doc", &sample(CHUNK_SIZE + 1)).await.unwrap();
        async_fs::remove_file(dir.path().join("chunks").join(&meta.chunk_hashes[1]))
            .await
            .unwrap();
        assert!(matches!(
            store.retrieve("doc").await,
            Err(P2PError::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unparsable_metadata_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        async_fs::write(dir.path().join("chunks").join("bad.meta"), b"not json")
            .await
            .unwrap();

        assert!(matches!(
            store.retrieve("bad").await,
            Err(P2PError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corruption_only_caught_with_verification() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        let meta = store.store("doc", b"precious bytes").await.unwrap();
        async_fs::write(
            dir.path().join("chunks").join(&meta.chunk_hashes[0]),
            b"tampered",
        )
        .await
        .unwrap();

        assert_eq!(store.retrieve("doc").await.unwrap(), b"tampered");

        let strict = store.clone().verify_chunks(true);
        assert!(matches!(
            strict.retrieve("doc").await,
            Err(P2PError::ChunkVerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_filenames() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.store("../escape", b"x").await,
            Err(P2PError::InvalidFilename(_))
        ));
    }
}
