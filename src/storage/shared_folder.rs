use async_trait::async_trait;
use log::info;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;

use crate::storage::source::{FileSource, validate_filename};
use crate::utils::{P2PError, Result};

/// A plain directory of files offered to other peers as-is.
#[derive(Debug, Clone)]
pub struct SharedFolder {
    folder_path: PathBuf,
}

impl SharedFolder {
    pub async fn new(folder_path: impl Into<PathBuf>) -> Result<Self> {
        let folder_path = folder_path.into();
        if !async_fs::try_exists(&folder_path).await.unwrap_or(false) {
            async_fs::create_dir_all(&folder_path).await.map_err(|e| {
                P2PError::IoError(format!("Failed to create shared folder: {}", e))
            })?;
            info!("Created shared folder at: {:?}", folder_path);
        }

        Ok(Self { folder_path })
    }

    pub fn path(&self) -> &Path {
        &self.folder_path
    }

    /// Regular files only, sorted by name.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = async_fs::read_dir(&self.folder_path)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to list files: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn add_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        validate_filename(filename)?;
        async_fs::write(self.folder_path.join(filename), data)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write file {}: {}", filename, e)))?;
        info!("File added: {}", filename);
        Ok(())
    }

    pub async fn remove_file(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        match async_fs::remove_file(self.folder_path.join(filename)).await {
            Ok(()) => {
                info!("File removed: {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(P2PError::FileNotFound(filename.to_string()))
            }
            Err(e) => Err(P2PError::IoError(format!(
                "Failed to remove file {}: {}",
                filename, e
            ))),
        }
    }

    pub async fn read_file(&self, filename: &str) -> Result<Vec<u8>> {
        validate_filename(filename)?;
        match async_fs::read(self.folder_path.join(filename)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(P2PError::FileNotFound(filename.to_string()))
            }
            Err(e) => Err(P2PError::IoError(format!(
                "Failed to read file {}: {}",
                filename, e
            ))),
        }
    }
}

#[async_trait]
impl FileSource for SharedFolder {
    async fn load(&self, filename: &str) -> Result<Vec<u8>> {
        self.read_file(filename).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_missing_folder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("shared");
        let folder = SharedFolder::new(&path).await.unwrap();
        assert!(folder.path().is_dir());
        assert!(folder.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let dir = TempDir::new().unwrap();
        let folder = SharedFolder::new(dir.path()).await.unwrap();
        async_fs::create_dir(dir.path().join("subdir")).await.unwrap();

        folder.add_file("b.txt", b"bee").await.unwrap();
        folder.add_file("a.txt", b"ay").await.unwrap();
        assert_eq!(folder.list_files().await.unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(folder.load("b.txt").await.unwrap(), b"bee");

        folder.remove_file("a.txt").await.unwrap();
        assert_eq!(folder.list_files().await.unwrap(), vec!["b.txt"]);
        assert!(matches!(
            folder.remove_file("a.txt").await,
            Err(P2PError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_missing_and_escaping() {
        let dir = TempDir::new().unwrap();
        let folder = SharedFolder::new(dir.path()).await.unwrap();
        assert!(folder.read_file("nope").await.unwrap_err().is_not_found());
        assert!(folder.read_file("../secret").await.unwrap_err().is_not_found());
    }
}
