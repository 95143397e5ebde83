//! File storage for uploaded attachments.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// File storage error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The name is empty or would escape the storage root.
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Flat namespace of stored files, addressed by file name.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Writes `bytes` under `name` and returns the stored location.
    async fn save(&self, name: &str, bytes: &[u8]) -> StorageResult<String>;

    /// Reads a stored file. `None` if it does not exist.
    async fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Deletes a stored file. Deleting a missing file is not an error.
    async fn delete(&self, name: &str) -> StorageResult<()>;
}

/// Stores files in one directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    /// Creates storage rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        if !is_safe_name(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

/// A single path component without separators or parent references.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with('.')
}

#[async_trait]
impl FileStorage for LocalDiskStorage {
    async fn save(&self, name: &str, bytes: &[u8]) -> StorageResult<String> {
        let path = self.resolve(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        // Write to a temp file first so readers never see a partial file.
        let tmp_path = self.root.join(format!(".{name}.tmp.{}", uuid::Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored file");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> LocalDiskStorage {
        let root = std::env::temp_dir().join(format!("taskboard-{}", uuid::Uuid::new_v4()));
        LocalDiskStorage::new(root)
    }

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("files-1700000000000-42.pdf"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("../etc/passwd"));
        assert!(!is_safe_name("a/b.txt"));
        assert!(!is_safe_name("a\\b.txt"));
        assert!(!is_safe_name(".hidden"));
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let storage = storage();

        let path = storage.save("files-1.txt", b"hello").await.unwrap();
        assert!(path.ends_with("files-1.txt"));
        assert_eq!(
            storage.read("files-1.txt").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );

        storage.delete("files-1.txt").await.unwrap();
        assert!(storage.read("files-1.txt").await.unwrap().is_none());
        storage.delete("files-1.txt").await.unwrap();

        let _ = tokio::fs::remove_dir_all(storage.root()).await;
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let storage = storage();
        assert!(matches!(
            storage.read("../secret").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            storage.save("..", b"x").await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
