//! Filesystem storage backend implementation.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageBackend;
use crate::error::StorageError;
use crate::Result;

/// Filesystem-based storage backend.
///
/// Keys map to paths below `base_path`; listings are sorted lexicographically.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base path
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Convert a storage key to a filesystem path
    fn key_to_path(&self, key: &str) -> PathBuf {
        // Normalize key to prevent path traversal
        let normalized = key.trim_start_matches('/');
        self.base_path.join(normalized)
    }

    /// Convert a filesystem path to a storage key
    fn path_to_key(&self, path: &std::path::Path) -> Option<String> {
        path.strip_prefix(&self.base_path).ok().map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            return Err(StorageError::BucketNotFound(self.base_path.display().to_string()).into());
        }

        let base = self.key_to_path(prefix);
        let mut results = Vec::new();

        // A day with no archive directory simply has no objects
        if !fs::try_exists(&base).await.unwrap_or(false) {
            return Ok(results);
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let metadata = fs::metadata(&dir).await.map_err(|e| {
                StorageError::Backend(format!("Failed to stat {}: {}", dir.display(), e))
            })?;
            if metadata.is_file() {
                if let Some(key) = self.path_to_key(&dir) {
                    results.push(key);
                }
                continue;
            }

            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                StorageError::Backend(format!("Failed to read directory {}: {}", dir.display(), e))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::Backend(format!("Failed to read directory entry: {}", e))
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| {
                    StorageError::Backend(format!("Failed to stat {}: {}", path.display(), e))
                })?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if let Some(key) = self.path_to_key(&path) {
                    results.push(key);
                }
            }
        }

        results.sort();
        Ok(results)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key);

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(key.to_string()),
            _ => StorageError::Backend(format!("Failed to read file {}: {}", path.display(), e)),
        })?;

        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.key_to_path(key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Backend(format!("Failed to create directories: {}", e))
            })?;
        }

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::Backend(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::Backend(format!("Failed to write to file {}: {}", path.display(), e))
        })?;

        file.flush().await.map_err(|e| {
            StorageError::Backend(format!("Failed to flush file {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}
