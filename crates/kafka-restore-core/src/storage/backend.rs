//! Storage backend trait definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Trait for archive stores.
///
/// `list` returns keys in the store's own listing order. Callers rely on that
/// order being stable for a given prefix but never on it matching creation order.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List keys under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read the full content of a key
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Write data to a key
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;
}
