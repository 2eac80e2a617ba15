use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use super::DatePartition;
use crate::storage::StorageBackend;
use crate::Result;

/// One archived object found by listing a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveObjectRef {
    pub partition: DatePartition,
    pub key: String,
    /// Position in the store's listing, only meaningful within the day
    pub position: usize,
}

/// Full content of one downloaded archive object.
#[derive(Debug, Clone)]
pub struct ObjectBuffer {
    pub partition: DatePartition,
    pub key: String,
    pub data: Bytes,
}

impl ObjectBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lists and downloads the archived objects of one day.
#[derive(Clone)]
pub struct ArchiveRetriever {
    storage: Arc<dyn StorageBackend>,
}

impl ArchiveRetriever {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// List the objects of `partition` in store listing order.
    ///
    /// Keys outside the day's prefix are dropped; some stores match prefixes
    /// on raw strings rather than path segments.
    pub async fn list(&self, partition: &DatePartition) -> Result<Vec<ArchiveObjectRef>> {
        let prefix = partition.prefix();
        let keys = self.storage.list(&prefix).await?;
        let listed = keys.len();

        let refs: Vec<ArchiveObjectRef> = keys
            .into_iter()
            .filter(|key| partition.contains_key(key))
            .enumerate()
            .map(|(position, key)| ArchiveObjectRef {
                partition: partition.clone(),
                key,
                position,
            })
            .collect();

        if refs.len() != listed {
            warn!(
                "Ignored {} keys outside {} while listing",
                listed - refs.len(),
                prefix
            );
        }
        debug!("Listed {} objects under {}", refs.len(), prefix);

        Ok(refs)
    }

    /// Download one object in full.
    pub async fn fetch(&self, object: &ArchiveObjectRef) -> Result<ObjectBuffer> {
        let data = self.storage.get(&object.key).await?;
        debug!("Downloaded {} ({} bytes)", object.key, data.len());

        Ok(ObjectBuffer {
            partition: object.partition.clone(),
            key: object.key.clone(),
            data,
        })
    }
}
