//! Test helper utilities.
//!
//! Builds configurations and seeds archive stores with the
//! `<topic>/year=YYYY/month=MM/day=DD/<file>` layout.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kafka_restore_core::error::StorageError;
use kafka_restore_core::storage::MemoryBackend;
use kafka_restore_core::{Config, DatePartition, Result, StorageBackend};

pub const TOPIC: &str = "orders";

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
}

/// Configuration for `TOPIC` over 2020-01-`start` to 2020-01-`end`.
pub fn memory_config(start: u32, end: u32) -> Config {
    let yaml = format!(
        r#"
storage:
  backend: memory
target:
  bootstrap_servers:
    - localhost:9092
restore:
  source_topic: {}
  date_range:
    start: {}
    end: {}
"#,
        TOPIC,
        date(start),
        date(end)
    );
    Config::from_yaml_str(&yaml).unwrap()
}

/// Archive key for `file` on 2020-01-`day`.
pub fn archive_key(day: u32, file: &str) -> String {
    format!("{}/{}", DatePartition::new(TOPIC, date(day)).prefix(), file)
}

/// Store `(day, file, content)` objects in a fresh memory backend.
pub async fn seeded_store(objects: &[(u32, &str, &str)]) -> Arc<MemoryBackend> {
    let store = Arc::new(MemoryBackend::new());
    for (day, file, content) in objects {
        store
            .put(&archive_key(*day, file), Bytes::from(content.to_string()))
            .await
            .unwrap();
    }
    store
}

pub fn payload_strings(payloads: &[Bytes]) -> Vec<String> {
    payloads
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect()
}

/// Store that fails listings under one prefix and delegates everything else.
pub struct FailingListStore {
    inner: Arc<MemoryBackend>,
    failing_prefix: String,
}

impl FailingListStore {
    pub fn new(inner: Arc<MemoryBackend>, failing_prefix: impl Into<String>) -> Self {
        Self {
            inner,
            failing_prefix: failing_prefix.into(),
        }
    }
}

#[async_trait]
impl StorageBackend for FailingListStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if prefix.starts_with(&self.failing_prefix) {
            return Err(StorageError::BucketNotFound("kafka-archive".to_string()).into());
        }
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.inner.put(key, data).await
    }
}

/// Store that counts listings before delegating.
pub struct CountingStore {
    inner: Arc<MemoryBackend>,
    lists: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            lists: AtomicUsize::new(0),
        }
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.inner.put(key, data).await
    }
}
