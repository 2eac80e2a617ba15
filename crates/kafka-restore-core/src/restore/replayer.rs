use bytes::Bytes;
use memchr::memchr;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::DayCount;
use crate::archive::{DatePartition, ObjectBuffer};
use crate::producer::{Producer, ProducerMessage};
use crate::{Error, Result};

/// Newline-delimited, non-empty segments of a buffer.
///
/// Segments share the buffer's allocation. A buffer without any newline is a
/// single record; an empty buffer has none.
#[derive(Debug, Clone)]
pub struct Records {
    data: Bytes,
    pos: usize,
}

impl Records {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }
}

impl Iterator for Records {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        while self.pos < self.data.len() {
            let rest = &self.data[self.pos..];
            let (end, next) = match memchr(b'\n', rest) {
                Some(i) => (self.pos + i, self.pos + i + 1),
                None => (self.data.len(), self.data.len()),
            };
            let start = self.pos;
            self.pos = next;
            if end > start {
                return Some(self.data.slice(start..end));
            }
        }
        None
    }
}

/// Per-day replay counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayStats {
    #[serde(flatten)]
    pub partition: DatePartition,
    /// Objects announced by the day's count
    pub announced: usize,
    /// Objects actually consumed
    pub objects: usize,
    pub records: u64,
    pub bytes: u64,
}

impl DayStats {
    fn new(partition: DatePartition, announced: usize) -> Self {
        Self {
            partition,
            announced,
            objects: 0,
            records: 0,
            bytes: 0,
        }
    }
}

/// Consumes day counts and buffers and publishes every record.
pub struct Replayer {
    producer: Arc<dyn Producer>,
    topic: String,
}

impl Replayer {
    pub fn new(producer: Arc<dyn Producer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// Replay until the count channel closes.
    ///
    /// For each [`DayCount`] exactly `count` buffers are read. Publishing does
    /// not wait for delivery. A closed data channel in the middle of a day, or
    /// a buffer tagged with another day, is a [`Error::Pipeline`] error.
    pub async fn run(
        &self,
        mut counts: mpsc::Receiver<DayCount>,
        mut buffers: mpsc::Receiver<ObjectBuffer>,
    ) -> Result<Vec<DayStats>> {
        let mut days = Vec::new();

        while let Some(DayCount { partition, count }) = counts.recv().await {
            let mut stats = DayStats::new(partition, count);

            for received in 0..count {
                let buffer = buffers.recv().await.ok_or_else(|| {
                    Error::Pipeline(format!(
                        "Data channel closed after {} of {} objects for {}",
                        received, count, stats.partition
                    ))
                })?;

                if buffer.partition != stats.partition {
                    return Err(Error::Pipeline(format!(
                        "Received {} from {} while replaying {}",
                        buffer.key, buffer.partition, stats.partition
                    )));
                }

                stats.records += self.publish(&buffer).await?;
                stats.objects += 1;
                stats.bytes += buffer.len() as u64;
            }

            info!(
                "Replayed {}: {} objects, {} records",
                stats.partition.prefix(),
                stats.objects,
                stats.records
            );
            days.push(stats);
        }

        Ok(days)
    }

    async fn publish(&self, buffer: &ObjectBuffer) -> Result<u64> {
        let mut published = 0;
        for record in Records::new(buffer.data.clone()) {
            self.producer
                .send(ProducerMessage::new(self.topic.clone(), record))
                .await?;
            published += 1;
        }
        debug!("Published {} records from {}", published, buffer.key);
        Ok(published)
    }
}
