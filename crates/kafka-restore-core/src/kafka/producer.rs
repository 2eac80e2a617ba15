//! Batching Kafka producer.
//!
//! [`KafkaProducer::send`] only enqueues. A background worker assigns each
//! keyless message a partition round-robin, accumulates per-partition batches
//! and flushes each one when full, when its linger time expires, or on close.
//! Failed batches are retried with exponential backoff; once retries are
//! exhausted every message of the batch is reported on the error stream.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::admin::ensure_topic;
use super::partition_router::PartitionLeaderRouter;
use super::tls::client_tls_config;
use crate::config::{CreateTopicOptions, KafkaConfig, ProducerOptions};
use crate::error::KafkaError;
use crate::producer::{
    DeliveryError, DeliveryNotifier, DeliveryReports, DeliverySuccess, Producer, ProducerMessage,
};
use crate::{Error, Result};

/// Where batches end up. Implemented by the partition router; tests use fakes.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Partition ids of `topic`.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Write one batch and return the base offset assigned to it.
    async fn produce(&self, topic: &str, partition: i32, payloads: &[Bytes]) -> Result<i64>;
}

/// [`RecordSink`] backed by a live cluster.
struct RouterSink {
    router: PartitionLeaderRouter,
    acks: i16,
    timeout_ms: i32,
}

#[async_trait]
impl RecordSink for RouterSink {
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.router.partitions(topic).await
    }

    async fn produce(&self, topic: &str, partition: i32, payloads: &[Bytes]) -> Result<i64> {
        let response = self
            .router
            .produce(topic, partition, payloads, self.acks, self.timeout_ms)
            .await?;
        Ok(response.base_offset)
    }
}

/// Kafka producer with an input queue and a batching worker.
pub struct KafkaProducer {
    input: parking_lot::Mutex<Option<mpsc::Sender<ProducerMessage>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl KafkaProducer {
    /// Connect to the cluster and start the worker.
    ///
    /// Creates `topic` first when `create_topic` is set, and fails if the
    /// topic does not exist afterwards.
    pub async fn connect(
        config: &KafkaConfig,
        options: &ProducerOptions,
        topic: &str,
        create_topic: Option<&CreateTopicOptions>,
    ) -> Result<(Self, DeliveryReports)> {
        let tls = client_tls_config(&config.security).await?;
        let topics = vec![topic.to_string()];
        let router = PartitionLeaderRouter::new(config.clone(), tls, &topics).await?;

        if let Some(create) = create_topic {
            ensure_topic(router.bootstrap_client(), topic, create).await?;
            router.refresh_metadata(&topics).await?;
        }

        let partitions = router.known_partitions(topic).await?;
        info!(
            "Connected to Kafka; topic '{}' has {} partitions",
            topic,
            partitions.len()
        );

        let sink = RouterSink {
            router,
            acks: options.acks,
            timeout_ms: options.request_timeout_ms,
        };
        let known = HashMap::from([(topic.to_string(), partitions)]);
        Ok(Self::start(Arc::new(sink), options.clone(), known))
    }

    /// Start a producer writing to an arbitrary sink.
    pub fn with_sink(sink: Arc<dyn RecordSink>, options: ProducerOptions) -> (Self, DeliveryReports) {
        Self::start(sink, options, HashMap::new())
    }

    fn start(
        sink: Arc<dyn RecordSink>,
        options: ProducerOptions,
        partitions: HashMap<String, Vec<i32>>,
    ) -> (Self, DeliveryReports) {
        let (input_tx, input_rx) = mpsc::channel(options.queue_capacity);
        let (notifier, reports) = DeliveryNotifier::channel(options.notification_capacity);

        let worker = ProducerWorker::new(sink, options, notifier, partitions);
        let handle = tokio::spawn(worker.run(input_rx));

        let producer = Self {
            input: parking_lot::Mutex::new(Some(input_tx)),
            worker: parking_lot::Mutex::new(Some(handle)),
        };
        (producer, reports)
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, message: ProducerMessage) -> Result<()> {
        let input = self
            .input
            .lock()
            .clone()
            .ok_or(KafkaError::ProducerClosed)?;
        input
            .send(message)
            .await
            .map_err(|_| KafkaError::ProducerClosed)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last sender lets the worker drain and exit
        self.input.lock().take();

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Pipeline(format!("Producer worker failed: {}", e))),
            None => Ok(()),
        }
    }
}

struct Batch {
    /// Arrival of the first message
    opened: Instant,
    messages: Vec<ProducerMessage>,
}

struct ProducerWorker {
    sink: Arc<dyn RecordSink>,
    options: ProducerOptions,
    notifier: DeliveryNotifier,
    /// Partition ids per topic; only successful lookups are kept
    partitions: HashMap<String, Vec<i32>>,
    next_partition: HashMap<String, usize>,
    batches: HashMap<(String, i32), Batch>,
}

impl ProducerWorker {
    fn new(
        sink: Arc<dyn RecordSink>,
        options: ProducerOptions,
        notifier: DeliveryNotifier,
        partitions: HashMap<String, Vec<i32>>,
    ) -> Self {
        Self {
            sink,
            options,
            notifier,
            partitions,
            next_partition: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    async fn run(mut self, mut input: mpsc::Receiver<ProducerMessage>) {
        let linger = Duration::from_millis(self.options.linger_ms);

        loop {
            let deadline = self.linger_deadline(linger);
            tokio::select! {
                message = input.recv() => match message {
                    Some(message) => self.enqueue(message).await,
                    None => break,
                },
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.flush_expired(linger).await;
                }
            }
        }

        self.flush_all().await;
        debug!("Producer worker stopped");
    }

    async fn enqueue(&mut self, message: ProducerMessage) {
        let partition = match self.assign_partition(&message.topic).await {
            Ok(partition) => partition,
            Err(cause) => {
                self.notifier
                    .error(DeliveryError { message, cause })
                    .await;
                return;
            }
        };

        let key = (message.topic.clone(), partition);
        let batch = self.batches.entry(key.clone()).or_insert_with(|| Batch {
            opened: Instant::now(),
            messages: Vec::new(),
        });
        batch.messages.push(message);

        if batch.messages.len() >= self.options.batch_size {
            if let Some(batch) = self.batches.remove(&key) {
                self.flush(key.0, key.1, batch.messages).await;
            }
        }
    }

    /// When the longest-waiting open batch is due.
    fn linger_deadline(&self, linger: Duration) -> Option<Instant> {
        self.batches.values().map(|b| b.opened + linger).min()
    }

    /// Round-robin over the topic's partitions. A failed lookup is not
    /// remembered, so the next message for the topic asks again.
    async fn assign_partition(&mut self, topic: &str) -> std::result::Result<i32, String> {
        if !self.partitions.contains_key(topic) {
            match self.sink.partitions(topic).await {
                Ok(ids) if !ids.is_empty() => {
                    self.partitions.insert(topic.to_string(), ids);
                }
                Ok(_) => return Err(format!("Topic {} has no partitions", topic)),
                Err(e) => {
                    warn!("Partition lookup for {} failed: {}", topic, e);
                    return Err(format!("No partitions available for topic {}: {}", topic, e));
                }
            }
        }

        let Some(ids) = self.partitions.get(topic) else {
            return Err(format!("No partitions available for topic {}", topic));
        };
        let counter = self.next_partition.entry(topic.to_string()).or_insert(0);
        let partition = ids[*counter % ids.len()];
        *counter = counter.wrapping_add(1);
        Ok(partition)
    }

    async fn flush_all(&mut self) {
        let mut batches: Vec<_> = self.batches.drain().collect();
        batches.sort_by(|a, b| a.0.cmp(&b.0));
        for ((topic, partition), batch) in batches {
            self.flush(topic, partition, batch.messages).await;
        }
    }

    async fn flush_expired(&mut self, linger: Duration) {
        let now = Instant::now();
        let mut due: Vec<_> = self
            .batches
            .iter()
            .filter(|(_, b)| b.opened + linger <= now)
            .map(|(key, _)| key.clone())
            .collect();
        due.sort();
        for key in due {
            if let Some(batch) = self.batches.remove(&key) {
                self.flush(key.0, key.1, batch.messages).await;
            }
        }
    }

    async fn flush(&self, topic: String, partition: i32, batch: Vec<ProducerMessage>) {
        let payloads: Vec<Bytes> = batch.iter().map(|m| m.payload.clone()).collect();
        let mut attempt: u32 = 0;

        loop {
            match self.sink.produce(&topic, partition, &payloads).await {
                Ok(base_offset) => {
                    debug!(
                        "Flushed {} records to {}:{} at offset {}",
                        payloads.len(),
                        topic,
                        partition,
                        base_offset
                    );
                    for (i, _) in batch.iter().enumerate() {
                        self.notifier
                            .success(DeliverySuccess {
                                topic: topic.clone(),
                                partition,
                                offset: base_offset + i as i64,
                            })
                            .await;
                    }
                    return;
                }
                Err(e) if attempt < self.options.max_retries => {
                    let backoff = self
                        .options
                        .retry_backoff_ms
                        .saturating_mul(1u64 << attempt.min(16));
                    attempt += 1;
                    warn!(
                        "Produce to {}:{} failed (attempt {}/{}), retrying in {}ms: {}",
                        topic,
                        partition,
                        attempt,
                        self.options.max_retries,
                        backoff,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    let cause = e.to_string();
                    warn!(
                        "Giving up on {} records for {}:{}: {}",
                        batch.len(),
                        topic,
                        partition,
                        cause
                    );
                    for message in batch {
                        self.notifier
                            .error(DeliveryError {
                                message,
                                cause: cause.clone(),
                            })
                            .await;
                    }
                    return;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
