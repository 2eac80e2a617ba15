//! Asynchronous message producer abstraction.
//!
//! A producer accepts messages on an input queue and reports the outcome of
//! each one later, on one of two independent notification streams. Callers
//! never wait for delivery when submitting.

mod memory;

pub use memory::MemoryProducer;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;

/// One outbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl ProducerMessage {
    pub fn new(topic: impl Into<String>, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// A message the broker acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySuccess {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message the producer gave up on.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub message: ProducerMessage,
    pub cause: String,
}

/// Notification streams handed out when a producer is built.
///
/// Both close once the producer's worker has terminated, which happens after
/// [`Producer::close`].
#[derive(Debug)]
pub struct DeliveryReports {
    pub successes: mpsc::Receiver<DeliverySuccess>,
    pub errors: mpsc::Receiver<DeliveryError>,
}

/// Sending half of [`DeliveryReports`], owned by a producer implementation.
#[derive(Debug, Clone)]
pub(crate) struct DeliveryNotifier {
    successes: mpsc::Sender<DeliverySuccess>,
    errors: mpsc::Sender<DeliveryError>,
}

impl DeliveryNotifier {
    pub(crate) fn channel(capacity: usize) -> (Self, DeliveryReports) {
        let (success_tx, success_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);
        (
            Self {
                successes: success_tx,
                errors: error_tx,
            },
            DeliveryReports {
                successes: success_rx,
                errors: error_rx,
            },
        )
    }

    /// Report a delivery. Dropped silently if nobody is listening.
    pub(crate) async fn success(&self, success: DeliverySuccess) {
        let _ = self.successes.send(success).await;
    }

    /// Report a failure. Dropped silently if nobody is listening.
    pub(crate) async fn error(&self, error: DeliveryError) {
        let _ = self.errors.send(error).await;
    }
}

/// Asynchronous, fire-and-forget message producer.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Enqueue a message. Suspends while the input queue is full.
    ///
    /// Fails only when the producer no longer accepts messages.
    async fn send(&self, message: ProducerMessage) -> Result<()>;

    /// Stop accepting messages, flush what is pending and release resources.
    ///
    /// The delivery report streams close once this returns.
    async fn close(&self) -> Result<()>;
}
