use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{
    DeliveryError, DeliveryNotifier, DeliveryReports, DeliverySuccess, Producer, ProducerMessage,
};
use crate::error::KafkaError;
use crate::Result;

type RejectFn = dyn Fn(&ProducerMessage) -> bool + Send + Sync;

/// Default capacity of the notification channels
const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// In-process producer that records every message it is given.
///
/// Accepted messages are acknowledged on partition 0 with sequential offsets.
/// Messages matching the reject predicate are reported on the error stream.
pub struct MemoryProducer {
    notifier: Mutex<Option<DeliveryNotifier>>,
    submitted: Mutex<Vec<ProducerMessage>>,
    next_offset: Mutex<i64>,
    reject: Option<Arc<RejectFn>>,
}

impl MemoryProducer {
    pub fn new() -> (Self, DeliveryReports) {
        Self::build(None, DEFAULT_NOTIFICATION_CAPACITY)
    }

    /// A producer that fails every message for which `reject` returns true.
    pub fn rejecting<F>(reject: F) -> (Self, DeliveryReports)
    where
        F: Fn(&ProducerMessage) -> bool + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(reject)), DEFAULT_NOTIFICATION_CAPACITY)
    }

    fn build(reject: Option<Arc<RejectFn>>, capacity: usize) -> (Self, DeliveryReports) {
        let (notifier, reports) = DeliveryNotifier::channel(capacity);
        let producer = Self {
            notifier: Mutex::new(Some(notifier)),
            submitted: Mutex::new(Vec::new()),
            next_offset: Mutex::new(0),
            reject,
        };
        (producer, reports)
    }

    /// Every message submitted so far, in submission order.
    pub fn messages(&self) -> Vec<ProducerMessage> {
        self.submitted.lock().clone()
    }

    /// Payloads of every submitted message, in submission order.
    pub fn payloads(&self) -> Vec<bytes::Bytes> {
        self.submitted
            .lock()
            .iter()
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.notifier.lock().is_none()
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&self, message: ProducerMessage) -> Result<()> {
        let notifier = self
            .notifier
            .lock()
            .clone()
            .ok_or(KafkaError::ProducerClosed)?;

        self.submitted.lock().push(message.clone());

        let rejected = self.reject.as_ref().is_some_and(|reject| reject(&message));
        if rejected {
            notifier
                .error(DeliveryError {
                    message,
                    cause: "rejected by memory producer".to_string(),
                })
                .await;
        } else {
            let offset = {
                let mut next = self.next_offset.lock();
                let offset = *next;
                *next += 1;
                offset
            };
            notifier
                .success(DeliverySuccess {
                    topic: message.topic,
                    partition: 0,
                    offset,
                })
                .await;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.notifier.lock().take();
        Ok(())
    }
}
