use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{error, info, trace, warn};

use crate::archive::DatePartition;
use crate::config::DeliveryFailurePolicy;
use crate::producer::{DeliveryReports, ProducerMessage};
use crate::storage::StorageBackend;

/// Outcome of draining the delivery report streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub dead_letter_key: Option<String>,
    pub dead_letter_error: Option<String>,
}

/// Drains success and error notifications until both streams close.
///
/// Failures are never retried here. Depending on the policy they are only
/// logged, or also collected and written to the archive store in one object
/// once the streams close.
pub struct AcknowledgementMonitor {
    policy: DeliveryFailurePolicy,
    storage: Arc<dyn StorageBackend>,
}

impl AcknowledgementMonitor {
    pub fn new(policy: DeliveryFailurePolicy, storage: Arc<dyn StorageBackend>) -> Self {
        Self { policy, storage }
    }

    pub async fn run(self, mut reports: DeliveryReports) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        let mut dead_letters: Vec<ProducerMessage> = Vec::new();
        let mut successes_open = true;
        let mut errors_open = true;

        while successes_open || errors_open {
            tokio::select! {
                success = reports.successes.recv(), if successes_open => match success {
                    Some(success) => {
                        summary.delivered += 1;
                        trace!(
                            "Delivered to {}:{} at offset {}",
                            success.topic,
                            success.partition,
                            success.offset
                        );
                    }
                    None => successes_open = false,
                },
                failure = reports.errors.recv(), if errors_open => match failure {
                    Some(failure) => {
                        summary.failed += 1;
                        warn!(
                            "Delivery to {} failed ({} bytes): {}",
                            failure.message.topic,
                            failure.message.payload.len(),
                            failure.cause
                        );
                        if matches!(self.policy, DeliveryFailurePolicy::DeadLetter { .. }) {
                            dead_letters.push(failure.message);
                        }
                    }
                    None => errors_open = false,
                },
            }
        }

        if let DeliveryFailurePolicy::DeadLetter { prefix } = &self.policy {
            if !dead_letters.is_empty() {
                let key = dead_letter_key(prefix, chrono::Utc::now());
                let count = dead_letters.len() as u64;
                match self.storage.put(&key, join_lines(&dead_letters)).await {
                    Ok(()) => {
                        info!("Wrote {} failed records to {}", count, key);
                        summary.dead_lettered = count;
                        summary.dead_letter_key = Some(key);
                    }
                    Err(e) => {
                        error!("Writing {} failed records to {} failed: {}", count, key, e);
                        summary.dead_letter_error = Some(e.to_string());
                    }
                }
            }
        }

        summary
    }
}

/// `<prefix>/year=YYYY/month=MM/day=DD/failed-<unix_ms>.log`, replayable
/// with `prefix` as the source topic.
pub fn dead_letter_key(prefix: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let partition = DatePartition::new(prefix.trim_matches('/'), now.date_naive());
    format!(
        "{}/failed-{}.log",
        partition.prefix(),
        now.timestamp_millis()
    )
}

fn join_lines(messages: &[ProducerMessage]) -> Bytes {
    let size = messages.iter().map(|m| m.payload.len() + 1).sum();
    let mut buf = BytesMut::with_capacity(size);
    for message in messages {
        buf.put_slice(&message.payload);
        buf.put_u8(b'\n');
    }
    buf.freeze()
}
