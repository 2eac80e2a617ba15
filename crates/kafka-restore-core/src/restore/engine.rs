//! Restore engine orchestration.
//!
//! One run wires three tasks together: retrieval (driver + retriever), replay
//! (on the calling task) and the acknowledgement monitor. They share nothing
//! but the two hand-off channels, the completion barrier and the producer.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    AcknowledgementMonitor, CompletionBarrier, DateRangeDriver, Replayer, RestoreReport,
    RetrievalSummary, RunState,
};
use crate::archive::{ArchiveRetriever, DateRange};
use crate::config::Config;
use crate::kafka::KafkaProducer;
use crate::producer::{DeliveryReports, MemoryProducer, Producer};
use crate::storage::{create_backend, StorageBackend};
use crate::{Error, Result};

/// Replays archived days into a Kafka topic.
pub struct RestoreEngine {
    config: Config,
    storage: Arc<dyn StorageBackend>,
    state: Arc<watch::Sender<RunState>>,
}

impl RestoreEngine {
    /// Create a new restore engine
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = create_backend(&config.storage)?;
        Ok(Self::build(config, storage))
    }

    /// Create an engine reading from an already constructed archive store.
    pub fn with_storage(config: Config, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, storage))
    }

    fn build(config: Config, storage: Arc<dyn StorageBackend>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            config,
            storage,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.storage)
    }

    /// Watch run state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Run a restore over the configured date range.
    ///
    /// Connects to Kafka unless `dry_run` is set, in which case records go to
    /// a [`MemoryProducer`].
    pub async fn run(&self) -> Result<RestoreReport> {
        let range = self.config.date_range()?;
        let restore = &self.config.restore;

        if restore.dry_run {
            info!("Dry run: records will not be sent to Kafka");
            let (producer, reports) = MemoryProducer::new();
            return self.run_range(range, Arc::new(producer), reports).await;
        }

        info!(
            "Connecting to Kafka at {:?}",
            self.config.target.bootstrap_servers
        );
        let connected = KafkaProducer::connect(
            &self.config.target,
            &self.config.producer,
            restore.destination_topic(),
            restore.create_topic.as_ref(),
        )
        .await;

        match connected {
            Ok((producer, reports)) => self.run_range(range, Arc::new(producer), reports).await,
            Err(e) => {
                error!("Kafka producer initialization failed: {}", e);
                self.state.send_replace(RunState::Aborted);
                Err(e)
            }
        }
    }

    /// Run a restore over `range` with the given producer.
    pub async fn run_range(
        &self,
        range: DateRange,
        producer: Arc<dyn Producer>,
        reports: DeliveryReports,
    ) -> Result<RestoreReport> {
        let restore = &self.config.restore;
        let started = Instant::now();
        let start_time = chrono::Utc::now().timestamp_millis();

        self.state.send_replace(RunState::Idle);
        info!(
            "Restoring '{}' into '{}' for {} ({} days)",
            restore.source_topic,
            restore.destination_topic(),
            range,
            range.len()
        );

        let monitor = AcknowledgementMonitor::new(
            restore.on_delivery_failure.clone(),
            Arc::clone(&self.storage),
        );
        let monitor_handle = tokio::spawn(monitor.run(reports));

        let (count_tx, count_rx) = mpsc::channel(restore.handoff_capacity);
        let (buffer_tx, buffer_rx) = mpsc::channel(restore.handoff_capacity);
        let barrier = Arc::new(CompletionBarrier::new(1));

        let driver = DateRangeDriver::new(
            ArchiveRetriever::new(Arc::clone(&self.storage)),
            restore.source_topic.clone(),
            range,
        )
        .with_state(Arc::clone(&self.state));
        let mut retrieval_handle =
            tokio::spawn(driver.run(count_tx, buffer_tx, Arc::clone(&barrier)));

        let replayer = Replayer::new(Arc::clone(&producer), restore.destination_topic());
        let replayed = replayer.run(count_rx, buffer_rx).await;

        // The barrier gates shutdown. A failed retrieval never releases it, so
        // the task's own exit is raced against the wait.
        let retrieved = if replayed.is_ok() {
            tokio::select! {
                _ = barrier.wait() => {
                    debug!("Retrieval complete, closing producer");
                    join_retrieval(retrieval_handle).await
                }
                joined = &mut retrieval_handle => flatten_retrieval(joined),
            }
        } else {
            join_retrieval(retrieval_handle).await
        };

        let days = match (retrieved, replayed) {
            (Ok(summary), Ok(days)) => {
                debug!(
                    "Retrieved {} objects ({} bytes) over {} days",
                    summary.objects, summary.bytes, summary.days
                );
                days
            }
            // A failed retrieval cuts the replayer off; report the cause
            (Err(e), Ok(_)) | (Err(e), Err(Error::Pipeline(_))) => {
                return Err(self.abort(e, producer.as_ref(), monitor_handle).await);
            }
            (_, Err(e)) => {
                return Err(self.abort(e, producer.as_ref(), monitor_handle).await);
            }
        };

        self.state.send_replace(RunState::Draining);
        let close_error = match producer.close().await {
            Ok(()) => None,
            Err(e) => {
                error!("Error closing producer: {}", e);
                Some(e.to_string())
            }
        };

        let acknowledgements = monitor_handle.await.unwrap_or_else(|e| {
            error!("Acknowledgement monitor failed: {}", e);
            Default::default()
        });
        self.state.send_replace(RunState::Closed);

        let mut errors = Vec::new();
        if let Some(error) = acknowledgements.dead_letter_error.clone() {
            errors.push(format!("Dead-letter write failed: {}", error));
        }

        let report = RestoreReport {
            source_topic: restore.source_topic.clone(),
            destination_topic: restore.destination_topic().to_string(),
            start_date: range.start(),
            end_date: range.end(),
            dry_run: restore.dry_run,
            start_time,
            end_time: chrono::Utc::now().timestamp_millis(),
            duration_ms: started.elapsed().as_millis() as u64,
            objects: days.iter().map(|d| d.objects as u64).sum(),
            records: days.iter().map(|d| d.records).sum(),
            bytes: days.iter().map(|d| d.bytes).sum(),
            days,
            delivered: acknowledgements.delivered,
            failed: acknowledgements.failed,
            dead_lettered: acknowledgements.dead_lettered,
            dead_letter_key: acknowledgements.dead_letter_key,
            close_error,
            errors,
        };

        info!(
            "Restore completed: {} records from {} objects, {} delivered, {} failed",
            report.records, report.objects, report.delivered, report.failed
        );
        if report.failed > 0 {
            warn!("{} records were not delivered", report.failed);
        }

        Ok(report)
    }

    /// Stop after a fatal error: release the producer and hand the error back.
    async fn abort(
        &self,
        cause: Error,
        producer: &dyn Producer,
        monitor: JoinHandle<super::MonitorSummary>,
    ) -> Error {
        error!("Restore aborted: {}", cause);
        self.state.send_replace(RunState::Aborted);

        if let Err(e) = producer.close().await {
            warn!("Error closing producer after abort: {}", e);
        }
        if let Ok(summary) = monitor.await {
            debug!(
                "Before abort: {} delivered, {} failed",
                summary.delivered, summary.failed
            );
        }

        cause
    }
}

async fn join_retrieval(handle: JoinHandle<Result<RetrievalSummary>>) -> Result<RetrievalSummary> {
    flatten_retrieval(handle.await)
}

fn flatten_retrieval(
    joined: std::result::Result<Result<RetrievalSummary>, tokio::task::JoinError>,
) -> Result<RetrievalSummary> {
    joined
        .map_err(|e| Error::Pipeline(format!("Retrieval task failed: {}", e)))
        .and_then(|result| result)
}
