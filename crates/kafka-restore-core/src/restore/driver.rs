use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::{CompletionBarrier, RunState};
use crate::archive::{ArchiveRetriever, DatePartition, DateRange, ObjectBuffer};
use crate::{Error, Result};

/// Announces how many buffers follow for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCount {
    pub partition: DatePartition,
    pub count: usize,
}

/// What the retrieval task handed off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalSummary {
    pub days: usize,
    pub objects: usize,
    pub bytes: u64,
}

/// Walks a date range one day at a time and feeds the hand-off channels.
///
/// For each day the [`DayCount`] is sent before any download starts, then
/// every object is downloaded and sent in listing order. Days never overlap.
pub struct DateRangeDriver {
    retriever: ArchiveRetriever,
    topic: String,
    range: DateRange,
    state: Option<Arc<watch::Sender<RunState>>>,
}

impl DateRangeDriver {
    pub fn new(retriever: ArchiveRetriever, topic: impl Into<String>, range: DateRange) -> Self {
        Self {
            retriever,
            topic: topic.into(),
            range,
            state: None,
        }
    }

    /// Publish `Retrieving` transitions on `state`.
    pub fn with_state(mut self, state: Arc<watch::Sender<RunState>>) -> Self {
        self.state = Some(state);
        self
    }

    /// Retrieve every day in the range.
    ///
    /// Releases `barrier` once the last day has been handed off. Any list or
    /// download failure stops retrieval and is returned without releasing it.
    pub async fn run(
        self,
        counts: mpsc::Sender<DayCount>,
        buffers: mpsc::Sender<ObjectBuffer>,
        barrier: Arc<CompletionBarrier>,
    ) -> Result<RetrievalSummary> {
        let mut summary = RetrievalSummary::default();

        for (day, partition) in self.range.partitions(&self.topic).enumerate() {
            if let Some(state) = &self.state {
                state.send_replace(RunState::Retrieving {
                    day,
                    date: partition.date,
                });
            }

            let refs = self.retriever.list(&partition).await.map_err(|e| {
                error!("Listing {} failed: {}", partition.prefix(), e);
                e
            })?;
            info!("{}: {} objects", partition.prefix(), refs.len());

            counts
                .send(DayCount {
                    partition: partition.clone(),
                    count: refs.len(),
                })
                .await
                .map_err(|_| replay_stopped(&partition))?;

            for object in &refs {
                let buffer = self.retriever.fetch(object).await.map_err(|e| {
                    error!("Downloading {} failed: {}", object.key, e);
                    e
                })?;
                summary.objects += 1;
                summary.bytes += buffer.len() as u64;

                buffers
                    .send(buffer)
                    .await
                    .map_err(|_| replay_stopped(&partition))?;
            }

            summary.days += 1;
        }

        debug!(
            "Retrieval finished: {} days, {} objects",
            summary.days, summary.objects
        );
        barrier.done();
        Ok(summary)
    }
}

fn replay_stopped(partition: &DatePartition) -> Error {
    Error::Pipeline(format!(
        "Replayer stopped receiving while retrieving {}",
        partition
    ))
}
