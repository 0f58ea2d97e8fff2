use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::VectorStoreClient;
use crate::gateway::GatewayError;
use crate::models::status::{BatchStatus, FileStatus, ProcessingStatus};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// How a `wait_for_processing` call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(BatchStatus),
    Failed(BatchStatus),
    Cancelled(BatchStatus),
    /// The batch was still processing when the wait budget ran out.
    TimedOut {
        last: Option<BatchStatus>,
        waited: Duration,
    },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Status to report to a caller. A timeout is reported as still in progress.
    pub fn status(&self) -> ProcessingStatus {
        match self {
            Self::Completed(_) => ProcessingStatus::Completed,
            Self::Failed(_) => ProcessingStatus::Failed,
            Self::Cancelled(_) => ProcessingStatus::Cancelled,
            Self::TimedOut { .. } => ProcessingStatus::InProgress,
        }
    }
}

impl VectorStoreClient {
    /// One round trip for the aggregate state of a batch.
    pub async fn check_batch_status(
        &self,
        store_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, GatewayError> {
        let status = self.gateway.retrieve_batch(store_id, batch_id).await?;
        debug!(
            "Batch {batch_id}: {} (completed={}, in_progress={}, failed={})",
            status.status,
            status.file_counts.completed,
            status.file_counts.in_progress,
            status.file_counts.failed
        );
        Ok(status)
    }

    /// Look up every file, at most `upload_concurrency` at a time, in input order.
    /// A failed lookup only affects its own entry.
    pub async fn check_file_status(&self, store_id: &str, file_ids: &[String]) -> Vec<FileStatus> {
        let lookups = file_ids
            .iter()
            .map(|file_id| async move {
                match self.gateway.retrieve_store_file(store_id, file_id).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("Failed to retrieve status of {file_id}: {e}");
                        FileStatus {
                            id: file_id.clone(),
                            status: ProcessingStatus::Failed,
                            error: Some(format!("Failed to retrieve file status: {e}")),
                        }
                    }
                }
            })
            .collect::<Vec<_>>();
        stream::iter(lookups)
            .buffered(self.config.upload_concurrency.max(1))
            .collect()
            .await
    }

    /// Poll a batch until it reaches a terminal state or `max_wait` elapses.
    ///
    /// Gateway errors during a poll are logged and polling continues. Each poll
    /// is cut off at the deadline and the last sleep is clamped to it.
    pub async fn wait_for_processing(
        &self,
        store_id: &str,
        batch_id: &str,
        poll: PollConfig,
    ) -> PollOutcome {
        let interval = poll.interval.max(MIN_POLL_INTERVAL);
        let start = Instant::now();
        let deadline = start + poll.max_wait;
        let mut last = None;

        loop {
            let budget = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_POLL_INTERVAL);
            match timeout(budget, self.check_batch_status(store_id, batch_id)).await {
                Ok(Ok(status)) => match status.status {
                    ProcessingStatus::Completed => return PollOutcome::Completed(status),
                    ProcessingStatus::Failed => return PollOutcome::Failed(status),
                    ProcessingStatus::Cancelled => return PollOutcome::Cancelled(status),
                    ProcessingStatus::InProgress => last = Some(status),
                },
                Ok(Err(e)) => warn!("Polling batch {batch_id} failed: {e}"),
                Err(_) => warn!("Polling batch {batch_id} got no answer within {budget:?}"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Batch {batch_id} still processing after {:?}",
                    now.duration_since(start)
                );
                return PollOutcome::TimedOut {
                    last,
                    waited: now.duration_since(start),
                };
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }
}
