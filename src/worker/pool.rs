//! Bounded-concurrency worker pool (spec §4.3).
//!
//! Each worker loop reserves one job at a time, drives it through
//! [`super::runner::process_job`], applies the resulting ack/nack, and
//! reserves again. Workers wake on the queue's `Notify` when new work
//! arrives, falling back to a bounded poll interval so a missed
//! notification never stalls the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::observability::Metrics;
use crate::posting::PostingClient;
use crate::queue::WorkQueue;
use crate::state_store::StateStore;

use super::runner::{apply_outcome, process_job, JobOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub backoff_base_secs: u64,
    pub max_retries: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            backoff_base_secs: 1,
            max_retries: 5,
        }
    }
}

/// Owns the pool's worker tasks. Dropping the last clone after
/// [`WorkerPool::shutdown`] stops reservation; in-flight protocol steps are
/// never cancelled mid-step (spec §5's graceful shutdown requirement).
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        config: WorkerPoolConfig,
        queue: Arc<WorkQueue>,
        state_store: Arc<StateStore>,
        posting: Arc<PostingClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(config.concurrency);
        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        for worker_index in 0..config.concurrency {
            let worker_id = format!("worker-{worker_index}");
            let queue = queue.clone();
            let state_store = state_store.clone();
            let posting = posting.clone();
            let metrics = metrics.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let backoff_base_secs = config.backoff_base_secs;
            let max_retries = config.max_retries;

            let handle = tokio::spawn(async move {
                run_worker_loop(
                    worker_id,
                    queue,
                    state_store,
                    posting,
                    metrics,
                    semaphore,
                    cancel,
                    backoff_base_secs,
                    max_retries,
                )
                .await;
            });
            handles.push(handle);
        }

        info!(concurrency = config.concurrency, "worker pool started");
        Self { cancel, handles }
    }

    /// Signals all workers to stop reserving new jobs. Does not abort
    /// in-flight jobs; callers should `await` the pool afterwards to let
    /// those finish.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker_loop(
    worker_id: String,
    queue: Arc<WorkQueue>,
    state_store: Arc<StateStore>,
    posting: Arc<PostingClient>,
    metrics: Arc<Metrics>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    backoff_base_secs: u64,
    max_retries: u32,
) {
    let notify = queue.notifier();

    loop {
        if cancel.is_cancelled() {
            debug!(worker_id, "stopping: no further reservations");
            return;
        }

        let permit = semaphore.clone().acquire_owned().await;
        let Ok(_permit) = permit else {
            return;
        };

        let reserved = match queue.reserve(&worker_id).await {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(worker_id, error = %err, "reserve failed");
                None
            }
        };

        let Some(job) = reserved else {
            drop(_permit);
            tokio::select! {
                _ = notify.notified() => {}
                _ = sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => return,
            }
            continue;
        };

        let job_id = job.id.clone();
        let outcome = process_job(&job, &state_store, &posting, backoff_base_secs, max_retries).await;
        record_metrics(&metrics, &outcome);
        apply_outcome(&queue, &job_id, &outcome).await;
    }
}

fn record_metrics(metrics: &Metrics, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed => metrics.transaction_completed(),
        JobOutcome::RetryPreWrite(_) => metrics.transaction_retried(),
        JobOutcome::TerminalFailure(_) => metrics.transaction_failed(),
    }
}
