use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::api::models::Transaction;

use super::error::{QueueError, Result};
use super::partitions::encode_job_key;

/// Default backoff base for `nack(retryable)` rescheduling (spec §4.2).
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;

/// "MAX_RETRIES total attempts including the first" (spec §9, Open Question).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default lease duration granted to a worker on `reserve`.
pub const DEFAULT_LEASE_SECS: i64 = 30;

/// Completed jobs are retained for diagnostics, bounded by whichever of the
/// two limits is reached first (spec §4.2).
pub const COMPLETED_RETENTION: ChronoDuration = ChronoDuration::hours(1);
pub const COMPLETED_RETENTION_MAX: usize = 1_000;

/// Failed jobs are retained longer, since they are the ones an operator
/// actually needs to go look at (spec §4.2).
pub const FAILED_RETENTION: ChronoDuration = ChronoDuration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct JobRecord {
    id: String,
    payload: Transaction,
    attempt: u32,
    state: JobState,
    not_before: DateTime<Utc>,
    lease_expires_at: Option<DateTime<Utc>>,
    worker: Option<String>,
    /// When the job entered `completed` or `failed`. Drives the retention
    /// sweep; `None` for jobs still `waiting`/`active`.
    #[serde(default)]
    terminal_at: Option<DateTime<Utc>>,
}

/// A job handed to a worker by [`WorkQueue::reserve`] (spec §4.2's `QueueJob`).
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: String,
    pub payload: Transaction,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A fresh job was written.
    Enqueued,
    /// A job for this id is already `waiting`/`active`; this call was a no-op.
    AlreadyQueued,
}

/// Snapshot of queue occupancy for `GET /api/health` (spec §6).
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueMetrics {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub failed: u64,
    pub completed: u64,
    pub total: u64,
}

/// Durable FIFO-ish job queue with id-based dedup, lease-based at-least-once
/// delivery, and exponential-backoff bounded retries (spec §4.2).
///
/// Built on the same embedded LSM engine as the state store, in its own
/// partition, named after `queue.name` so distinct deployments sharing a
/// keyspace path stay isolated from each other's jobs (spec §6). `reserve`
/// and `enqueue`/`nack` each take a short-lived in-process lock around
/// their check-then-write sequence: fjall gives no compare-and-swap, so an
/// internal mutex guards each of these sequences instead.
pub struct WorkQueue {
    #[allow(dead_code)]
    keyspace: Keyspace,
    jobs: PartitionHandle,
    write_lock: Arc<Mutex<()>>,
    max_retries: u32,
    backoff_base_secs: u64,
    lease_secs: i64,
    notify: Arc<Notify>,
}

impl WorkQueue {
    pub fn open<P: AsRef<Path>>(
        path: P,
        queue_name: &str,
        max_retries: u32,
        backoff_base_secs: u64,
        lease_secs: i64,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), queue_name, "opening work queue");
        let keyspace = Config::new(path).open()?;
        let partition_name = format!("work_queue__{queue_name}");
        let jobs = keyspace.open_partition(&partition_name, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            write_lock: Arc::new(Mutex::new(())),
            max_retries,
            backoff_base_secs,
            lease_secs,
            notify: Arc::new(Notify::new()),
        })
    }

    /// Notification fired on enqueue and on a retryable `nack`, so a worker
    /// pool waiting for work can wake eagerly instead of only on its poll
    /// interval.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn get_record(&self, id: &str) -> Result<Option<JobRecord>> {
        let key = encode_job_key(id);
        match self.jobs.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_record(&self, record: &JobRecord) -> Result<()> {
        let key = encode_job_key(&record.id);
        let value = serde_json::to_vec(record)?;
        self.jobs.insert(key, value)?;
        Ok(())
    }

    /// `enqueue(id, payload)` (spec §4.2). A no-op while an existing job for
    /// `id` is `waiting` or `active`; once a job for `id` has reached a
    /// terminal state (`completed` or `failed`), a new enqueue replaces it
    /// with a fresh attempt-0 job.
    pub async fn enqueue(&self, id: &str, payload: Transaction) -> Result<EnqueueOutcome> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.get_record(id)? {
            if matches!(existing.state, JobState::Waiting | JobState::Active) {
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
        }

        let now = Utc::now();
        let record = JobRecord {
            id: id.to_string(),
            payload,
            attempt: 0,
            state: JobState::Waiting,
            not_before: now,
            lease_expires_at: None,
            worker: None,
            terminal_at: None,
        };
        self.put_record(&record)?;
        debug!(job_id = %id, "enqueued job");
        self.notify.notify_one();
        Ok(EnqueueOutcome::Enqueued)
    }

    /// One non-blocking reservation attempt. Sweeps expired leases back to
    /// `waiting` as it scans, then claims the earliest eligible job, if any.
    /// Callers loop (driven by `notifier()` plus a bounded poll interval) to
    /// turn this into the queue's pull-based delivery model.
    pub async fn reserve(&self, worker: &str) -> Result<Option<QueueJob>> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let mut candidate: Option<JobRecord> = None;

        for item in self.jobs.iter() {
            let (key, value) = item?;
            let mut record: JobRecord = serde_json::from_slice(&value)?;

            if record.state == JobState::Active {
                if let Some(expires) = record.lease_expires_at {
                    if expires <= now {
                        warn!(job_id = %record.id, "lease expired, requeuing for redelivery");
                        record.state = JobState::Waiting;
                        record.lease_expires_at = None;
                        record.worker = None;
                        self.jobs.insert(key, serde_json::to_vec(&record)?)?;
                    }
                }
                continue;
            }

            if record.state != JobState::Waiting || record.not_before > now {
                continue;
            }

            let take = match &candidate {
                Some(current) => record.not_before < current.not_before,
                None => true,
            };
            if take {
                candidate = Some(record);
            }
        }

        let Some(mut record) = candidate else {
            return Ok(None);
        };

        record.state = JobState::Active;
        record.lease_expires_at = Some(now + chrono::Duration::seconds(self.lease_secs));
        record.worker = Some(worker.to_string());
        self.put_record(&record)?;

        Ok(Some(QueueJob {
            id: record.id,
            payload: record.payload,
            attempt: record.attempt,
        }))
    }

    /// Positive acknowledgement: the job's effect is confirmed. The record
    /// moves to `completed` rather than being deleted outright, so it stays
    /// around for the short retention window in §4.2's diagnostics budget;
    /// `prune_retention` is what eventually removes it.
    pub async fn ack(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.get_record(id)? else {
            return Err(QueueError::NotFound(id.to_string()));
        };

        record.state = JobState::Completed;
        record.terminal_at = Some(Utc::now());
        record.lease_expires_at = None;
        record.worker = None;
        self.put_record(&record)?;
        debug!(job_id = %id, "acked job, retained for diagnostics");
        Ok(())
    }

    /// Negative acknowledgement. `retryable = true` reschedules with delay
    /// `base * 2^attempt`, provided the next attempt would stay within
    /// `max_retries` total attempts; otherwise (or when `retryable = false`)
    /// the job moves to the terminal `failed` state and is not redelivered.
    pub async fn nack(&self, id: &str, retryable: bool, cause: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.get_record(id)? else {
            return Err(QueueError::NotFound(id.to_string()));
        };

        let next_attempt = record.attempt + 1;

        if retryable && next_attempt < self.max_retries {
            let delay_secs = self.backoff_base_secs * 2u64.pow(record.attempt);
            record.attempt = next_attempt;
            record.state = JobState::Waiting;
            record.not_before = Utc::now() + chrono::Duration::seconds(delay_secs as i64);
            record.lease_expires_at = None;
            record.worker = None;
            self.put_record(&record)?;
            debug!(job_id = %id, attempt = next_attempt, delay_secs, cause, "nacked job for retry");
            self.notify.notify_one();
        } else {
            record.state = JobState::Failed;
            record.terminal_at = Some(Utc::now());
            record.lease_expires_at = None;
            record.worker = None;
            self.put_record(&record)?;
            warn!(job_id = %id, attempt = record.attempt, cause, "job moved to terminal failed state");
        }

        Ok(())
    }

    pub fn metrics(&self) -> Result<QueueMetrics> {
        let mut metrics = QueueMetrics::default();
        let now = Utc::now();

        for item in self.jobs.iter() {
            let (_, value) = item?;
            let record: JobRecord = serde_json::from_slice(&value)?;
            metrics.total += 1;
            match record.state {
                JobState::Active => metrics.active += 1,
                JobState::Completed => metrics.completed += 1,
                JobState::Failed => metrics.failed += 1,
                JobState::Waiting if record.not_before > now => metrics.delayed += 1,
                JobState::Waiting => metrics.waiting += 1,
            }
        }

        Ok(metrics)
    }

    /// Retention sweep (spec §4.2): keeps at most `COMPLETED_RETENTION_MAX`
    /// completed jobs no older than `COMPLETED_RETENTION`, and drops failed
    /// jobs once they pass `FAILED_RETENTION`. Mirrors the state store's own
    /// `prune_expired` TTL sweep; called from the same background task.
    pub async fn prune_retention(&self, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut completed = Vec::new();
        let mut stale_failed = Vec::new();

        for item in self.jobs.iter() {
            let (key, value) = item?;
            let record: JobRecord = serde_json::from_slice(&value)?;
            match record.state {
                JobState::Completed => completed.push((key, record)),
                JobState::Failed => {
                    let past_retention = record
                        .terminal_at
                        .map(|at| now - at > FAILED_RETENTION)
                        .unwrap_or(false);
                    if past_retention {
                        stale_failed.push(key);
                    }
                }
                JobState::Waiting | JobState::Active => {}
            }
        }

        completed.sort_by_key(|(_, record)| std::cmp::Reverse(record.terminal_at));

        let mut stale_completed = Vec::new();
        for (index, (key, record)) in completed.into_iter().enumerate() {
            let past_retention = record
                .terminal_at
                .map(|at| now - at > COMPLETED_RETENTION)
                .unwrap_or(true);
            if past_retention || index >= COMPLETED_RETENTION_MAX {
                stale_completed.push(key);
            }
        }

        let pruned = stale_completed.len() + stale_failed.len();
        for key in stale_completed.into_iter().chain(stale_failed) {
            self.jobs.remove(key)?;
        }

        if pruned > 0 {
            debug!(pruned, "pruned queue jobs past retention window");
        }

        Ok(pruned)
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.jobs.len()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn sample_tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount: Decimal::new(1000, 2),
            currency: "USD".to_string(),
            description: "test".to_string(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    fn open_queue() -> (WorkQueue, TempDir) {
        let dir = TempDir::new().unwrap();
        let queue = WorkQueue::open(dir.path().join("queue"), "transactions", 5, 1, 30).unwrap();
        (queue, dir)
    }

    #[tokio::test]
    async fn enqueue_then_reserve_returns_job() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();

        let job = queue.reserve("worker-a").await.unwrap().unwrap();
        assert_eq!(job.id, "tx-1");
        assert_eq!(job.attempt, 0);
    }

    #[tokio::test]
    async fn duplicate_enqueue_while_active_is_noop() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();

        let outcome = queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyQueued);
    }

    #[tokio::test]
    async fn reserve_is_exclusive() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();

        let first = queue.reserve("worker-a").await.unwrap();
        assert!(first.is_some());
        let second = queue.reserve("worker-b").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn ack_retires_job_as_completed() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();

        queue.ack("tx-1").await.unwrap();
        assert!(queue.reserve("worker-a").await.unwrap().is_none());

        let metrics = queue.metrics().unwrap();
        assert_eq!(metrics.completed, 1);

        // A completed job is retained (spec §4.2), not deleted outright.
        let outcome = queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn nack_retryable_reschedules_with_backoff() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        let job = queue.reserve("worker-a").await.unwrap().unwrap();
        assert_eq!(job.attempt, 0);

        queue.nack("tx-1", true, "network timeout").await.unwrap();

        let metrics = queue.metrics().unwrap();
        assert_eq!(metrics.delayed, 1);
        assert_eq!(metrics.waiting, 0);
    }

    #[tokio::test]
    async fn nack_exhausting_retries_moves_to_failed() {
        let dir = TempDir::new().unwrap();
        let queue = WorkQueue::open(dir.path().join("queue"), "transactions", 1, 1, 30).unwrap();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();

        queue.nack("tx-1", true, "permanent").await.unwrap();

        let metrics = queue.metrics().unwrap();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.waiting, 0);
        assert_eq!(metrics.delayed, 0);
    }

    #[tokio::test]
    async fn nack_non_retryable_moves_to_failed_immediately() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();

        queue.nack("tx-1", false, "bad payload").await.unwrap();

        let metrics = queue.metrics().unwrap();
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test]
    async fn enqueue_after_terminal_failure_creates_fresh_job() {
        let dir = TempDir::new().unwrap();
        let queue = WorkQueue::open(dir.path().join("queue"), "transactions", 1, 1, 30).unwrap();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();
        queue.nack("tx-1", true, "permanent").await.unwrap();

        let outcome = queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Enqueued);

        let job = queue.reserve("worker-a").await.unwrap().unwrap();
        assert_eq!(job.attempt, 0);
    }

    #[tokio::test]
    async fn prune_retention_evicts_stale_completed_and_failed_jobs() {
        let (queue, _dir) = open_queue();

        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();
        queue.ack("tx-1").await.unwrap();

        let dir2 = TempDir::new().unwrap();
        let failing_queue = WorkQueue::open(dir2.path().join("queue"), "transactions", 1, 1, 30).unwrap();
        failing_queue.enqueue("tx-2", sample_tx("tx-2")).await.unwrap();
        failing_queue.reserve("worker-a").await.unwrap();
        failing_queue
            .nack("tx-2", true, "permanent")
            .await
            .unwrap();

        let far_future = Utc::now() + ChronoDuration::hours(2);
        let pruned = queue.prune_retention(far_future).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(queue.metrics().unwrap().completed, 0);

        let far_future_failed = Utc::now() + ChronoDuration::hours(25);
        let pruned_failed = failing_queue.prune_retention(far_future_failed).await.unwrap();
        assert_eq!(pruned_failed, 1);
        assert_eq!(failing_queue.metrics().unwrap().failed, 0);
    }

    #[tokio::test]
    async fn prune_retention_keeps_fresh_terminal_jobs() {
        let (queue, _dir) = open_queue();
        queue.enqueue("tx-1", sample_tx("tx-1")).await.unwrap();
        queue.reserve("worker-a").await.unwrap();
        queue.ack("tx-1").await.unwrap();

        let pruned = queue.prune_retention(Utc::now()).await.unwrap();
        assert_eq!(pruned, 0);
        assert_eq!(queue.metrics().unwrap().completed, 1);
    }
}
