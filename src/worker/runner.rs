//! The posting protocol (spec §4.3) — the heart of the exactly-once-effect
//! guarantee.
//!
//! Control flow that would otherwise live in catch blocks around the GET
//! and POST calls is instead an explicit tagged outcome per step, matching
//! how this codebase prefers a typed result over exceptions at a
//! worker/queue boundary.

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::api::models::{TransactionState, TransactionStatus};
use crate::posting::{PostOutcome, PostingClient, PostingError};
use crate::queue::{QueueJob, WorkQueue};
use crate::state_store::StateStore;

/// Outcome of driving a single reserved job through the posting protocol.
/// The worker pool turns this into the matching queue ack/nack call.
#[derive(Debug)]
pub enum JobOutcome {
    /// The downstream holds the record; the job is done.
    Completed,
    /// The attempt failed without downstream confirmation and a retry
    /// budget remains; redeliver after backoff.
    RetryPreWrite(String),
    /// The attempt failed, no downstream confirmation, and the retry
    /// budget is exhausted; the job will not be redelivered.
    TerminalFailure(String),
}

/// Non-retryable backstop: a POST-before-GET duplicate source of truth.
/// The queue's own `max_retries` cap is the authoritative backstop; this
/// value only needs to agree with it so the two layers never disagree
/// about whether a given attempt was the last one.
fn is_last_attempt(job: &QueueJob, max_retries: u32) -> bool {
    job.attempt + 1 >= max_retries
}

/// Runs steps 1-5 of the posting protocol for one reserved job. Steps are
/// strictly sequential for this job; the queue already guarantees no other
/// worker holds the same id concurrently.
#[instrument(skip(state_store, posting), fields(job_id = %job.id, attempt = job.attempt))]
pub async fn process_job(
    job: &QueueJob,
    state_store: &StateStore,
    posting: &PostingClient,
    backoff_base_secs: u64,
    max_retries: u32,
) -> JobOutcome {
    // Step 1: enter `processing`.
    let mut state = match state_store.get(&job.id) {
        Ok(Some(existing)) => existing,
        Ok(None) => TransactionState::new_pending(job.id.clone(), Utc::now()),
        Err(err) => {
            warn!(job_id = %job.id, error = %err, "state store read failed while entering processing");
            TransactionState::new_pending(job.id.clone(), Utc::now())
        }
    };
    state.status = TransactionStatus::Processing;
    state.retry_count = job.attempt;
    state.updated_at = Utc::now();
    if let Err(err) = state_store.put(state.clone()) {
        warn!(job_id = %job.id, error = %err, "failed to persist processing state");
    }

    // Step 2: GET-before-POST.
    match posting.get(&job.id).await {
        Ok(PostOutcome::Present) => {
            return complete(state, state_store);
        }
        Ok(PostOutcome::Absent) => {}
        Err(err) => {
            return retry_or_fail(job, state, state_store, max_retries, format!("GET failed: {err}"));
        }
    }

    // Step 3: POST.
    if let Err(post_err) = posting.post(&job.payload).await {
        // Step 4: post-failure verification.
        let wait = backoff_base_secs.saturating_mul(2u64.saturating_pow(job.attempt));
        tokio::time::sleep(std::time::Duration::from_secs(wait)).await;

        match posting.get(&job.id).await {
            Ok(PostOutcome::Present) => {
                info!(job_id = %job.id, "post-write failure confirmed, record exists downstream");
                return complete(state, state_store);
            }
            Ok(PostOutcome::Absent) => {
                return retry_or_fail(
                    job,
                    state,
                    state_store,
                    max_retries,
                    format!("POST failed: {post_err}"),
                );
            }
            Err(verify_err) => {
                return retry_or_fail(
                    job,
                    state,
                    state_store,
                    max_retries,
                    format!("verification GET failed: {verify_err}"),
                );
            }
        }
    }

    complete(state, state_store)
}

fn complete(mut state: TransactionState, state_store: &StateStore) -> JobOutcome {
    let now = Utc::now();
    state.status = TransactionStatus::Completed;
    state.completed_at = Some(now);
    state.updated_at = now;
    state.error = None;
    if let Err(err) = state_store.put(state) {
        warn!(error = %err, "failed to persist completed state");
    }
    JobOutcome::Completed
}

fn retry_or_fail(
    job: &QueueJob,
    mut state: TransactionState,
    state_store: &StateStore,
    max_retries: u32,
    cause: String,
) -> JobOutcome {
    let now = Utc::now();

    if is_last_attempt(job, max_retries) {
        state.status = TransactionStatus::Failed;
        state.error = Some(format!("max retries exceeded: {cause}"));
        state.retry_count = job.attempt + 1;
        state.completed_at = Some(now);
        state.updated_at = now;
        if let Err(err) = state_store.put(state) {
            warn!(error = %err, "failed to persist terminal failed state");
        }
        JobOutcome::TerminalFailure(cause)
    } else {
        state.status = TransactionStatus::Processing;
        state.retry_count = job.attempt + 1;
        state.error = Some(cause.clone());
        state.updated_at = now;
        if let Err(err) = state_store.put(state) {
            warn!(error = %err, "failed to persist retry state");
        }
        JobOutcome::RetryPreWrite(cause)
    }
}

/// Applies a [`JobOutcome`] to the queue: ack on completion, nack with the
/// appropriate retryability otherwise.
pub async fn apply_outcome(queue: &WorkQueue, job_id: &str, outcome: &JobOutcome) {
    let result = match outcome {
        JobOutcome::Completed => queue.ack(job_id).await,
        JobOutcome::RetryPreWrite(cause) => queue.nack(job_id, true, cause).await,
        JobOutcome::TerminalFailure(cause) => queue.nack(job_id, false, cause).await,
    };

    if let Err(err) = result {
        warn!(job_id, error = %err, "failed to update queue after processing job");
    }
}
