pub mod error;
pub mod partitions;
pub mod store;

pub use error::{QueueError, Result};
pub use store::{
    EnqueueOutcome, QueueJob, QueueMetrics, WorkQueue, COMPLETED_RETENTION,
    COMPLETED_RETENTION_MAX, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_LEASE_SECS, DEFAULT_MAX_RETRIES,
    FAILED_RETENTION,
};
