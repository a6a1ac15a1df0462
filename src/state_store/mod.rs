pub mod error;
pub mod partitions;
pub mod store;

pub use error::{Result, StateStoreError};
pub use store::{CreateOutcome, StateStore, DEFAULT_TTL};
