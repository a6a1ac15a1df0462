pub mod client;
pub mod error;

pub use client::{PostOutcome, PostingClient, PostingConfig};
pub use error::{PostingError, Result};
