use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostingError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid downstream URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, PostingError>;
