use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("queue.max_retries must be at least 1, got {0}")]
    MaxRetriesTooLow(u32),

    #[error("queue.worker_concurrency must be at least 1, got {0}")]
    WorkerConcurrencyTooLow(usize),

    #[error("posting.url must not be empty")]
    EmptyPostingUrl,

    #[error("posting.url is not a valid URL: {0}")]
    InvalidPostingUrl(String),

    #[error("retention.state_ttl_hours must be positive")]
    InvalidRetentionTtl,

    #[error("server.host:port is not a valid socket address: {0}")]
    InvalidBindAddr(String),
}

/// Startup config validation (spec §6's supplemented bounds-checks): fail
/// fast with a descriptive error rather than misbehaving at runtime.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.queue.max_retries < 1 {
        return Err(ValidationError::MaxRetriesTooLow(config.queue.max_retries));
    }

    if config.queue.worker_concurrency < 1 {
        return Err(ValidationError::WorkerConcurrencyTooLow(
            config.queue.worker_concurrency,
        ));
    }

    if config.posting.url.trim().is_empty() {
        return Err(ValidationError::EmptyPostingUrl);
    }

    if reqwest::Url::parse(&config.posting.url).is_err() {
        return Err(ValidationError::InvalidPostingUrl(config.posting.url.clone()));
    }

    if config.retention.state_ttl_hours == 0 {
        return Err(ValidationError::InvalidRetentionTtl);
    }

    config
        .server
        .bind_addr()
        .map_err(|e| ValidationError::InvalidBindAddr(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: Default::default(),
            store: Default::default(),
            queue: Default::default(),
            posting: Default::default(),
            retention: Default::default(),
            telemetry: Default::default(),
        }
    }

    #[test]
    fn accepts_default_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn rejects_zero_max_retries() {
        let mut config = valid_config();
        config.queue.max_retries = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MaxRetriesTooLow(0))
        ));
    }

    #[test]
    fn rejects_zero_worker_concurrency() {
        let mut config = valid_config();
        config.queue.worker_concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::WorkerConcurrencyTooLow(0))
        ));
    }

    #[test]
    fn rejects_empty_posting_url() {
        let mut config = valid_config();
        config.posting.url = "   ".to_string();
        assert!(matches!(validate(&config), Err(ValidationError::EmptyPostingUrl)));
    }

    #[test]
    fn rejects_malformed_posting_url() {
        let mut config = valid_config();
        config.posting.url = "not a url".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPostingUrl(_))
        ));
    }

    #[test]
    fn rejects_zero_retention_ttl() {
        let mut config = valid_config();
        config.retention.state_ttl_hours = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidRetentionTtl)));
    }
}
