use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration (spec §6).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub posting: PostingSettings,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration (spec §6: `server.port/host/timeout`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub api: ApiLimits,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            api: ApiLimits::default(),
        }
    }
}

/// API request limits (ambient addition, spec §5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MiB
}

/// Embedded-store backend configuration (spec §6: `store.{host, port,
/// password}` is reinterpreted here as on-disk paths, since the store is
/// an embedded engine rather than a network service).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            queue_path: default_queue_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state")
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

/// Work queue configuration (spec §6: `queue.name`,
/// `queue.workerConcurrency`, `queue.maxRetries`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            worker_concurrency: default_worker_concurrency(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_queue_name() -> String {
    "transactions".to_string()
}

fn default_worker_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_lease_secs() -> i64 {
    30
}

/// Downstream posting service configuration (spec §6: `posting.url`,
/// `posting.timeout`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostingSettings {
    #[serde(default = "default_posting_url")]
    pub url: String,
    #[serde(default = "default_posting_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_posting_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            url: default_posting_url(),
            timeout_secs: default_posting_timeout_secs(),
            connect_timeout_secs: default_posting_connect_timeout_secs(),
        }
    }
}

fn default_posting_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_posting_timeout_secs() -> u64 {
    10
}

fn default_posting_connect_timeout_secs() -> u64 {
    5
}

/// Retention configuration for the state store's TTL (spec §4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_state_ttl_hours")]
    pub state_ttl_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            state_ttl_hours: default_state_ttl_hours(),
        }
    }
}

fn default_state_ttl_hours() -> u32 {
    24
}

/// Telemetry configuration (ambient addition, spec §5's metrics surface).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            posting: PostingSettings::default(),
            retention: RetentionConfig::default(),
            telemetry: TelemetryConfig::default(),
        };

        assert_eq!(config.server.bind_addr().unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.api.max_payload_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.queue.worker_concurrency, 10);
        assert_eq!(config.queue.max_retries, 5);
    }
}
