//! Client for the downstream "posting service" (spec §4.4).
//!
//! The posting service's own API is not idempotent: a second POST for the
//! same transaction may create a duplicate record. This client therefore
//! never retries a request itself — the worker pool in [`crate::worker`] is
//! the only place that decides whether and when to retry, since only it
//! knows whether a retry is safe (a GET has confirmed no record exists).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::api::models::Transaction;

use super::error::{PostingError, Result};

#[derive(Debug, Clone)]
pub struct PostingConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of [`PostingClient::get`] — the "does the downstream already have
/// this record" check used both before posting and to verify an ambiguous
/// POST failure (spec §4.3 steps 2 and 4).
#[derive(Debug, Clone)]
pub enum PostOutcome {
    /// The downstream holds a record for this transaction id.
    Present,
    /// The downstream has no record for this transaction id.
    Absent,
}

/// Thin wrapper over a shared `reqwest::Client`, built once at the
/// composition root and handed to every worker (spec §4.4's ambient
/// addition).
pub struct PostingClient {
    client: Client,
    base_url: String,
}

impl PostingClient {
    pub fn new(config: PostingConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PostingError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// `GET /transactions/{id}` against the downstream service. A single
    /// attempt, no retry: this call's result is itself the thing a retry
    /// decision hinges on.
    pub async fn get(&self, id: &str) -> Result<PostOutcome> {
        let url = format!("{}/transactions/{}", self.base_url, id);
        debug!(id, "checking downstream for existing record");

        let response = self.client.get(&url).send().await.map_err(classify)?;

        match response.status() {
            StatusCode::OK => Ok(PostOutcome::Present),
            StatusCode::NOT_FOUND => Ok(PostOutcome::Absent),
            status => Err(PostingError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// `POST /transactions` against the downstream service. A single
    /// attempt; the caller is responsible for deciding whether an error is
    /// safe to retry.
    pub async fn post(&self, tx: &Transaction) -> Result<()> {
        let url = format!("{}/transactions", self.base_url);

        debug!(id = %tx.id, "posting transaction to downstream");

        // Body equals the Transaction (spec §6): the downstream expects the
        // whole submitted intent, metadata and timestamp included, not just
        // the fields this client happens to care about.
        let response = self
            .client
            .post(&url)
            .json(tx)
            .send()
            .await
            .map_err(classify)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PostingError::UnexpectedStatus(response.status().as_u16()))
        }
    }
}

fn classify(err: reqwest::Error) -> PostingError {
    if err.is_timeout() {
        PostingError::Timeout
    } else if err.is_connect() {
        PostingError::RequestFailed(format!("connection failed: {}", err))
    } else {
        PostingError::RequestFailed(err.to_string())
    }
}
