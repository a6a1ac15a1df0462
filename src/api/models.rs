//! Wire types for the transaction ingestion API.
//!
//! A [`Transaction`] is the client-submitted intent; it is immutable once
//! accepted. A [`TransactionState`] is the mutable record the gateway
//! maintains in the state store while it drives the transaction to a
//! terminal outcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client-submitted transaction intent (spec §3).
///
/// `id` is client-chosen and opaque; it is the idempotency key for the
/// whole system.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transaction {
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Status of a transaction as tracked by the state store.
///
/// Transitions follow `Pending -> Processing -> {Completed, Failed}`, with
/// `Processing -> Processing` permitted only as a retry loop. No transition
/// leaves `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }
}

/// The mutable, per-id record owned by the state store (spec §3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionState {
    pub id: String,
    pub status: TransactionStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransactionState {
    pub fn new_pending(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: TransactionStatus::Pending,
            submitted_at: now,
            updated_at: now,
            completed_at: None,
            retry_count: 0,
            error: None,
        }
    }
}

/// Response body for `POST /api/transactions` and `GET /api/transactions/{id}`
/// (spec §6: the richer shape with `submittedAt`/`completedAt`, per the
/// Open Question in spec §9).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStateResponse {
    pub id: String,
    pub status: TransactionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl TransactionStateResponse {
    pub fn from_state(state: &TransactionState, message: Option<&'static str>) -> Self {
        Self {
            id: state.id.clone(),
            status: state.status,
            submitted_at: state.submitted_at,
            completed_at: state.completed_at,
            retry_count: state.retry_count,
            error: state.error.clone(),
            message,
        }
    }
}

/// A single field-level validation issue (spec §4.1, `400` response body).
#[derive(Debug, Clone, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrorResponse {
    pub error: &'static str,
    pub details: Vec<FieldIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServicesHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicesHealth {
    pub store: ComponentHealth,
    pub queue: QueueHealth,
    pub metrics: crate::observability::MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub status: &'static str,
    pub metrics: crate::queue::QueueMetrics,
}
