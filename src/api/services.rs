//! HTTP handlers for the transaction ingestion API (spec §4.1).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::error::ApiError;
use super::models::{
    ComponentHealth, HealthResponse, QueueHealth, ServicesHealth, Transaction,
    TransactionStateResponse,
};
use super::state::AppState;
use crate::api::models::TransactionState;
use crate::queue::QueueMetrics;
use crate::state_store::CreateOutcome;

/// `POST /api/transactions` (spec §4.1).
///
/// Guarantees that after this call returns, either the transaction is
/// durably enqueued with a `pending` state record, an existing outcome is
/// surfaced, or the caller sees a validation/server error having had
/// nothing accepted.
pub async fn submit_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".to_string()))?;
    super::utils::parse_content_type(content_type)?;

    let max_payload_bytes = state.config.server.api.max_payload_bytes.as_u64() as usize;
    super::utils::validate_body_size(&body, max_payload_bytes)?;

    let tx: Transaction = serde_json::from_slice(&body)?;
    super::validation::validate_transaction(&tx)?;

    if let Some(existing) = state
        .store
        .get(&tx.id)
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))?
    {
        if existing.status.is_terminal() {
            let response = TransactionStateResponse::from_state(&existing, Some("already processed"));
            return Ok((StatusCode::OK, Json(response)));
        }
    }

    let pending = TransactionState::new_pending(tx.id.clone(), Utc::now());
    let outcome = state
        .store
        .create_if_absent(pending)
        .await
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))?;

    let (record, freshly_created) = match outcome {
        CreateOutcome::Created(record) => (record, true),
        CreateOutcome::AlreadyExists(record) => (record, false),
    };

    if record.status.is_terminal() {
        let response = TransactionStateResponse::from_state(&record, Some("already processed"));
        return Ok((StatusCode::OK, Json(response)));
    }

    if freshly_created {
        state
            .queue
            .enqueue(&tx.id, tx)
            .await
            .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;
        state.metrics.transaction_accepted();
    }

    let message = if freshly_created { None } else { Some("already queued") };
    let response = TransactionStateResponse::from_state(&record, message);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `GET /api/transactions/{id}` (spec §4.1).
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get(&id)
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(id))?;

    Ok(Json(TransactionStateResponse::from_state(&record, None)))
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub prefix: String,
}

/// `GET /api/admin/transactions?prefix=` — bounded operational listing
/// backing the state store's `scan` (spec §4.5). Diagnostics only; never
/// called on the ingestion or worker hot paths.
pub async fn admin_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .store
        .scan(&query.prefix)
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))?;

    let responses: Vec<TransactionStateResponse> = records
        .iter()
        .map(|record| TransactionStateResponse::from_state(record, None))
        .collect();

    Ok(Json(responses))
}

/// `GET /api/health`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.health_check() {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let (queue_status, metrics) = match state.queue.metrics() {
        Ok(metrics) => ("healthy", metrics),
        Err(_) => ("unhealthy", QueueMetrics::default()),
    };

    let healthy = store_status == "healthy" && queue_status == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        services: ServicesHealth {
            store: ComponentHealth { status: store_status },
            queue: QueueHealth {
                status: queue_status,
                metrics,
            },
            metrics: state.metrics.snapshot(),
        },
    };

    (status_code, Json(response))
}
