use std::sync::Arc;
use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Span};
use uuid::Uuid;

use super::{
    services::{admin_scan, get_status, health, submit_transaction},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::posting::{PostingClient, PostingConfig};
use crate::queue::WorkQueue;
use crate::state_store::StateStore;
use crate::worker::{WorkerPool, WorkerPoolConfig};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How often the background sweep checks the state store for expired
/// records (spec §4.5: TTL-driven cleanup, no active reconciliation).
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 15);

/// Composition root: wires State Store -> Queue -> Posting Client ->
/// Worker Pool -> Submission Service, leaves-first (spec §9's replacement
/// for the source's cyclic construction).
pub async fn run() -> Result<(), AnyError> {
    info!("loading configuration");
    let config = Config::load().map_err(|e| format!("failed to load config: {e}"))?;

    let state_ttl = chrono::Duration::hours(config.retention.state_ttl_hours as i64);
    let store = Arc::new(
        StateStore::open_with_ttl(&config.store.state_path, state_ttl)
            .map_err(|e| format!("failed to open state store: {e}"))?,
    );

    let queue = Arc::new(
        WorkQueue::open(
            &config.store.queue_path,
            &config.queue.name,
            config.queue.max_retries,
            config.queue.backoff_base_secs,
            config.queue.lease_secs,
        )
        .map_err(|e| format!("failed to open work queue: {e}"))?,
    );

    let posting = Arc::new(
        PostingClient::new(PostingConfig {
            base_url: config.posting.url.clone(),
            connect_timeout: Duration::from_secs(config.posting.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.posting.timeout_secs),
        })
        .map_err(|e| format!("failed to build posting client: {e}"))?,
    );

    let metrics = Arc::new(Metrics::new());

    let worker_pool = WorkerPool::spawn(
        WorkerPoolConfig {
            concurrency: config.queue.worker_concurrency,
            backoff_base_secs: config.queue.backoff_base_secs,
            max_retries: config.queue.max_retries,
        },
        queue.clone(),
        store.clone(),
        posting.clone(),
        metrics.clone(),
    );

    let bind_addr = config
        .server
        .bind_addr()
        .map_err(|e| format!("invalid server.host/server.port: {e}"))?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let prune_store = store.clone();
    let prune_queue = queue.clone();
    let prune_handle = tokio::spawn(async move {
        run_prune_sweep(prune_store, prune_queue).await;
    });

    let state = AppState::new(Arc::new(config), store, queue, posting, metrics);

    let app = Router::new()
        .route("/api/transactions", post(submit_transaction))
        .route("/api/transactions/{id}", get(get_status))
        .route("/api/health", get(health))
        .route("/api/admin/transactions", get(admin_scan))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let request_id = Uuid::new_v4();
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str);
                    info_span!(
                        "http_request",
                        %request_id,
                        method = %request.method(),
                        path = matched_path.unwrap_or(request.uri().path()),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                        info!(status = response.status().as_u16(), ?latency, "request completed");
                    },
                ),
        )
        .layer(TimeoutLayer::new(request_timeout));

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "txgateway listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, draining worker pool");
    worker_pool.shutdown();
    worker_pool.join().await;
    prune_handle.abort();

    Ok(())
}

/// Periodically removes state records past their TTL and queue jobs past
/// their retention window. Purely a housekeeping sweep: the design does
/// not otherwise reconcile state against the queue (spec §4.5, §4.2).
async fn run_prune_sweep(store: Arc<StateStore>, queue: Arc<WorkQueue>) {
    let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        ticker.tick().await;
        match store.prune_expired(Utc::now()) {
            Ok(pruned) if pruned > 0 => info!(pruned, "background TTL sweep pruned expired records"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "background TTL sweep failed"),
        }
        match queue.prune_retention(Utc::now()).await {
            Ok(pruned) if pruned > 0 => info!(pruned, "background sweep pruned retained queue jobs"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "background queue retention sweep failed"),
        }
    }
}

/// Graceful shutdown (spec §5): on SIGINT/SIGTERM, stop accepting new
/// connections and let in-flight requests and worker steps finish. Worker
/// steps are never cancelled mid-step, since that would undermine the
/// post-failure verification invariant in the posting protocol.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping new requests");
}
