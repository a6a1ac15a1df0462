//! End-to-end scenarios for the posting protocol (spec §8): Submission
//! Service, durable queue, and worker pool wired together against a
//! mocked downstream posting service.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use txgateway::api::services::{get_status, health, submit_transaction};
use txgateway::api::state::AppState;
use txgateway::config::Config;
use txgateway::observability::Metrics;
use txgateway::posting::{PostingClient, PostingConfig};
use txgateway::queue::WorkQueue;
use txgateway::state_store::StateStore;
use txgateway::worker::{WorkerPool, WorkerPoolConfig};

struct System {
    app: Router,
    worker_pool: Option<WorkerPool>,
    downstream: MockServer,
    _dir: TempDir,
}

impl System {
    async fn shutdown(mut self) {
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown();
            pool.join().await;
        }
    }
}

async fn build_system(downstream: MockServer, max_retries: u32, backoff_base_secs: u64) -> System {
    let temp_dir = TempDir::new().unwrap();

    let store = Arc::new(StateStore::open(temp_dir.path().join("state")).unwrap());
    let queue = Arc::new(
        WorkQueue::open(
            temp_dir.path().join("queue"),
            "transactions",
            max_retries,
            backoff_base_secs,
            5,
        )
        .unwrap(),
    );
    let posting = Arc::new(
        PostingClient::new(PostingConfig {
            base_url: downstream.uri(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap(),
    );
    let metrics = Arc::new(Metrics::new());
    let config = Arc::new(Config::default());

    let worker_pool = WorkerPool::spawn(
        WorkerPoolConfig {
            concurrency: 4,
            backoff_base_secs,
            max_retries,
        },
        queue.clone(),
        store.clone(),
        posting.clone(),
        metrics.clone(),
    );

    let state = AppState::new(config, store, queue, posting, metrics);
    let app = Router::new()
        .route("/api/transactions", post(submit_transaction))
        .route("/api/transactions/{id}", get(get_status))
        .route("/api/health", get(health))
        .with_state(state);

    System {
        app,
        worker_pool: Some(worker_pool),
        downstream,
        _dir: temp_dir,
    }
}

fn sample_transaction(id: &str) -> Value {
    json!({
        "id": id,
        "amount": "19.99",
        "currency": "USD",
        "description": "order 42",
        "timestamp": "2025-01-01T00:00:00Z",
    })
}

async fn submit(app: &Router, tx: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri("/api/transactions")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&tx).unwrap()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Polls `GET /api/transactions/{id}` until `status` equals `target`, or
/// panics after `timeout`. Mirrors the liveness property in spec §8 (P2):
/// an accepted transaction eventually reaches a terminal status.
async fn wait_for_status(app: &Router, id: &str, target: &str, timeout: Duration) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let request = Request::builder()
            .uri(format!("/api/transactions/{id}"))
            .method("GET")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::OK {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            if value["status"] == target {
                return value;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {id} to reach status {target}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Scenario 1 (spec §8): happy path completes on the first attempt and
/// the downstream ends up with exactly one record.
#[tokio::test]
async fn happy_path_completes_with_single_downstream_post() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&downstream)
        .await;

    let system = build_system(downstream, 5, 1).await;

    let (status, body) = submit(&system.app, sample_transaction("t1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");

    let completed = wait_for_status(&system.app, "t1", "completed", Duration::from_secs(5)).await;
    assert_eq!(completed["id"], "t1");

    system.downstream.verify().await;
    system.shutdown().await;
}

/// Scenario 2 (spec §8): three quick submissions of the same id produce
/// exactly one downstream POST.
#[tokio::test]
async fn triple_submission_produces_single_downstream_post() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&downstream)
        .await;

    let system = build_system(downstream, 5, 1).await;

    for _ in 0..3 {
        let (status, _) = submit(&system.app, sample_transaction("t2")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    wait_for_status(&system.app, "t2", "completed", Duration::from_secs(5)).await;

    system.downstream.verify().await;
    system.shutdown().await;
}

/// Scenario 3 (spec §8): a record pre-seeded downstream out-of-band is
/// recognized by the GET-before-POST step, and no POST is ever issued.
#[tokio::test]
async fn pre_existing_downstream_record_completes_without_posting() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t3"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&downstream)
        .await;

    let system = build_system(downstream, 5, 1).await;

    submit(&system.app, sample_transaction("t3")).await;
    wait_for_status(&system.app, "t3", "completed", Duration::from_secs(2)).await;

    system.downstream.verify().await;
    system.shutdown().await;
}

/// Scenario 4 (spec §8): POST surfaces an error but the record is
/// actually visible on the next GET — the post-failure verification step
/// resolves this to `completed` without a retry storm.
#[tokio::test]
async fn post_write_failure_resolves_to_completed_via_verification() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t4"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&downstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/transactions/t4"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&downstream)
        .await;

    let system = build_system(downstream, 5, 1).await;

    submit(&system.app, sample_transaction("t4")).await;
    let completed = wait_for_status(&system.app, "t4", "completed", Duration::from_secs(5)).await;
    assert_eq!(completed["retryCount"], 0);

    system.downstream.verify().await;
    system.shutdown().await;
}

/// Scenario 5 (spec §8): POST genuinely fails twice (no downstream
/// write), then succeeds on the third attempt.
#[tokio::test]
async fn pre_write_failure_then_success_retries_and_completes() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t5"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&downstream)
        .await;

    let system = build_system(downstream, 5, 1).await;

    submit(&system.app, sample_transaction("t5")).await;
    let completed = wait_for_status(&system.app, "t5", "completed", Duration::from_secs(20)).await;
    assert!(completed["retryCount"].as_u64().unwrap() >= 2);

    system.shutdown().await;
}

/// Scenario 6 (spec §8): POST always fails with no record ever written.
/// After `max_retries` total attempts the transaction moves to `failed`
/// with no further redelivery.
#[tokio::test]
async fn persistent_failure_terminates_as_failed_after_max_retries() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/t6"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&downstream)
        .await;

    // max_retries = 2 keeps the exponential backoff short enough for a test.
    let system = build_system(downstream, 2, 1).await;

    submit(&system.app, sample_transaction("t6")).await;
    let failed = wait_for_status(&system.app, "t6", "failed", Duration::from_secs(20)).await;
    assert!(failed["error"]
        .as_str()
        .unwrap()
        .contains("max retries exceeded"));

    // No further redelivery: status stays `failed` after waiting past
    // where another retry would have landed.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let request = Request::builder()
        .uri("/api/transactions/t6")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = system.app.clone().oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "failed");

    system.shutdown().await;
}
