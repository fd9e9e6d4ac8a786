//! HTTP status client tests against a local stub backend

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use openapi_client::models::{AckRequest, StatusResponse, TelemetryRequest};
use tokio::net::TcpListener;

use lockagent::clock::ManualClock;
use lockagent::engine::dispatcher::Dispatcher;
use lockagent::engine::reconciler::Reconciler;
use lockagent::engine::EngineOptions;
use lockagent::errors::AgentError;
use lockagent::http::client::HttpClient;
use lockagent::http::status::StatusClientExt;
use lockagent::models::lock::{CommandKind, DeviceStatus, LockState, Outcome};
use lockagent::storage::store::MemoryStore;
use lockagent::telemetry::{NetworkType, TelemetrySnapshot};

use crate::fakes::{activated_state, FakeAlerter, FakeLockdown, IDENTITY, START_MILLIS};

#[derive(Default)]
struct Backend {
    acks: Mutex<Vec<AckRequest>>,
    updates: Mutex<Vec<TelemetryRequest>>,
}

async fn status(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "BROKEN" => (StatusCode::INTERNAL_SERVER_ERROR, "database down").into_response(),
        "GARBAGE" => "not json".into_response(),
        "SLOW" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(StatusResponse::default()).into_response()
        }
        "odd/key?x=1#frag" => Json(StatusResponse {
            status: "active".to_string(),
            command: Some("find".to_string()),
            lock_message: None,
        })
        .into_response(),
        "IDLE" => Json(StatusResponse {
            status: "active".to_string(),
            command: None,
            lock_message: None,
        })
        .into_response(),
        _ => Json(StatusResponse {
            status: "locked".to_string(),
            command: Some("lock".to_string()),
            lock_message: Some("Pay EMI".to_string()),
        })
        .into_response(),
    }
}

async fn update(
    State(backend): State<Arc<Backend>>,
    Json(body): Json<TelemetryRequest>,
) -> StatusCode {
    backend.updates.lock().unwrap().push(body);
    StatusCode::OK
}

async fn ack(State(backend): State<Arc<Backend>>, Json(body): Json<AckRequest>) -> StatusCode {
    if body.device_key == "NOACK" {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    backend.acks.lock().unwrap().push(body);
    StatusCode::OK
}

async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/device/status/{id}", get(status))
        .route("/device/update", post(update))
        .route("/device/ack", post(ack))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn client(backend: Arc<Backend>) -> HttpClient {
    let base = spawn_backend(backend).await;
    HttpClient::new(&base, Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn test_fetch_status_decodes_report() {
    let backend = Arc::new(Backend::default());
    let client = client(backend).await;

    let report = client.fetch_status(IDENTITY).await.unwrap();
    assert_eq!(report.status, DeviceStatus::Locked);
    assert_eq!(report.command, CommandKind::Lock);
    assert_eq!(report.lock_message, "Pay EMI");

    let idle = client.fetch_status("IDLE").await.unwrap();
    assert_eq!(idle.status, DeviceStatus::Active);
    assert!(idle.command.is_none());
    assert!(idle.lock_message.is_empty());
}

#[tokio::test]
async fn test_identity_is_a_single_path_segment() {
    let backend = Arc::new(Backend::default());
    let client = client(backend).await;

    let report = client.fetch_status("odd/key?x=1#frag").await.unwrap();
    assert_eq!(report.command, CommandKind::Find);
}

#[tokio::test]
async fn test_fetch_status_error_taxonomy() {
    let backend = Arc::new(Backend::default());
    let client = client(backend).await;

    let err = client.fetch_status("BROKEN").await.unwrap_err();
    assert!(matches!(err, AgentError::ServerError(ref msg) if msg.contains("database down")));

    let err = client.fetch_status("GARBAGE").await.unwrap_err();
    assert!(matches!(err, AgentError::ServerError(_)));

    let err = client.fetch_status("SLOW").await.unwrap_err();
    assert!(matches!(err, AgentError::Unreachable(_)));
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();
    let err = client.fetch_status(IDENTITY).await.unwrap_err();
    assert!(matches!(err, AgentError::Unreachable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_acknowledge_and_telemetry_bodies() {
    let backend = Arc::new(Backend::default());
    let client = client(backend.clone()).await;

    client.acknowledge(IDENTITY, &CommandKind::Reminder).await.unwrap();
    let err = client.acknowledge("NOACK", &CommandKind::Lock).await.unwrap_err();
    assert!(matches!(err, AgentError::AckFailure(_)));

    let snapshot = TelemetrySnapshot {
        battery_level: Some(81),
        network_type: NetworkType::Wifi,
        timestamp_millis: START_MILLIS,
        hostname: "tablet-7".to_string(),
        uptime_secs: 3600,
        locked: true,
    };
    client.send_telemetry(IDENTITY, &snapshot).await.unwrap();

    let acks = backend.acks.lock().unwrap().clone();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].device_key, IDENTITY);
    assert_eq!(acks[0].command, "reminder");

    let updates = backend.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].battery_level, Some(81));
    assert_eq!(updates[0].network_type, "wifi");
    assert_eq!(updates[0].timestamp, START_MILLIS);
}

#[tokio::test]
async fn test_poll_cycle_end_to_end() {
    let backend = Arc::new(Backend::default());
    let client = Arc::new(client(backend.clone()).await);

    let store = Arc::new(MemoryStore::with_state(activated_state(LockState::default())));
    let lockdown = Arc::new(FakeLockdown::default());
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let options = EngineOptions {
        send_telemetry: false,
        ..Default::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        lockdown.clone(),
        Arc::new(FakeAlerter::default()),
        clock.clone(),
        &options,
    ));
    let reconciler = Reconciler::new(store, dispatcher, client, clock, options);

    let first = reconciler.poll_cycle().await;
    assert_eq!(first.outcome, Outcome::Applied);
    let second = reconciler.poll_cycle().await;
    assert_eq!(second.outcome, Outcome::NoData);

    let state = reconciler.snapshot().await.unwrap();
    assert!(state.lock.locked);
    assert_eq!(state.lock.lock_message, "Pay EMI");
    assert_eq!(backend.acks.lock().unwrap().len(), 1);
    assert_eq!(lockdown.calls().len(), 1);
}
