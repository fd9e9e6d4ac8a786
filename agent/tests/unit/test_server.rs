//! Local status API tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use http::{Request, StatusCode};
use tokio::net::TcpListener;
use tower::ServiceExt;

use lockagent::errors::AgentError;
use lockagent::installer::install::{activate_device, deactivate_device};
use lockagent::models::lock::{CommandKind, LockState, Outcome};
use lockagent::server::handlers::{lock_handler, sync_handler};
use lockagent::server::serve::router;
use lockagent::server::state::ServerState;
use lockagent::storage::layout::StorageLayout;
use lockagent::storage::settings::Settings;

use crate::fakes::{activated_state, report, Harness, IDENTITY, START_MILLIS};

/// Serve the harness engine on an ephemeral port
async fn serve_agent(h: &Harness) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = router(Arc::new(ServerState::new(h.reconciler.clone())));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// Storage layout whose settings point the CLI at `port`
async fn cli_layout(port: u16) -> (tempfile::TempDir, StorageLayout) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    layout.setup().await.unwrap();
    let settings = Settings {
        server_port: port,
        ..Default::default()
    };
    layout.settings_file().write_json_atomic(&settings).await.unwrap();
    (tmp, layout)
}

#[tokio::test]
async fn test_lock_endpoint_reflects_state() {
    let h = Harness::activated();
    h.reconciler
        .reconcile(IDENTITY, report(CommandKind::Lock, "Pay EMI"))
        .await;

    let state = Arc::new(ServerState::new(h.reconciler.clone()));
    let response = lock_handler(State(state)).await.unwrap().0;

    assert!(response.activated);
    assert!(response.locked);
    assert!(response.lockdown_active);
    assert_eq!(response.lock_message, "Pay EMI");
    assert_eq!(response.last_acked_command.as_deref(), Some("lock"));
    assert!(!response.reset_pending);
}

#[tokio::test]
async fn test_lock_endpoint_before_activation() {
    let h = Harness::new();

    let state = Arc::new(ServerState::new(h.reconciler.clone()));
    let response = lock_handler(State(state)).await.unwrap().0;
    assert!(!response.activated);
    assert!(!response.locked);
}

#[tokio::test]
async fn test_sync_endpoint_runs_a_cycle() {
    let h = Harness::activated();
    h.status.set_report(report(CommandKind::Lock, "Pay EMI"));

    let state = Arc::new(ServerState::new(h.reconciler.clone()));
    let response = sync_handler(State(state)).await.0;
    assert_eq!(response.outcome, "applied");
    assert!(h.state().await.lock.locked);
}

#[tokio::test]
async fn test_router_serves_health_and_lock() {
    let h = Harness::activated();
    let app = router(Arc::new(ServerState::new(h.reconciler.clone())));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/lock").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Sync is POST only
    let response = app
        .oneshot(Request::builder().uri("/sync").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_cli_deactivate_waits_for_the_running_cycle() {
    let h = Harness::with_state(activated_state(LockState {
        locked: true,
        ..Default::default()
    }));
    *h.lockdown.delay.lock().unwrap() = Some(Duration::from_millis(500));
    let port = serve_agent(&h).await;
    let (_tmp, layout) = cli_layout(port).await;

    let reconciler = h.reconciler.clone();
    let cycle = tokio::spawn(async move {
        reconciler
            .reconcile(IDENTITY, report(CommandKind::Unlock, ""))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    deactivate_device(&layout).await.unwrap();
    assert_eq!(cycle.await.unwrap().outcome, Outcome::Applied);

    // The cycle's final save cannot bring the identity back
    let state = h.state().await;
    assert!(state.identity.is_none());
    assert!(!state.lock.locked);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_cli_activate_goes_through_the_running_agent() {
    let h = Harness::new();
    let port = serve_agent(&h).await;
    let (_tmp, layout) = cli_layout(port).await;

    let mut cli_args = HashMap::new();
    cli_args.insert("key".to_string(), "XYZ999".to_string());
    let identity = activate_device(&layout, &cli_args).await.unwrap();
    assert_eq!(identity.key, "XYZ999");
    assert_eq!(identity.activated_at_millis, START_MILLIS);
    assert_eq!(h.state().await.identity_key(), Some("XYZ999"));

    cli_args.insert("key".to_string(), "OTHER1".to_string());
    let err = activate_device(&layout, &cli_args).await.unwrap_err();
    assert!(matches!(err, AgentError::ServerError(ref msg) if msg.contains("409")));
    assert_eq!(h.state().await.identity_key(), Some("XYZ999"));
}

#[tokio::test]
async fn test_router_activation_endpoints() {
    let h = Harness::new();
    let app = router(Arc::new(ServerState::new(h.reconciler.clone())));

    let response = app
        .clone()
        .oneshot(
            Request::post("/activate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"key":"ABC123"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.state().await.identity_key(), Some("ABC123"));

    let response = app
        .oneshot(Request::post("/deactivate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.state().await.identity_key(), None);
}
