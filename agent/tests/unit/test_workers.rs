//! Poller and push worker tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lockagent::errors::AgentError;
use lockagent::models::lock::{CommandKind, Outcome, SkipReason};
use lockagent::mqtt::client::{MqttAddress, MqttMessage};
use lockagent::mqtt::topics::Topics;
use lockagent::workers::push::PushConnection;
use lockagent::workers::{poller, push};
use tokio::sync::{mpsc, oneshot};

use crate::fakes::{report, Harness, LockdownCall, IDENTITY};

fn message(topic: &str, payload: &str) -> MqttMessage {
    MqttMessage {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
    }
}

/// In-process broker handing out one channel per connection
#[derive(Default)]
struct FakeBroker {
    connections: Mutex<Vec<(String, mpsc::UnboundedSender<MqttMessage>)>>,
    disconnects: Arc<AtomicUsize>,
}

impl FakeBroker {
    fn connect(&self, identity: &str) -> Result<FakeConnection, AgentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().unwrap().push((identity.to_string(), tx));
        Ok(FakeConnection {
            inbox: rx,
            disconnects: self.disconnects.clone(),
        })
    }

    fn identities(&self) -> Vec<String> {
        self.connections.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Deliver on the most recent connection
    fn publish(&self, msg: MqttMessage) {
        let connections = self.connections.lock().unwrap();
        let (_, tx) = connections.last().unwrap();
        tx.send(msg).unwrap();
    }
}

struct FakeConnection {
    inbox: mpsc::UnboundedReceiver<MqttMessage>,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl PushConnection for FakeConnection {
    async fn subscribe_commands(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<MqttMessage>, AgentError> {
        match self.inbox.recv().await {
            Some(msg) => Ok(Some(msg)),
            None => std::future::pending::<Result<Option<MqttMessage>, AgentError>>().await,
        }
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_poller_polls_on_schedule() {
    let h = Harness::activated();
    h.status.set_report(report(CommandKind::Lock, "Pay EMI"));

    let options = poller::Options {
        interval: Duration::from_secs(300),
        initial_delay: Duration::from_secs(5),
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let reconciler = h.reconciler.clone();
    let handle = tokio::spawn(async move {
        poller::run(
            &options,
            reconciler.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.status.fetches.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.status.fetches.load(Ordering::SeqCst), 1);
    assert!(h.state().await.lock.locked);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.status.fetches.load(Ordering::SeqCst), 2);
    // Same command on the second poll is not re-applied
    assert_eq!(h.lockdown.count(LockdownCall::Apply), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_poller_keeps_going_after_failure() {
    let h = Harness::activated();
    h.status.fail_fetch.store(true, Ordering::SeqCst);

    let options = poller::Options {
        interval: Duration::from_secs(60),
        initial_delay: Duration::ZERO,
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let reconciler = h.reconciler.clone();
    let handle = tokio::spawn(async move {
        poller::run(
            &options,
            reconciler.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.state().await.last_error.is_some());

    h.status.fail_fetch.store(false, Ordering::SeqCst);
    h.status.set_report(report(CommandKind::Lock, ""));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.status.fetches.load(Ordering::SeqCst), 2);
    assert!(h.state().await.lock.locked);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_push_lock_is_applied() {
    let h = Harness::activated();

    let msg = message(
        &Topics::device_command(IDENTITY),
        r#"{"command":"lock","lockMessage":"Pay EMI"}"#,
    );
    let outcome = push::handle_message(&msg, IDENTITY, &h.reconciler).await.unwrap();
    assert_eq!(outcome.outcome, Outcome::Applied);

    let state = h.state().await;
    assert!(state.lock.locked);
    assert_eq!(state.lock.lock_message, "Pay EMI");
    assert_eq!(h.status.acks(), vec![CommandKind::Lock]);
}

#[tokio::test]
async fn test_push_and_poll_share_the_ack_guard() {
    let h = Harness::activated();

    let msg = message(&Topics::device_command(IDENTITY), r#"{"command":"lock"}"#);
    push::handle_message(&msg, IDENTITY, &h.reconciler).await.unwrap();

    // The poll later sees the same command
    h.status.set_report(report(CommandKind::Lock, ""));
    let polled = h.reconciler.poll_cycle().await;
    assert_eq!(polled.skipped, Some(SkipReason::StaleCommandIgnored));
    assert_eq!(h.lockdown.count(LockdownCall::Apply), 1);
}

#[tokio::test]
async fn test_push_ignores_foreign_and_malformed_messages() {
    let h = Harness::activated();

    let foreign = message(&Topics::device_command("XYZ999"), r#"{"command":"lock"}"#);
    assert!(push::handle_message(&foreign, IDENTITY, &h.reconciler).await.is_none());

    let wrong_topic = message("lockagent/device/ABC123/status", r#"{"command":"lock"}"#);
    assert!(push::handle_message(&wrong_topic, IDENTITY, &h.reconciler).await.is_none());

    let malformed = message(&Topics::device_command(IDENTITY), "lock");
    assert!(push::handle_message(&malformed, IDENTITY, &h.reconciler).await.is_none());

    assert!(!h.state().await.lock.locked);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_push_with_unknown_command_is_a_noop() {
    let h = Harness::activated();

    let msg = message(&Topics::device_command(IDENTITY), r#"{"command":"brick"}"#);
    let outcome = push::handle_message(&msg, IDENTITY, &h.reconciler).await.unwrap();
    assert_eq!(outcome.skipped, Some(SkipReason::NoCommand));
    assert!(h.status.acks().is_empty());
}

#[tokio::test]
async fn test_push_worker_without_broker_returns() {
    let h = Harness::activated();

    // Empty host disables the worker
    let options = push::Options::default();
    push::run(&options, &h.reconciler, Box::pin(std::future::pending::<()>())).await;
}

#[tokio::test(start_paused = true)]
async fn test_push_worker_follows_identity_changes() {
    let h = Harness::activated();
    let broker = Arc::new(FakeBroker::default());
    let options = push::Options {
        broker_address: MqttAddress {
            host: "broker.test".to_string(),
            ..Default::default()
        },
        activation_check_interval: Duration::from_secs(60),
        ..Default::default()
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let reconciler = h.reconciler.clone();
    let worker_broker = broker.clone();
    let handle = tokio::spawn(async move {
        push::run_with(
            &options,
            reconciler.as_ref(),
            |identity: &str| worker_broker.connect(identity),
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(broker.identities(), vec![IDENTITY]);

    h.reconciler.deactivate().await.unwrap();
    h.reconciler.activate("XYZ999").await.unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(broker.identities(), vec![IDENTITY, "XYZ999"]);
    assert_eq!(broker.disconnects.load(Ordering::SeqCst), 1);

    broker.publish(message(
        &Topics::device_command("XYZ999"),
        r#"{"command":"lock","lockMessage":"Pay EMI"}"#,
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = h.state().await;
    assert!(state.lock.locked);
    assert_eq!(state.lock.lock_message, "Pay EMI");

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
    assert_eq!(broker.disconnects.load(Ordering::SeqCst), 2);
}
