//! Recording fakes for the engine's seams.
//!
//! Every call is recorded so tests can assert on the full history without
//! touching the network or the OS.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lockagent::capability::alert::{Alert, AlertKind, Alerter};
use lockagent::capability::lockdown::{LockdownProvider, LockdownReport, LockdownStep};
use lockagent::clock::ManualClock;
use lockagent::engine::dispatcher::Dispatcher;
use lockagent::engine::reconciler::Reconciler;
use lockagent::engine::EngineOptions;
use lockagent::errors::AgentError;
use lockagent::http::status::StatusClientExt;
use lockagent::models::lock::{CommandKind, LockState, StatusReport};
use lockagent::storage::store::{DeviceIdentity, MemoryStore, PersistedState, StateStore};
use lockagent::telemetry::TelemetrySnapshot;

pub const IDENTITY: &str = "ABC123";
pub const START_MILLIS: i64 = 1_700_000_000_000;

// ── Store ─────────────────────────────────────────────────────

/// Memory store that counts calls
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub loads: AtomicUsize,
    pub saves: AtomicUsize,
    pub wipes: AtomicUsize,
    /// Number of upcoming wipes that fail
    pub failing_wipes: AtomicUsize,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            inner: MemoryStore::with_state(state),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
            + self.saves.load(Ordering::SeqCst)
            + self.wipes.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl StateStore for CountingStore {
    async fn load(&self) -> Result<PersistedState, AgentError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load().await
    }

    async fn save(&self, state: &PersistedState) -> Result<(), AgentError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(state).await
    }

    async fn wipe(&self) -> Result<(), AgentError> {
        self.wipes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_wipes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(AgentError::StorageError("disk is read-only".to_string()));
        }
        self.inner.wipe().await
    }
}

// ── Status client ─────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStatusClient {
    pub report: Mutex<StatusReport>,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub fail_fetch: AtomicBool,
    pub fail_ack: AtomicBool,
    pub ack_delay: Mutex<Option<Duration>>,
    pub fetches: AtomicUsize,
    pub ack_attempts: AtomicUsize,
    pub acks: Mutex<Vec<CommandKind>>,
    pub telemetry: Mutex<Vec<TelemetrySnapshot>>,
}

#[allow(dead_code)]
impl FakeStatusClient {
    pub fn set_report(&self, report: StatusReport) {
        *self.report.lock().unwrap() = report;
    }

    pub fn acks(&self) -> Vec<CommandKind> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusClientExt for FakeStatusClient {
    async fn fetch_status(&self, _identity: &str) -> Result<StatusReport, AgentError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(AgentError::Unreachable("connection refused".to_string()));
        }
        Ok(self.report.lock().unwrap().clone())
    }

    async fn send_telemetry(
        &self,
        _identity: &str,
        snapshot: &TelemetrySnapshot,
    ) -> Result<(), AgentError> {
        self.telemetry.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn acknowledge(&self, _identity: &str, command: &CommandKind) -> Result<(), AgentError> {
        self.ack_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.ack_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(AgentError::AckFailure("ack endpoint down".to_string()));
        }
        self.acks.lock().unwrap().push(command.clone());
        Ok(())
    }
}

// ── Lockdown ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockdownCall {
    Apply,
    Release,
}

#[derive(Default)]
pub struct FakeLockdown {
    pub calls: Mutex<Vec<LockdownCall>>,
    pub fail_apply: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl FakeLockdown {
    pub fn calls(&self) -> Vec<LockdownCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: LockdownCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    async fn record(&self, call: LockdownCall, fail: bool) -> LockdownReport {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut report = LockdownReport::default();
        for step in LockdownStep::ALL {
            let result = if fail && step == LockdownStep::Kiosk {
                Err(AgentError::CapabilityError("kiosk mode refused".to_string()))
            } else {
                Ok(())
            };
            report.record(step, result);
        }
        report
    }
}

#[async_trait]
impl LockdownProvider for FakeLockdown {
    async fn apply_full_lockdown(&self) -> LockdownReport {
        let fail = self.fail_apply.load(Ordering::SeqCst);
        self.record(LockdownCall::Apply, fail).await
    }

    async fn release_lockdown(&self) -> LockdownReport {
        self.record(LockdownCall::Release, false).await
    }
}

// ── Alerter ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAlerter {
    pub alerts: Mutex<Vec<Alert>>,
    pub rings_started: AtomicUsize,
    pub rings_stopped: AtomicUsize,
}

#[allow(dead_code)]
impl FakeAlerter {
    pub fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.lock().unwrap().iter().map(|a| a.kind).collect()
    }

    pub fn started(&self) -> usize {
        self.rings_started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.rings_stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Alerter for FakeAlerter {
    async fn notify(&self, alert: &Alert) -> Result<(), AgentError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn start_ring(&self) -> Result<(), AgentError> {
        self.rings_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_ring(&self) -> Result<(), AgentError> {
        self.rings_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub status: Arc<FakeStatusClient>,
    pub lockdown: Arc<FakeLockdown>,
    pub alerter: Arc<FakeAlerter>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Arc<Reconciler>,
}

#[allow(dead_code)]
impl Harness {
    /// Engine over an empty store
    pub fn new() -> Self {
        Self::with_state(PersistedState::default())
    }

    /// Engine over a store holding an activated, unlocked device
    pub fn activated() -> Self {
        Self::with_state(activated_state(LockState::default()))
    }

    pub fn with_state(state: PersistedState) -> Self {
        let options = EngineOptions {
            send_telemetry: false,
            ..Default::default()
        };
        Self::build(state, options)
    }

    pub fn build(state: PersistedState, options: EngineOptions) -> Self {
        let store = Arc::new(if state == PersistedState::default() {
            CountingStore::default()
        } else {
            CountingStore::with_state(state)
        });
        let status = Arc::new(FakeStatusClient::default());
        let lockdown = Arc::new(FakeLockdown::default());
        let alerter = Arc::new(FakeAlerter::default());
        let clock = Arc::new(ManualClock::new(START_MILLIS));

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            lockdown.clone(),
            alerter.clone(),
            clock.clone(),
            &options,
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            dispatcher,
            status.clone(),
            clock.clone(),
            options,
        ));

        Self {
            store,
            status,
            lockdown,
            alerter,
            clock,
            reconciler,
        }
    }

    pub async fn state(&self) -> PersistedState {
        self.reconciler.snapshot().await.unwrap()
    }
}

pub fn activated_state(lock: LockState) -> PersistedState {
    PersistedState {
        identity: Some(DeviceIdentity {
            key: IDENTITY.to_string(),
            activated_at_millis: START_MILLIS - 60_000,
        }),
        lock,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn report(command: CommandKind, message: &str) -> StatusReport {
    StatusReport::from_push(command, Some(message.to_string()))
}
