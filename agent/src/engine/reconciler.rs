//! Reconciliation engine
//!
//! Merges a status report into the persisted lock state. Both delivery
//! channels feed [`Reconciler::reconcile`]; cycles are serialized behind one
//! gate, and a caller that finds the gate busy queues its report for the
//! cycle in progress instead of racing it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::time::Instant as Deadline;
use tracing::{debug, error, info, warn, Instrument};

use crate::clock::Clock;
use crate::engine::dispatcher::{DispatchContext, Dispatcher};
use crate::engine::EngineOptions;
use crate::errors::AgentError;
use crate::http::status::StatusClientExt;
use crate::models::lock::{
    CommandKind, DeviceStatus, ErrorRecord, LockState, SkipReason, StatusReport, SyncOutcome,
};
use crate::storage::store::{DeviceIdentity, PersistedState, StateStore};
use crate::telemetry::collect_snapshot;
use crate::utils::new_cycle_id;

/// Reports queued while a cycle is running
const MAX_QUEUED_REPORTS: usize = 16;

struct QueuedReport {
    ticket: u64,
    identity: String,
    report: StatusReport,
    deadline: Option<Deadline>,
}

/// Reconciliation engine
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<Dispatcher>,
    status_client: Arc<dyn StatusClientExt>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    queue: Mutex<VecDeque<QueuedReport>>,
    next_ticket: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<Dispatcher>,
        status_client: Arc<dyn StatusClientExt>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            dispatcher,
            status_client,
            clock,
            options,
            queue: Mutex::new(VecDeque::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Merge `report` into local state.
    ///
    /// Never fails: every error is folded into the returned outcome. An empty
    /// identity returns `NoData` without touching the store.
    pub async fn reconcile(&self, identity: &str, report: StatusReport) -> SyncOutcome {
        self.reconcile_within(identity, report, None).await
    }

    /// Reconcile with an optional wall-clock deadline. Past the deadline the
    /// command is abandoned and the acknowledgement is cut off.
    async fn reconcile_within(
        &self,
        identity: &str,
        report: StatusReport,
        deadline: Option<Deadline>,
    ) -> SyncOutcome {
        if identity.trim().is_empty() {
            debug!("No identity, device not activated");
            return SyncOutcome::no_data(SkipReason::NoIdentity);
        }

        let ticket = self.enqueue(identity, report, deadline);
        let mut mine = None;

        loop {
            let Ok(guard) = self.dispatcher.gate().try_lock() else {
                debug!("Cycle in progress, report {} queued", ticket);
                break;
            };
            while let Some(queued) = self.dequeue() {
                let outcome = self
                    .run_cycle(&queued.identity, &queued.report, queued.deadline)
                    .await;
                if queued.ticket == ticket {
                    mine = Some(outcome);
                }
            }
            drop(guard);

            // A report queued between the last dequeue and the release would
            // otherwise wait for the next trigger.
            if self.queue_is_empty() {
                break;
            }
        }

        mine.unwrap_or_else(|| SyncOutcome::no_data(SkipReason::CycleInProgress))
    }

    /// One scheduled poll: fetch the server status and reconcile it, all within
    /// the cycle budget. A heartbeat is sent alongside without waiting for it.
    pub async fn poll_cycle(&self) -> SyncOutcome {
        self.fetch_cycle("poll").await
    }

    /// Same as [`Reconciler::poll_cycle`], requested through the local API
    pub async fn manual_cycle(&self) -> SyncOutcome {
        self.fetch_cycle("manual").await
    }

    async fn fetch_cycle(&self, trigger: &'static str) -> SyncOutcome {
        let started = Instant::now();
        let span = tracing::info_span!("cycle", id = %new_cycle_id(), trigger);

        async {
            let state = match self.store.load().await {
                Ok(state) => state,
                Err(e) => {
                    error!("Failed to load state: {}", e);
                    return SyncOutcome::failed(e.to_string()).with_duration(elapsed_millis(started));
                }
            };
            let Some(identity) = state.identity_key().map(str::to_string) else {
                debug!("Device not activated, skipping poll");
                return SyncOutcome::no_data(SkipReason::NoIdentity);
            };

            if self.options.send_telemetry {
                self.spawn_telemetry(&identity, state.lock.locked);
            }

            let deadline = Deadline::now() + self.options.cycle_budget;
            let fetched =
                tokio::time::timeout_at(deadline, self.status_client.fetch_status(&identity)).await;

            let report = match fetched {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    if e.is_retryable() {
                        warn!("Status fetch failed, retrying on the next trigger: {}", e);
                    } else {
                        error!("Status fetch failed: {}", e);
                    }
                    return self.record_failure(&e.to_string(), started).await;
                }
                Err(_) => {
                    let e = AgentError::Timeout(format!(
                        "status fetch exceeded {:?} budget",
                        self.options.cycle_budget
                    ));
                    warn!("{}", e);
                    return self.record_failure(&e.to_string(), started).await;
                }
            };

            let server_locked = report.status == DeviceStatus::Locked;
            if report.command.is_none() && server_locked != state.lock.locked {
                debug!(
                    "Server status {:?} differs from local locked={}",
                    report.status, state.lock.locked
                );
            }

            self.reconcile_within(&identity, report, Some(deadline)).await
        }
        .instrument(span)
        .await
    }

    /// Store the identity for a freshly activated device
    pub async fn activate(&self, key: &str) -> Result<DeviceIdentity, AgentError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AgentError::ConfigError("Identity key is empty".to_string()));
        }

        let _guard = self.dispatcher.gate().lock().await;
        let state = self.store.load().await?;
        if let Some(existing) = &state.identity {
            if existing.key == key {
                info!("Device already activated with this key");
                return Ok(existing.clone());
            }
            return Err(AgentError::ConfigError(
                "Device is already activated with another key, deactivate first".to_string(),
            ));
        }

        let identity = DeviceIdentity {
            key: key.to_string(),
            activated_at_millis: self.clock.now_millis(),
        };
        let fresh = PersistedState {
            identity: Some(identity.clone()),
            lock: LockState::default(),
            ..Default::default()
        };
        self.store.save(&fresh).await?;
        info!("Device activated");
        Ok(identity)
    }

    /// Clear identity and all dependent state
    pub async fn deactivate(&self) -> Result<(), AgentError> {
        let _guard = self.dispatcher.gate().lock().await;
        self.dispatcher.wipe_now().await?;
        info!("Device deactivated");
        Ok(())
    }

    /// Current persisted state
    pub async fn snapshot(&self) -> Result<PersistedState, AgentError> {
        self.store.load().await
    }

    // ================================ CYCLE =================================== //

    async fn run_cycle(
        &self,
        identity: &str,
        report: &StatusReport,
        deadline: Option<Deadline>,
    ) -> SyncOutcome {
        let started = Instant::now();
        let outcome = match self.apply(identity, report, deadline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Only reachable when the store itself fails
                error!("Reconciliation failed: {}", e);
                SyncOutcome::failed(e.to_string())
            }
        };
        let outcome = outcome.with_duration(elapsed_millis(started));
        debug!("Cycle outcome: {:?}", outcome);
        outcome
    }

    async fn apply(
        &self,
        identity: &str,
        report: &StatusReport,
        deadline: Option<Deadline>,
    ) -> Result<SyncOutcome, AgentError> {
        let mut state = self.store.load().await?;

        if state.identity_key() != Some(identity) {
            warn!("Report for an identity this device does not hold, ignoring");
            return Ok(SyncOutcome::no_data(SkipReason::NoIdentity));
        }

        let now = self.clock.now_millis();
        let command = &report.command;

        let outcome = if command.is_none() {
            if state.lock.last_command.as_ref().is_some_and(CommandKind::rearms_on_idle) {
                debug!("No pending command, re-arming the guard for alert commands");
                state.lock.last_command = None;
                state.lock.last_acked_command = None;
            }
            state.lock.last_sync_at_millis = now;
            SyncOutcome::no_data(SkipReason::NoCommand)
        } else if let CommandKind::Unrecognized(raw) = command {
            info!("Unrecognized command {} ignored", raw);
            state.lock.last_sync_at_millis = now;
            SyncOutcome::no_data(SkipReason::NoCommand)
        } else if !command.bypasses_ack_guard()
            && state.lock.last_acked_command.as_ref() == Some(command)
        {
            info!("Stale command ignored: {} was already applied and acknowledged", command);
            state.lock.last_sync_at_millis = now;
            SyncOutcome::no_data(SkipReason::StaleCommandIgnored)
        } else if !command.bypasses_ack_guard() && state.lock.last_command.as_ref() == Some(command) {
            info!("Command {} already applied, re-sending acknowledgement", command);
            self.acknowledge(identity, command, &mut state, deadline).await;
            state.lock.last_sync_at_millis = now;
            SyncOutcome::no_data(SkipReason::AckRetried)
        } else if deadline.is_some_and(|d| Deadline::now() >= d) {
            let e = AgentError::Timeout(format!(
                "cycle budget of {:?} spent before {} could be applied",
                self.options.cycle_budget, command
            ));
            warn!("{}", e);
            record_error(&mut state, now, &e);
            SyncOutcome::failed(e.to_string())
        } else {
            let dispatch = self.dispatcher.dispatch(
                command,
                DispatchContext {
                    state: &mut state,
                    lock_message: &report.lock_message,
                },
            );
            // Abandoning a dispatch is safe: the next state is persisted before
            // any effect runs and hooks are killed when dropped, so the next
            // delivery re-applies whatever did not complete.
            let dispatched = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, dispatch)
                    .await
                    .unwrap_or_else(|_| {
                        Err(AgentError::Timeout(format!(
                            "applying {} exceeded the {:?} cycle budget",
                            command, self.options.cycle_budget
                        )))
                    }),
                None => dispatch.await,
            };

            match dispatched {
                Ok(()) => {
                    state.lock.last_command = Some(command.clone());
                    self.acknowledge(identity, command, &mut state, deadline).await;
                    state.lock.last_sync_at_millis = now;
                    info!("Applied command {}", command);
                    SyncOutcome::applied()
                }
                Err(e) => {
                    error!("Failed to apply command {}: {}", command, e);
                    record_error(&mut state, now, &e);
                    SyncOutcome::failed(e.to_string())
                }
            }
        };

        state.last_outcome = Some(outcome.clone());
        self.store.save(&state).await?;
        Ok(outcome)
    }

    /// Best effort; a failure is retried by the next cycle that sees the command.
    /// With a deadline the request is cut off once the cycle budget is spent.
    async fn acknowledge(
        &self,
        identity: &str,
        command: &CommandKind,
        state: &mut PersistedState,
        deadline: Option<Deadline>,
    ) {
        let ack = self.status_client.acknowledge(identity, command);
        let acked = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, ack).await.unwrap_or_else(|_| {
                Err(AgentError::Timeout(format!(
                    "cycle budget of {:?} spent",
                    self.options.cycle_budget
                )))
            }),
            None => ack.await,
        };
        match acked {
            Ok(()) => {
                debug!("Acknowledged {}", command);
                state.lock.last_acked_command = Some(command.clone());
            }
            Err(e) => warn!("Acknowledgement of {} failed: {}", command, e),
        }
    }

    async fn record_failure(&self, detail: &str, started: Instant) -> SyncOutcome {
        let outcome = SyncOutcome::failed(detail).with_duration(elapsed_millis(started));

        let _guard = self.dispatcher.gate().lock().await;
        match self.store.load().await {
            Ok(mut state) if state.identity.is_some() => {
                let now = self.clock.now_millis();
                state.lock.last_error_at_millis = Some(now);
                state.last_error = Some(ErrorRecord {
                    at_millis: now,
                    detail: detail.to_string(),
                });
                state.last_outcome = Some(outcome.clone());
                if let Err(e) = self.store.save(&state).await {
                    error!("Failed to record sync failure: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("Failed to load state: {}", e),
        }
        outcome
    }

    fn spawn_telemetry(&self, identity: &str, locked: bool) {
        let client = self.status_client.clone();
        let identity = identity.to_string();
        let timestamp = self.clock.now_millis();
        tokio::spawn(async move {
            let snapshot = collect_snapshot(locked, timestamp);
            if let Err(e) = client.send_telemetry(&identity, &snapshot).await {
                warn!("Telemetry send failed: {}", e);
            }
        });
    }

    // ================================ QUEUE =================================== //

    fn enqueue(&self, identity: &str, report: StatusReport, deadline: Option<Deadline>) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUED_REPORTS {
            if let Some(dropped) = queue.pop_front() {
                warn!("Report queue full, dropping report {}", dropped.ticket);
            }
        }
        queue.push_back(QueuedReport {
            ticket,
            identity: identity.to_string(),
            report,
            deadline,
        });
        ticket
    }

    fn dequeue(&self) -> Option<QueuedReport> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.pop_front()
    }

    fn queue_is_empty(&self) -> bool {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.is_empty()
    }
}

fn record_error(state: &mut PersistedState, now: i64, e: &AgentError) {
    state.lock.last_error_at_millis = Some(now);
    state.last_error = Some(ErrorRecord {
        at_millis: now,
        detail: e.to_string(),
    });
}

fn elapsed_millis(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}
