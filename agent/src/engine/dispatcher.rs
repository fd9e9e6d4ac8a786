//! Command dispatcher
//!
//! Executes planned transitions: persists the next lock state, drives the
//! lockdown capability and local alerts, owns the ring auto-stop timer and
//! the single in-flight reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::alert::{Alert, Alerter};
use crate::capability::lockdown::LockdownProvider;
use crate::clock::Clock;
use crate::engine::fsm::{plan, Effect};
use crate::engine::EngineOptions;
use crate::errors::AgentError;
use crate::models::lock::CommandKind;
use crate::storage::store::{PersistedState, StateStore};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Serializes every writer of the persisted state
pub type CycleGate = Arc<tokio::sync::Mutex<()>>;

type RingTimer = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Backoff between attempts of a failed wipe
const WIPE_RETRY: CooldownOptions = CooldownOptions {
    base_delay: Duration::from_secs(5),
    max_delay: Duration::from_secs(300),
    multiplier: 2.0,
};

/// Inputs of one dispatch
pub struct DispatchContext<'a> {
    /// Loaded state; updated in place and persisted by the dispatcher
    pub state: &'a mut PersistedState,

    /// Lock message carried by the report
    pub lock_message: &'a str,
}

/// Command dispatcher
pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    lockdown: Arc<dyn LockdownProvider>,
    alerter: Arc<dyn Alerter>,
    clock: Arc<dyn Clock>,
    reset_delay: Duration,
    ring_duration: Duration,
    gate: CycleGate,
    ring_timer: RingTimer,
    reset_in_flight: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn StateStore>,
        lockdown: Arc<dyn LockdownProvider>,
        alerter: Arc<dyn Alerter>,
        clock: Arc<dyn Clock>,
        options: &EngineOptions,
    ) -> Self {
        Self {
            store,
            lockdown,
            alerter,
            clock,
            reset_delay: options.reset_delay,
            ring_duration: options.ring_duration,
            gate: Arc::new(tokio::sync::Mutex::new(())),
            ring_timer: Arc::new(Mutex::new(None)),
            reset_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Gate shared with the reconciler
    pub fn gate(&self) -> &CycleGate {
        &self.gate
    }

    /// Whether a reset is scheduled and has not fired yet
    pub fn reset_in_flight(&self) -> bool {
        self.reset_in_flight.load(Ordering::SeqCst)
    }

    /// Apply `command` to the context state.
    ///
    /// The lock flag and message are persisted before any OS effect runs, and
    /// stay advanced even when the lockdown capability fails; in that case a
    /// `CapabilityError` is returned after the remaining effects have run.
    /// Callers must hold the cycle gate.
    pub async fn dispatch(
        &self,
        command: &CommandKind,
        ctx: DispatchContext<'_>,
    ) -> Result<(), AgentError> {
        let plan = plan(&ctx.state.lock, ctx.state.lockdown_active, command, ctx.lock_message);

        if let CommandKind::Unrecognized(raw) = command {
            info!("Ignoring unrecognized command: {}", raw);
            return Ok(());
        }
        if plan.is_noop() {
            debug!("Command {} requires no transition", command);
            return Ok(());
        }

        if plan.touches_lockdown() {
            debug!("Command {} drives the lockdown capability", command);
        }

        if plan.next != ctx.state.lock {
            info!(
                "Lock state transition on {}: locked {} -> {}",
                command, ctx.state.lock.locked, plan.next.locked
            );
            ctx.state.lock = plan.next.clone();
            self.store.save(ctx.state).await?;
        }

        let mut capability_error = None;
        for effect in plan.effects {
            match effect {
                Effect::ApplyLockdown => {
                    let report = self.lockdown.apply_full_lockdown().await;
                    ctx.state.lockdown_active = report.succeeded();
                    if let Err(e) = report.into_result() {
                        error!("Full lockdown incomplete: {}", e);
                        capability_error = Some(e);
                    }
                }
                Effect::ReleaseLockdown => {
                    let report = self.lockdown.release_lockdown().await;
                    ctx.state.lockdown_active = !report.succeeded();
                    if let Err(e) = report.into_result() {
                        error!("Lockdown release incomplete: {}", e);
                        capability_error = Some(e);
                    }
                }
                Effect::Alert(alert) => self.notify(&alert).await,
                Effect::Ring => self.ring().await,
                Effect::ScheduleReset => self.schedule_reset(ctx.state).await?,
            }
        }

        self.store.save(ctx.state).await?;

        match capability_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn notify(&self, alert: &Alert) {
        if let Err(e) = self.alerter.notify(alert).await {
            warn!("Alert delivery failed, ignoring: {}", e);
        }
    }

    /// Start the ring and (re)arm its auto-stop timer
    async fn ring(&self) {
        if let Err(e) = self.alerter.start_ring().await {
            warn!("Failed to start ring: {}", e);
            return;
        }

        let alerter = self.alerter.clone();
        let duration = self.ring_duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(e) = alerter.stop_ring().await {
                warn!("Failed to stop ring: {}", e);
            }
        });

        let mut timer = self.ring_timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// Whether a ring auto-stop timer is armed
    pub fn ringing(&self) -> bool {
        let timer = self.ring_timer.lock().unwrap_or_else(|e| e.into_inner());
        timer.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// The flag is only raised together with the spawn, so a dispatch
    /// abandoned while persisting the marker leaves no stuck reset behind.
    async fn schedule_reset(&self, state: &mut PersistedState) -> Result<(), AgentError> {
        if self.reset_in_flight() {
            info!("Reset already scheduled, not scheduling another");
            return Ok(());
        }

        let since = self.clock.now_millis();
        state.reset_pending_since_millis = Some(since);
        self.store.save(state).await?;

        if self.reset_in_flight.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        warn!("Device reset scheduled in {:?}", self.reset_delay);
        self.spawn_wipe(self.reset_delay);
        Ok(())
    }

    /// Resume a reset accepted before a restart.
    ///
    /// Elapsed time is rounded down to whole seconds, so the wipe never fires
    /// earlier than the original schedule.
    pub fn resume_pending_reset(&self, state: &PersistedState) -> bool {
        let Some(since) = state.reset_pending_since_millis else {
            return false;
        };
        if self.reset_in_flight.swap(true, Ordering::SeqCst) {
            return true;
        }

        let elapsed_secs = (self.clock.now_millis() - since).max(0) as u64 / 1000;
        let remaining = self
            .reset_delay
            .saturating_sub(Duration::from_secs(elapsed_secs));
        warn!("Resuming pending device reset, wiping in {:?}", remaining);
        self.spawn_wipe(remaining);
        true
    }

    /// The wipe is detached: shutdown does not cancel it. A failed wipe is
    /// retried with backoff and the reset stays in flight until it succeeds.
    fn spawn_wipe(&self, delay: Duration) {
        let store = self.store.clone();
        let lockdown = self.lockdown.clone();
        let alerter = self.alerter.clone();
        let ring_timer = self.ring_timer.clone();
        let gate = self.gate.clone();
        let in_flight = self.reset_in_flight.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut attempt: u32 = 0;
            loop {
                let wiped = {
                    let _guard = gate.lock().await;
                    stop_ring(&ring_timer, alerter.as_ref()).await;
                    wipe(store.as_ref(), lockdown.as_ref()).await
                };
                match wiped {
                    Ok(()) => {
                        warn!("Device reset complete, local state wiped");
                        break;
                    }
                    Err(e) => {
                        let retry = calc_exp_backoff(&WIPE_RETRY, attempt);
                        attempt = attempt.saturating_add(1);
                        error!("Device reset failed, retrying in {:?}: {}", retry, e);
                        tokio::time::sleep(retry).await;
                    }
                }
            }
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Release any lockdown and wipe all stored state. Callers must hold the
    /// cycle gate.
    pub async fn wipe_now(&self) -> Result<(), AgentError> {
        stop_ring(&self.ring_timer, self.alerter.as_ref()).await;
        wipe(self.store.as_ref(), self.lockdown.as_ref()).await
    }

    /// Cancel outstanding timers. A scheduled reset is not affected.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher...");
        stop_ring(&self.ring_timer, self.alerter.as_ref()).await;
    }
}

async fn stop_ring(ring_timer: &Mutex<Option<JoinHandle<()>>>, alerter: &dyn Alerter) {
    let handle = {
        let mut timer = ring_timer.lock().unwrap_or_else(|e| e.into_inner());
        timer.take()
    };
    if let Some(handle) = handle {
        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            if let Err(e) = alerter.stop_ring().await {
                warn!("Failed to stop ring: {}", e);
            }
        }
    }
}

async fn wipe(store: &dyn StateStore, lockdown: &dyn LockdownProvider) -> Result<(), AgentError> {
    // An unreadable state still gets the lockdown released
    let release = match store.load().await {
        Ok(state) => state.lockdown_active || state.lock.locked,
        Err(e) => {
            warn!("Unable to read state before wipe, releasing lockdown anyway: {}", e);
            true
        }
    };
    if release {
        let report = lockdown.release_lockdown().await;
        if !report.succeeded() {
            warn!("Lockdown release before wipe incomplete: {:?}", report.failures());
        }
    }
    store.wipe().await
}
