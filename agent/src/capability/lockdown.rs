//! Lockdown capability
//!
//! Full lockdown is applied and released as a unit of independent steps.
//! A failing step is reported but never rolls back the steps that succeeded.

use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::capability::hooks::run_hook;
use crate::errors::AgentError;
use crate::storage::settings::HookSettings;

/// One OS-level lockdown primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockdownStep {
    Kiosk,
    Launcher,
    StatusBar,
}

impl LockdownStep {
    pub const ALL: [LockdownStep; 3] = [
        LockdownStep::Kiosk,
        LockdownStep::Launcher,
        LockdownStep::StatusBar,
    ];
}

impl fmt::Display for LockdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockdownStep::Kiosk => f.write_str("kiosk"),
            LockdownStep::Launcher => f.write_str("launcher"),
            LockdownStep::StatusBar => f.write_str("status_bar"),
        }
    }
}

/// Per-step results of an apply or release
#[derive(Debug, Clone, Default)]
pub struct LockdownReport {
    pub steps: Vec<(LockdownStep, Result<(), String>)>,
}

impl LockdownReport {
    pub fn record(&mut self, step: LockdownStep, result: Result<(), AgentError>) {
        self.steps.push((step, result.map_err(|e| e.to_string())));
    }

    /// True when every step succeeded
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|(_, r)| r.is_ok())
    }

    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|(step, r)| r.as_ref().err().map(|e| format!("{}: {}", step, e)))
            .collect()
    }

    /// Fold the report into a `CapabilityError` when any step failed
    pub fn into_result(self) -> Result<(), AgentError> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(AgentError::CapabilityError(self.failures().join("; ")))
        }
    }
}

/// OS-level lockdown primitives; both operations are idempotent
#[async_trait]
pub trait LockdownProvider: Send + Sync {
    async fn apply_full_lockdown(&self) -> LockdownReport;

    async fn release_lockdown(&self) -> LockdownReport;
}

/// Lockdown through configured shell hooks
pub struct HookLockdown {
    hooks: HookSettings,
}

impl HookLockdown {
    pub fn new(hooks: HookSettings) -> Self {
        Self { hooks }
    }

    fn apply_hook(&self, step: LockdownStep) -> Option<&str> {
        match step {
            LockdownStep::Kiosk => self.hooks.kiosk_enter.as_deref(),
            LockdownStep::Launcher => self.hooks.launcher_hide.as_deref(),
            LockdownStep::StatusBar => self.hooks.status_bar_disable.as_deref(),
        }
    }

    fn release_hook(&self, step: LockdownStep) -> Option<&str> {
        match step {
            LockdownStep::Kiosk => self.hooks.kiosk_exit.as_deref(),
            LockdownStep::Launcher => self.hooks.launcher_show.as_deref(),
            LockdownStep::StatusBar => self.hooks.status_bar_enable.as_deref(),
        }
    }
}

#[async_trait]
impl LockdownProvider for HookLockdown {
    async fn apply_full_lockdown(&self) -> LockdownReport {
        info!("Applying full lockdown");
        let mut report = LockdownReport::default();
        for step in LockdownStep::ALL {
            let result = run_hook(&format!("{}_apply", step), self.apply_hook(step), &[]).await;
            if let Err(e) = &result {
                warn!("Lockdown step {} failed: {}", step, e);
            }
            report.record(step, result);
        }
        report
    }

    async fn release_lockdown(&self) -> LockdownReport {
        info!("Releasing lockdown");
        let mut report = LockdownReport::default();
        // Release in reverse so the kiosk is left last
        for step in LockdownStep::ALL.iter().rev().copied() {
            let result = run_hook(&format!("{}_release", step), self.release_hook(step), &[]).await;
            if let Err(e) = &result {
                warn!("Lockdown release step {} failed: {}", step, e);
            }
            report.record(step, result);
        }
        report
    }
}
