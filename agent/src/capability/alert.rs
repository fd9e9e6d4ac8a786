//! Local alerts and the find/ring signal

use async_trait::async_trait;
use tracing::info;

use crate::capability::hooks::run_hook;
use crate::errors::AgentError;
use crate::storage::settings::HookSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Locked,
    Unlocked,
    Reminder,
    Expired,
    ResetWarning,
}

/// A user-facing local notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
}

impl Alert {
    /// Standard alert text for `kind`; `message` overrides the body when set
    pub fn new(kind: AlertKind, message: &str) -> Self {
        let (title, default_body) = match kind {
            AlertKind::Locked => ("Device locked", "This device has been locked."),
            AlertKind::Unlocked => ("Device unlocked", "This device has been unlocked."),
            AlertKind::Reminder => ("Payment reminder", "Please clear your pending dues."),
            AlertKind::Expired => ("Plan expired", "The lock plan has expired."),
            AlertKind::ResetWarning => (
                "Device reset",
                "This device will be reset and all local data erased.",
            ),
        };
        let body = if message.trim().is_empty() {
            default_body.to_string()
        } else {
            message.to_string()
        };
        Self {
            kind,
            title: title.to_string(),
            body,
        }
    }
}

/// Notification and audible alert primitives
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), AgentError>;

    async fn start_ring(&self) -> Result<(), AgentError>;

    async fn stop_ring(&self) -> Result<(), AgentError>;
}

/// Alerts through configured shell hooks
pub struct HookAlerter {
    hooks: HookSettings,
}

impl HookAlerter {
    pub fn new(hooks: HookSettings) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl Alerter for HookAlerter {
    async fn notify(&self, alert: &Alert) -> Result<(), AgentError> {
        info!("Alert: {} - {}", alert.title, alert.body);
        run_hook(
            "notify",
            self.hooks.notify.as_deref(),
            &[alert.title.as_str(), alert.body.as_str()],
        )
        .await
    }

    async fn start_ring(&self) -> Result<(), AgentError> {
        info!("Ring started");
        run_hook("ring_start", self.hooks.ring_start.as_deref(), &[]).await
    }

    async fn stop_ring(&self) -> Result<(), AgentError> {
        info!("Ring stopped");
        run_hook("ring_stop", self.hooks.ring_stop.as_deref(), &[]).await
    }
}
