//! Push listener worker
//!
//! Receives out-of-band command pushes over MQTT and feeds them to the same
//! reconciliation path as the scheduled poll.

use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::PushCommand;
use secrecy::SecretString;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

use crate::engine::reconciler::Reconciler;
use crate::errors::AgentError;
use crate::models::lock::{CommandKind, StatusReport, SyncOutcome};
use crate::mqtt::client::{MqttAddress, MqttClient, MqttMessage};
use crate::mqtt::topics::Topics;
use crate::utils::{calc_exp_backoff, new_cycle_id, CooldownOptions};
use crate::workers::ShutdownSignal;

/// Push worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// MQTT broker address
    pub broker_address: MqttAddress,

    /// Broker password
    pub password: Option<SecretString>,

    /// Reconnect backoff
    pub reconnect: CooldownOptions,

    /// How often the stored identity is re-read, both while waiting for
    /// activation and while connected
    pub activation_check_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            broker_address: MqttAddress::default(),
            password: None,
            reconnect: CooldownOptions {
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(300),
                multiplier: 2.0,
            },
            activation_check_interval: Duration::from_secs(60),
        }
    }
}

/// A broker connection carrying command pushes for one identity
#[async_trait]
pub trait PushConnection: Send {
    async fn subscribe_commands(&self) -> Result<(), AgentError>;

    /// Next message, `None` for protocol events without a payload
    async fn poll(&mut self) -> Result<Option<MqttMessage>, AgentError>;

    async fn disconnect(&self) -> Result<(), AgentError>;
}

#[async_trait]
impl PushConnection for MqttClient {
    async fn subscribe_commands(&self) -> Result<(), AgentError> {
        MqttClient::subscribe_commands(self).await
    }

    async fn poll(&mut self) -> Result<Option<MqttMessage>, AgentError> {
        MqttClient::poll(self).await
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        MqttClient::disconnect(self).await
    }
}

/// Run the push worker against the configured MQTT broker
pub async fn run(options: &Options, reconciler: &Reconciler, shutdown_signal: ShutdownSignal) {
    let connect = |identity: &str| {
        MqttClient::new(&options.broker_address, identity, options.password.as_ref())
    };
    run_with(options, reconciler, connect, shutdown_signal).await
}

/// Run the push worker over connections made by `connect`.
///
/// The stored identity is re-read every `activation_check_interval`; when it
/// changes the connection is dropped and a new one subscribes for the current
/// identity.
pub async fn run_with<C, F>(
    options: &Options,
    reconciler: &Reconciler,
    connect: F,
    mut shutdown_signal: ShutdownSignal,
) where
    C: PushConnection,
    F: Fn(&str) -> Result<C, AgentError>,
{
    if options.broker_address.host.is_empty() {
        info!("MQTT host not configured, push worker will not start.");
        return;
    }

    info!("Push worker starting...");

    let mut attempt: u32 = 0;

    loop {
        let Some(identity) = current_identity(reconciler).await else {
            debug!("Device not activated, push worker idle");
            tokio::select! {
                _ = &mut shutdown_signal => break,
                _ = tokio::time::sleep(options.activation_check_interval) => continue,
            }
        };

        info!(
            "Connecting to MQTT broker: {}:{}",
            options.broker_address.host, options.broker_address.port
        );
        let mut client = match connect(&identity) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to create MQTT client: {}", e);
                let delay = calc_exp_backoff(&options.reconnect, attempt);
                attempt = attempt.saturating_add(1);
                tokio::select! {
                    _ = &mut shutdown_signal => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        };

        if let Err(e) = client.subscribe_commands().await {
            error!("Failed to subscribe to commands: {}", e);
        }

        let period = options.activation_check_interval;
        let mut identity_check = tokio::time::interval_at(Instant::now() + period, period);
        identity_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let identity_changed = loop {
            let polled = tokio::select! {
                _ = &mut shutdown_signal => {
                    let _ = client.disconnect().await;
                    info!("Push worker shutting down...");
                    return;
                }
                _ = identity_check.tick() => {
                    if current_identity(reconciler).await.as_deref() == Some(identity.as_str()) {
                        continue;
                    }
                    info!("Device identity changed, resubscribing");
                    if let Err(e) = client.disconnect().await {
                        debug!("Disconnect after identity change failed: {}", e);
                    }
                    break true;
                }
                polled = client.poll() => polled,
            };

            match polled {
                Ok(Some(msg)) => {
                    attempt = 0;
                    handle_message(&msg, &identity, reconciler).await;
                }
                Ok(None) => {
                    attempt = 0;
                }
                Err(e) => {
                    warn!("MQTT connection lost: {}, reconnecting...", e);
                    break false;
                }
            }
        };

        if identity_changed {
            attempt = 0;
            continue;
        }

        let delay = calc_exp_backoff(&options.reconnect, attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = &mut shutdown_signal => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Push worker shutting down...");
}

async fn current_identity(reconciler: &Reconciler) -> Option<String> {
    match reconciler.snapshot().await {
        Ok(state) => state.identity_key().map(str::to_string),
        Err(e) => {
            error!("Failed to load identity: {}", e);
            None
        }
    }
}

/// Turn a push message into a status report and reconcile it.
///
/// Messages on foreign topics or for another identity are dropped.
pub async fn handle_message(
    msg: &MqttMessage,
    identity: &str,
    reconciler: &Reconciler,
) -> Option<SyncOutcome> {
    if !Topics::is_command_topic(&msg.topic) {
        debug!("Ignoring message on {}", msg.topic);
        return None;
    }
    if Topics::parse_identity(&msg.topic).as_deref() != Some(identity) {
        warn!("Ignoring push addressed to another device: {}", msg.topic);
        return None;
    }

    let push = match msg.parse_json::<PushCommand>() {
        Ok(push) => push,
        Err(e) => {
            warn!("Malformed push payload: {}", e);
            return None;
        }
    };

    let report = StatusReport::from_push(CommandKind::parse(&push.command), push.lock_message);
    info!("Push received: {}", report.command);

    let span = tracing::info_span!("cycle", id = %new_cycle_id(), trigger = "push");
    let outcome = reconciler.reconcile(identity, report).instrument(span).await;
    Some(outcome)
}
