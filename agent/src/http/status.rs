//! Device status API
//!
//! Pure transport: fetches the server's view of the device, reports
//! heartbeats and acknowledges applied commands. Holds no state.

use async_trait::async_trait;
use openapi_client::models::{AckRequest, StatusResponse, TelemetryRequest};

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::models::lock::{CommandKind, StatusReport};
use crate::telemetry::TelemetrySnapshot;

/// Status client trait for testability
#[async_trait]
pub trait StatusClientExt: Send + Sync {
    /// Fetch the current server-side status for `identity`
    async fn fetch_status(&self, identity: &str) -> Result<StatusReport, AgentError>;

    /// Report a heartbeat
    async fn send_telemetry(
        &self,
        identity: &str,
        snapshot: &TelemetrySnapshot,
    ) -> Result<(), AgentError>;

    /// Acknowledge an applied command
    async fn acknowledge(&self, identity: &str, command: &CommandKind) -> Result<(), AgentError>;
}

#[async_trait]
impl StatusClientExt for HttpClient {
    async fn fetch_status(&self, identity: &str) -> Result<StatusReport, AgentError> {
        let response: StatusResponse = self.get(&["device", "status", identity]).await?;
        Ok(StatusReport::from(response))
    }

    async fn send_telemetry(
        &self,
        identity: &str,
        snapshot: &TelemetrySnapshot,
    ) -> Result<(), AgentError> {
        let body = TelemetryRequest {
            device_key: identity.to_string(),
            battery_level: snapshot.battery_level,
            network_type: snapshot.network_type.as_str().to_string(),
            timestamp: snapshot.timestamp_millis,
            locked: snapshot.locked,
            hostname: Some(snapshot.hostname.clone()),
            uptime_secs: Some(snapshot.uptime_secs),
        };
        self.post(&["device", "update"], &body).await
    }

    async fn acknowledge(&self, identity: &str, command: &CommandKind) -> Result<(), AgentError> {
        let body = AckRequest {
            device_key: identity.to_string(),
            command: command.as_str().to_string(),
        };
        self.post(&["device", "ack"], &body)
            .await
            .map_err(|e| AgentError::AckFailure(e.to_string()))
    }
}
