//! Local agent API client
//!
//! Used by the CLI so activation changes made while the agent runs are applied
//! by the agent's own engine instead of a second writer of the state file.

use std::time::Duration;

use openapi_server::models::{ActivateRequest, ActivationResponse, HealthResponse};
use serde_json::json;

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::storage::store::DeviceIdentity;

/// Long enough to wait out a reconciliation cycle holding the engine
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub struct AgentApiClient {
    http: HttpClient,
}

impl AgentApiClient {
    pub fn new(host: &str, port: u16) -> Result<Self, AgentError> {
        // A wildcard bind is reached over loopback
        let host = match host {
            "0.0.0.0" | "" => "127.0.0.1",
            "::" => "[::1]",
            host => host,
        };
        let http = HttpClient::new(&format!("http://{}:{}", host, port), REQUEST_TIMEOUT)?;
        Ok(Self { http })
    }

    /// Whether an agent answers on the local API
    pub async fn health(&self) -> Result<(), AgentError> {
        let _: HealthResponse = self.http.get(&["health"]).await?;
        Ok(())
    }

    pub async fn activate(&self, key: &str) -> Result<DeviceIdentity, AgentError> {
        let request = ActivateRequest {
            key: key.to_string(),
        };
        let response: ActivationResponse = self.http.post_json(&["activate"], &request).await?;
        match (response.identity, response.activated_at_millis) {
            (Some(key), Some(activated_at_millis)) => Ok(DeviceIdentity {
                key,
                activated_at_millis,
            }),
            _ => Err(AgentError::ServerError(
                "Agent did not report the activated identity".to_string(),
            )),
        }
    }

    pub async fn deactivate(&self) -> Result<(), AgentError> {
        let response: ActivationResponse = self.http.post_json(&["deactivate"], &json!({})).await?;
        if response.activated {
            return Err(AgentError::ServerError(
                "Agent still reports an identity after deactivation".to_string(),
            ));
        }
        Ok(())
    }
}
