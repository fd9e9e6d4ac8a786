//! API models

use serde::{Deserialize, Serialize};

/// Device status as reported by `GET /device/status/{key}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// "locked" or "active"
    #[serde(default)]
    pub status: String,

    /// Pending command, empty or absent when there is none
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub lock_message: Option<String>,
}

/// Heartbeat body for `POST /device/update`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequest {
    pub device_key: String,
    pub battery_level: Option<u8>,
    pub network_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub uptime_secs: Option<u64>,
}

/// Command acknowledgement body for `POST /device/ack`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub device_key: String,
    pub command: String,
}

/// Out-of-band push payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushCommand {
    pub command: String,
    #[serde(default)]
    pub lock_message: Option<String>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: String,
    pub details: Option<serde_json::Value>,
}
