//! Agent API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Lock state as read by the lock overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStateResponse {
    pub activated: bool,
    pub locked: bool,
    pub lock_message: String,
    pub last_command: Option<String>,
    pub last_acked_command: Option<String>,
    pub last_sync_at_millis: i64,
    pub last_error_at_millis: Option<i64>,
    pub last_error: Option<String>,
    pub lockdown_active: bool,
    pub reset_pending: bool,
}

/// Manual sync response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub outcome: String,
    pub error_detail: String,
    pub duration_millis: i64,
}

/// Activation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub key: String,
}

/// Activation state after an activate or deactivate request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResponse {
    pub activated: bool,
    pub identity: Option<String>,
    pub activated_at_millis: Option<i64>,
}
