//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use http::StatusCode;
use openapi_server::models::{
    ActivateRequest, ActivationResponse, HealthResponse, LockStateResponse, SyncResponse,
    VersionResponse,
};
use tracing::{error, warn};

use crate::errors::AgentError;
use crate::models::lock::SyncOutcome;
use crate::server::state::ServerState;
use crate::storage::store::{DeviceIdentity, PersistedState};
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "lockagent".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Read-only lock state for the lock overlay
pub async fn lock_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<LockStateResponse>, StatusCode> {
    let snapshot = state.reconciler.snapshot().await.map_err(|e| {
        error!("Failed to load lock state: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let reset_pending = state.reconciler.dispatcher().reset_in_flight();
    Ok(Json(lock_state_response(&snapshot, reset_pending)))
}

/// Run one reconciliation cycle now
pub async fn sync_handler(State(state): State<Arc<ServerState>>) -> Json<SyncResponse> {
    let outcome = state.reconciler.manual_cycle().await;
    Json(sync_response(&outcome))
}

/// Store a new identity through the running engine
pub async fn activate_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<ActivationResponse>, (StatusCode, String)> {
    let identity = state
        .reconciler
        .activate(&request.key)
        .await
        .map_err(api_error)?;
    Ok(Json(activation_response(Some(&identity))))
}

/// Wipe the identity and all lock state through the running engine
pub async fn deactivate_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ActivationResponse>, (StatusCode, String)> {
    state.reconciler.deactivate().await.map_err(api_error)?;
    Ok(Json(activation_response(None)))
}

fn api_error(e: AgentError) -> (StatusCode, String) {
    match e {
        AgentError::ConfigError(msg) => {
            warn!("Rejected activation change: {}", msg);
            (StatusCode::CONFLICT, msg)
        }
        e => {
            error!("Activation change failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn activation_response(identity: Option<&DeviceIdentity>) -> ActivationResponse {
    ActivationResponse {
        activated: identity.is_some(),
        identity: identity.map(|i| i.key.clone()),
        activated_at_millis: identity.map(|i| i.activated_at_millis),
    }
}

pub fn lock_state_response(state: &PersistedState, reset_pending: bool) -> LockStateResponse {
    LockStateResponse {
        activated: state.identity_key().is_some(),
        locked: state.lock.locked,
        lock_message: state.lock.lock_message.clone(),
        last_command: state.lock.last_command.as_ref().map(|c| c.to_string()),
        last_acked_command: state.lock.last_acked_command.as_ref().map(|c| c.to_string()),
        last_sync_at_millis: state.lock.last_sync_at_millis,
        last_error_at_millis: state.lock.last_error_at_millis,
        last_error: state.last_error.as_ref().map(|e| e.detail.clone()),
        lockdown_active: state.lockdown_active,
        reset_pending: reset_pending || state.reset_pending_since_millis.is_some(),
    }
}

pub fn sync_response(outcome: &SyncOutcome) -> SyncResponse {
    SyncResponse {
        outcome: outcome.outcome.to_string(),
        error_detail: outcome.error_detail.clone(),
        duration_millis: outcome.duration_millis,
    }
}
