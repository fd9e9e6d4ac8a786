//! Persistent identity and lock state
//!
//! The whole agent state is one small document. Every write replaces the
//! document atomically, so a reader never observes a half-applied transition.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::lock::{ErrorRecord, LockState, SyncOutcome};

/// Activation identity of this installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub key: String,
    pub activated_at_millis: i64,
}

/// Everything that survives a restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub identity: Option<DeviceIdentity>,

    #[serde(default)]
    pub lock: LockState,

    /// Whether the OS-level lockdown is believed to be applied
    #[serde(default)]
    pub lockdown_active: bool,

    /// When a scheduled reset was accepted
    #[serde(default)]
    pub reset_pending_since_millis: Option<i64>,

    #[serde(default)]
    pub last_error: Option<ErrorRecord>,

    #[serde(default)]
    pub last_outcome: Option<SyncOutcome>,
}

impl PersistedState {
    /// Identity key, if the device is activated
    pub fn identity_key(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.key.as_str())
            .filter(|key| !key.is_empty())
    }
}

/// Durable state storage
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the current state; a store that was never written yields the default
    async fn load(&self) -> Result<PersistedState, AgentError>;

    /// Replace the stored state
    async fn save(&self, state: &PersistedState) -> Result<(), AgentError>;

    /// Irreversibly remove all stored state
    async fn wipe(&self) -> Result<(), AgentError>;
}

/// JSON document on disk
pub struct FileStore {
    file: File,
}

impl FileStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self) -> Result<PersistedState, AgentError> {
        let state = self
            .file
            .read_json_opt::<PersistedState>()
            .await
            .map_err(|e| {
                AgentError::StorageError(format!(
                    "Failed to read {}: {}",
                    self.file.path().display(),
                    e
                ))
            })?;
        Ok(state.unwrap_or_default())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), AgentError> {
        self.file.write_json_atomic(state).await.map_err(|e| {
            AgentError::StorageError(format!(
                "Failed to write {}: {}",
                self.file.path().display(),
                e
            ))
        })?;
        self.file.set_permissions_600().await?;
        debug!("Persisted state to {}", self.file.path().display());
        Ok(())
    }

    async fn wipe(&self) -> Result<(), AgentError> {
        self.file.delete().await
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Whether anything is stored
    pub fn is_empty(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<PersistedState, AgentError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.clone().unwrap_or_default())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), AgentError> {
        let mut stored = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *stored = Some(state.clone());
        Ok(())
    }

    async fn wipe(&self) -> Result<(), AgentError> {
        let mut stored = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *stored = None;
        Ok(())
    }
}
