//! Error types for the lock agent

use thiserror::Error;

/// Main error type for the lock agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Network failure or request timeout talking to the control server
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// Non-success response from the control server
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// A lockdown primitive failed
    #[error("Capability error: {0}")]
    CapabilityError(String),

    #[error("Acknowledgement failed: {0}")]
    AckFailure(String),

    #[error("Device not activated: {0}")]
    DeviceNotActivated(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("MQTT error: {0}")]
    MqttError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether the next natural trigger may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::HttpError(_)
                | AgentError::Unreachable(_)
                | AgentError::ServerError(_)
                | AgentError::Timeout(_)
                | AgentError::CapabilityError(_)
                | AgentError::AckFailure(_)
                | AgentError::MqttError(_)
        )
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
