//! Application configuration options

use std::time::Duration;

use crate::engine::EngineOptions;
use crate::mqtt::client::MqttAddress;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::{poller, push};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Backend API base URL
    pub backend_base_url: String,

    /// Per-request HTTP timeout
    pub backend_timeout: Duration,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable the push listener
    pub enable_push: bool,

    /// Enable polling worker
    pub enable_poller: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Push worker options
    pub push: push::Options,

    /// Poller worker options
    pub poller: poller::Options,

    /// Engine timings
    pub engine: EngineOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            backend_base_url: "http://localhost:8000/api".to_string(),
            backend_timeout: Duration::from_secs(25),
            storage: StorageOptions::default(),
            enable_socket_server: true,
            enable_push: true,
            enable_poller: true,
            server: ServerOptions::default(),
            push: push::Options::default(),
            poller: poller::Options::default(),
            engine: EngineOptions::default(),
        }
    }
}

impl AppOptions {
    /// Runtime options from the settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            backend_base_url: settings.backend.base_url.clone(),
            backend_timeout: Duration::from_secs(settings.backend.timeout_secs),
            storage: StorageOptions { layout },
            enable_socket_server: settings.enable_socket_server,
            enable_push: settings.enable_push,
            enable_poller: settings.enable_poller,
            server: ServerOptions {
                host: settings.server_host.clone(),
                port: settings.server_port,
            },
            push: push::Options {
                broker_address: MqttAddress {
                    host: settings.mqtt_broker.host.clone(),
                    port: settings.mqtt_broker.port,
                    use_tls: settings.mqtt_broker.tls,
                    ca_cert_path: settings.mqtt_broker.ca_cert_path.clone(),
                },
                password: settings.mqtt_broker.password.clone(),
                ..Default::default()
            },
            poller: poller::Options {
                interval: Duration::from_secs(settings.polling_interval_secs),
                initial_delay: Duration::from_secs(settings.polling_initial_delay_secs),
            },
            engine: EngineOptions {
                cycle_budget: Duration::from_secs(settings.cycle_budget_secs),
                reset_delay: Duration::from_secs(settings.reset_delay_secs),
                ring_duration: Duration::from_secs(settings.ring_duration_secs),
                send_telemetry: settings.send_telemetry,
            },
            ..Default::default()
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8737,
        }
    }
}
