//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt_broker: MqttBrokerSettings,

    /// Enable the scheduled poll
    #[serde(default = "default_true")]
    pub enable_poller: bool,

    /// Enable the push listener
    #[serde(default = "default_true")]
    pub enable_push: bool,

    /// Enable local HTTP server
    #[serde(default = "default_true")]
    pub enable_socket_server: bool,

    /// Local HTTP server bind address
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Local HTTP server port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Polling interval in seconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Delay before the first poll after start-up
    #[serde(default = "default_initial_delay")]
    pub polling_initial_delay_secs: u64,

    /// Send a heartbeat with every poll
    #[serde(default = "default_true")]
    pub send_telemetry: bool,

    /// Wall-clock budget of one poll cycle in seconds
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget_secs: u64,

    /// Delay between a reset command and the wipe
    #[serde(default = "default_ten")]
    pub reset_delay_secs: u64,

    /// Length of the find/ring alert
    #[serde(default = "default_ten")]
    pub ring_duration_secs: u64,

    /// Lockdown and alert hooks
    #[serde(default)]
    pub hooks: HookSettings,
}

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_initial_delay() -> u64 {
    5
}

fn default_server_port() -> u16 {
    8737
}

fn default_polling_interval() -> u64 {
    300
}

fn default_cycle_budget() -> u64 {
    25
}

fn default_ten() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            backend: BackendSettings::default(),
            mqtt_broker: MqttBrokerSettings::default(),
            enable_poller: true,
            enable_push: true,
            enable_socket_server: true,
            server_host: default_server_host(),
            server_port: default_server_port(),
            polling_interval_secs: default_polling_interval(),
            polling_initial_delay_secs: default_initial_delay(),
            send_telemetry: true,
            cycle_budget_secs: default_cycle_budget(),
            reset_delay_secs: default_ten(),
            ring_duration_secs: default_ten(),
            hooks: HookSettings::default(),
        }
    }
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_cycle_budget")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8000/api".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_cycle_budget(),
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host, empty disables the push listener
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    /// Broker password; the device key is the username
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

fn default_mqtt_port() -> u16 {
    8883
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            tls: true,
            ca_cert_path: None,
            password: None,
        }
    }
}

/// Shell hooks invoked for OS-level effects. Unset hooks are no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookSettings {
    #[serde(default)]
    pub kiosk_enter: Option<String>,
    #[serde(default)]
    pub kiosk_exit: Option<String>,
    #[serde(default)]
    pub launcher_hide: Option<String>,
    #[serde(default)]
    pub launcher_show: Option<String>,
    #[serde(default)]
    pub status_bar_disable: Option<String>,
    #[serde(default)]
    pub status_bar_enable: Option<String>,

    /// Receives the alert title and body as `$1` and `$2`
    #[serde(default)]
    pub notify: Option<String>,
    #[serde(default)]
    pub ring_start: Option<String>,
    #[serde(default)]
    pub ring_stop: Option<String>,
}
