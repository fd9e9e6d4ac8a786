//! Device heartbeat snapshot

use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{Networks, System};

/// Coarse network classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Wifi,
    Ethernet,
    Cellular,
    None,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Wifi => "wifi",
            NetworkType::Ethernet => "ethernet",
            NetworkType::Cellular => "cellular",
            NetworkType::None => "none",
        }
    }

    /// Classify an interface by its kernel name
    pub fn from_interface(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.starts_with("wl") || name.starts_with("wifi") {
            Some(NetworkType::Wifi)
        } else if name.starts_with("wwan") || name.starts_with("rmnet") || name.starts_with("ccmni") {
            Some(NetworkType::Cellular)
        } else if name.starts_with("eth") || name.starts_with("en") {
            Some(NetworkType::Ethernet)
        } else {
            None
        }
    }
}

/// Heartbeat payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Battery charge percentage, `None` on mains-only devices
    pub battery_level: Option<u8>,

    pub network_type: NetworkType,

    pub timestamp_millis: i64,

    pub hostname: String,

    pub uptime_secs: u64,

    /// Local lock flag at the time of the snapshot
    pub locked: bool,
}

/// Collect a heartbeat snapshot
pub fn collect_snapshot(locked: bool, timestamp_millis: i64) -> TelemetrySnapshot {
    let networks = Networks::new_with_refreshed_list();
    let network_type = pick_network_type(
        networks
            .iter()
            .filter(|(_, data)| data.total_received() > 0 || data.total_transmitted() > 0)
            .map(|(name, _)| name.as_str()),
    );

    TelemetrySnapshot {
        battery_level: read_battery_level(Path::new("/sys/class/power_supply")),
        network_type,
        timestamp_millis,
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        uptime_secs: System::uptime(),
        locked,
    }
}

/// Preferred order: wifi, ethernet, cellular
fn pick_network_type<'a>(interfaces: impl Iterator<Item = &'a str>) -> NetworkType {
    let mut found: Vec<NetworkType> = interfaces.filter_map(NetworkType::from_interface).collect();
    found.sort_by_key(|t| match t {
        NetworkType::Wifi => 0,
        NetworkType::Ethernet => 1,
        NetworkType::Cellular => 2,
        NetworkType::None => 3,
    });
    found.first().copied().unwrap_or(NetworkType::None)
}

/// Read the first battery capacity under a power-supply class directory
fn read_battery_level(power_supply_dir: &Path) -> Option<u8> {
    let entries = std::fs::read_dir(power_supply_dir).ok()?;
    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("BAT"))
        .find_map(|entry| {
            std::fs::read_to_string(entry.path().join("capacity"))
                .ok()
                .and_then(|raw| raw.trim().parse::<u8>().ok())
        })
        .map(|level| level.min(100))
}
