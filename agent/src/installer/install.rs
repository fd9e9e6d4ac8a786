//! Device activation and deactivation

use std::collections::HashMap;

use colored::Colorize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::http::agent::AgentApiClient;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::storage::store::DeviceIdentity;

/// Query and JSON keys that may carry the identity in a scanned payload
const PAYLOAD_KEYS: [&str; 3] = ["key", "deviceKey", "device_key"];

/// Activate the device from `--key=<identity>` or `--payload=<scanned code>`
pub async fn activate(layout: &StorageLayout, cli_args: &HashMap<String, String>) {
    match activate_device(layout, cli_args).await {
        Ok(identity) => {
            info!("Activation successful");
            println!();
            println!("{}", "Device activated".green().bold());
            println!("  Identity: {}", identity.key);
            println!("Start the agent with: systemctl start lockagent");
        }
        Err(e) => {
            error!("Activation failed: {}", e);
            eprintln!("\n{} {}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Resolve the identity from the CLI arguments and activate, through the
/// running agent when there is one
pub async fn activate_device(
    layout: &StorageLayout,
    cli_args: &HashMap<String, String>,
) -> Result<DeviceIdentity, AgentError> {
    let key = match (cli_args.get("key"), cli_args.get("payload")) {
        (Some(key), _) => key.trim().to_string(),
        (None, Some(payload)) => parse_activation_payload(payload).ok_or_else(|| {
            AgentError::ConfigError("Scanned payload does not contain a device key".to_string())
        })?,
        (None, None) => {
            return Err(AgentError::ConfigError(
                "Missing identity. Provide --key=<identity> or --payload=<scanned code>"
                    .to_string(),
            ))
        }
    };

    println!("Setting up storage at: {:?}", layout.base_dir);
    layout.setup().await?;
    let settings = load_or_create_settings(layout).await?;

    match running_agent(&settings).await? {
        Some(agent) => {
            info!("Handing activation to the running agent");
            agent.activate(&key).await
        }
        None => {
            let app_state = local_app_state(layout, &settings).await?;
            app_state.reconciler.activate(&key).await
        }
    }
}

/// Clear the identity and every piece of lock state
pub async fn deactivate(layout: &StorageLayout) {
    match deactivate_device(layout).await {
        Ok(()) => println!("{}", "Device deactivated".yellow().bold()),
        Err(e) => {
            error!("Deactivation failed: {}", e);
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Deactivate through the running agent when there is one, otherwise write the
/// state directly
pub async fn deactivate_device(layout: &StorageLayout) -> Result<(), AgentError> {
    let settings = load_or_create_settings(layout).await?;
    match running_agent(&settings).await? {
        Some(agent) => {
            info!("Handing deactivation to the running agent");
            agent.deactivate().await
        }
        None => {
            let app_state = local_app_state(layout, &settings).await?;
            app_state.reconciler.deactivate().await
        }
    }
}

/// The local API of a running agent, if one answers.
///
/// The running agent is the only writer of the state file while it is up; with
/// the local API disabled, activation changes require the agent to be stopped.
async fn running_agent(settings: &Settings) -> Result<Option<AgentApiClient>, AgentError> {
    if !settings.enable_socket_server {
        warn!("Local API disabled, writing state directly. Stop the agent first.");
        return Ok(None);
    }

    let agent = AgentApiClient::new(&settings.server_host, settings.server_port)?;
    match agent.health().await {
        Ok(()) => Ok(Some(agent)),
        Err(AgentError::Unreachable(e)) => {
            debug!("No running agent on the local API: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Read the settings file, writing defaults on first use
pub async fn load_or_create_settings(layout: &StorageLayout) -> Result<Settings, AgentError> {
    let settings_file = layout.settings_file();
    match settings_file.read_json_opt::<Settings>().await? {
        Some(settings) => Ok(settings),
        None => {
            let settings = Settings::default();
            settings_file.write_json_atomic(&settings).await?;
            println!("Default settings written to: {:?}", settings_file.path());
            Ok(settings)
        }
    }
}

async fn local_app_state(layout: &StorageLayout, settings: &Settings) -> Result<AppState, AgentError> {
    let options = AppOptions::from_settings(settings, layout.clone());
    AppState::build(&options, settings.hooks.clone()).await
}

/// Extract the device key from a scanned activation code.
///
/// Accepts a bare key, a JSON object with a key field, or a URL whose query
/// carries the key.
pub fn parse_activation_payload(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    if payload.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        return PAYLOAD_KEYS
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
    }

    if let Ok(url) = Url::parse(payload) {
        if url.has_host() {
            return url
                .query_pairs()
                .find(|(k, _)| PAYLOAD_KEYS.contains(&k.as_ref()))
                .map(|(_, v)| v.trim().to_string())
                .filter(|k| !k.is_empty());
        }
    }

    if payload.chars().any(char::is_whitespace) {
        return None;
    }
    Some(payload.to_string())
}
