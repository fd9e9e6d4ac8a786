//! Human-readable status and diagnostics

use std::time::Duration;

use colored::Colorize;

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::installer::install::load_or_create_settings;
use crate::storage::layout::StorageLayout;
use crate::storage::store::{FileStore, StateStore};
use crate::telemetry::collect_snapshot;
use crate::utils::{format_millis, version_info};

/// Print the persisted identity and lock state
pub async fn print_status(layout: &StorageLayout) -> Result<(), AgentError> {
    let store = FileStore::new(layout.state_file());
    let state = store.load().await?;

    let Some(identity) = state.identity.as_ref() else {
        println!("{}", "Not activated".yellow().bold());
        return Ok(());
    };

    let lock = if state.lock.locked {
        "LOCKED".red().bold()
    } else {
        "unlocked".green().bold()
    };
    println!("Identity:        {}", identity.key);
    println!("Activated:       {}", format_millis(identity.activated_at_millis));
    println!("Lock:            {}", lock);
    if !state.lock.lock_message.is_empty() {
        println!("Message:         {}", state.lock.lock_message);
    }
    println!("Lockdown active: {}", state.lockdown_active);
    println!(
        "Last command:    {}",
        state.lock.last_command.as_ref().map_or("none".to_string(), |c| c.to_string())
    );
    println!(
        "Last acked:      {}",
        state.lock.last_acked_command.as_ref().map_or("none".to_string(), |c| c.to_string())
    );
    println!("Last sync:       {}", format_millis(state.lock.last_sync_at_millis));
    if let Some(error) = &state.last_error {
        println!(
            "Last error:      {} ({})",
            error.detail.red(),
            format_millis(error.at_millis)
        );
    }
    if let Some(since) = state.reset_pending_since_millis {
        println!("{} since {}", "Reset pending".red().bold(), format_millis(since));
    }
    Ok(())
}

/// Check storage, settings and backend reachability
pub async fn run_diagnostic(layout: &StorageLayout) {
    let version = version_info();
    println!("{} {}", "lockagent".bold(), version.version);
    println!();

    report("Storage", layout.setup().await.map(|_| format!("{:?}", layout.base_dir)));

    let settings = match load_or_create_settings(layout).await {
        Ok(settings) => {
            report("Settings", Ok(format!("{:?}", layout.settings_file().path())));
            settings
        }
        Err(e) => {
            report("Settings", Err(e));
            return;
        }
    };

    report(
        "Backend URL",
        HttpClient::new(&settings.backend.base_url, Duration::from_secs(5))
            .map(|client| client.base_url().to_string()),
    );

    let push = if settings.mqtt_broker.host.is_empty() {
        "disabled".to_string()
    } else {
        format!("{}:{}", settings.mqtt_broker.host, settings.mqtt_broker.port)
    };
    report("Push broker", Ok(push));

    let snapshot = collect_snapshot(false, 0);
    report(
        "Telemetry",
        Ok(format!(
            "host {} network {} battery {}",
            snapshot.hostname,
            snapshot.network_type.as_str(),
            snapshot
                .battery_level
                .map_or("n/a".to_string(), |b| format!("{}%", b))
        )),
    );

    if let Err(e) = print_status(layout).await {
        report("State", Err(e));
    }
}

fn report(name: &str, result: Result<String, AgentError>) {
    match result {
        Ok(detail) => println!("{} {:<12} {}", "[ OK ]".green(), name, detail),
        Err(e) => println!("{} {:<12} {}", "[FAIL]".red(), name, e),
    }
}
