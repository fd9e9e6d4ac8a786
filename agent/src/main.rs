//! Lock agent - Entry Point
//!
//! Keeps a device's lock state converged with its control server through a
//! scheduled poll and an MQTT push listener.

use std::collections::HashMap;
use std::env;

use lockagent::app::options::AppOptions;
use lockagent::app::run::run;
use lockagent::installer::install::{activate, deactivate, load_or_create_settings};
use lockagent::installer::status::{print_status, run_diagnostic};
use lockagent::logs::{init_logging, LogOptions};
use lockagent::storage::layout::StorageLayout;
use lockagent::storage::store::{FileStore, StateStore};
use lockagent::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&layout).await;
        return;
    }

    if cli_args.contains_key("status") {
        if let Err(e) = print_status(&layout).await {
            eprintln!("Unable to read state: {e}");
            std::process::exit(1);
        }
        return;
    }

    if cli_args.contains_key("activate") {
        let _guard = init_logging(LogOptions {
            stdout: true,
            ..Default::default()
        });
        return activate(&layout, &cli_args).await;
    }

    if cli_args.contains_key("deactivate") {
        let _guard = init_logging(LogOptions {
            stdout: true,
            ..Default::default()
        });
        return deactivate(&layout).await;
    }

    // Run the agent starting here

    if let Err(e) = layout.setup().await {
        eprintln!("Unable to prepare storage at {:?}: {e}", layout.base_dir);
        return;
    }

    // Retrieve the settings file
    let settings = match load_or_create_settings(&layout).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Not activated is not fatal: cycles report no data until an identity lands
    match FileStore::new(layout.state_file()).load().await {
        Ok(state) if state.identity_key().is_none() => {
            warn!("Device is not yet activated");
            warn!("Run: lockagent --activate --key=<identity>");
        }
        Ok(_) => {}
        Err(e) => error!("Unable to read persisted state: {}", e),
    }

    let options = AppOptions::from_settings(&settings, layout);

    info!("Running lock agent {} with options: {:?}", version.version, options);
    let result = run(options, settings.hooks.clone(), await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
