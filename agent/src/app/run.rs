//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::settings::HookSettings;
use crate::workers::{poller, push, ShutdownSignal};

/// Run the lock agent until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    hooks: HookSettings,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing lock agent...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, hooks, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

fn shutdown_future(shutdown_tx: &broadcast::Sender<()>) -> ShutdownSignal {
    let mut shutdown_rx = shutdown_tx.subscribe();
    Box::pin(async move {
        let _ = shutdown_rx.recv().await;
    })
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    hooks: HookSettings,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    let app_state = Arc::new(AppState::init(options, hooks).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.enable_socket_server {
        init_socket_server(options, app_state.clone(), shutdown_tx, shutdown_manager).await?;
    }

    if options.enable_poller {
        init_poller_worker(options.poller.clone(), app_state.clone(), shutdown_tx, shutdown_manager)?;
    }

    if options.enable_push {
        init_push_worker(options.push.clone(), app_state, shutdown_tx, shutdown_manager)?;
    }

    Ok(())
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    info!("Initializing poller worker...");

    let reconciler = app_state.reconciler.clone();
    let shutdown = shutdown_future(shutdown_tx);

    let poller_handle = tokio::spawn(async move {
        poller::run(&options, reconciler.as_ref(), tokio::time::sleep, shutdown).await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

fn init_push_worker(
    options: push::Options,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    info!("Initializing push worker...");

    let reconciler = app_state.reconciler.clone();
    let shutdown = shutdown_future(shutdown_tx);

    let push_handle = tokio::spawn(async move {
        push::run(&options, reconciler.as_ref(), shutdown).await;
    });

    shutdown_manager.with_push_worker_handle(push_handle)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(app_state.reconciler.clone());
    let server_handle = serve(
        &options.server,
        Arc::new(server_state),
        shutdown_future(shutdown_tx),
    )
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    socket_server_handle: Option<JoinHandle<Result<(), AgentError>>>,
    poller_worker_handle: Option<JoinHandle<()>>,
    push_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            socket_server_handle: None,
            poller_worker_handle: None,
            push_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), AgentError> {
        if self.app_state.is_some() {
            return Err(AgentError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.poller_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_push_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.push_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("push_handle already set".to_string()));
        }
        self.push_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), AgentError>>,
    ) -> Result<(), AgentError> {
        if self.socket_server_handle.is_some() {
            return Err(AgentError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down lock agent...");

        // 1. Poller worker
        if let Some(handle) = self.poller_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. Push worker
        if let Some(handle) = self.push_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 3. Socket server
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))??;
        }

        // 4. App state; a scheduled reset keeps running until the process exits
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
