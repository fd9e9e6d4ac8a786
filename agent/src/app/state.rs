//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::capability::alert::HookAlerter;
use crate::capability::lockdown::HookLockdown;
use crate::clock::SystemClock;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::reconciler::Reconciler;
use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::storage::settings::HookSettings;
use crate::storage::store::{FileStore, StateStore};

/// Main application state
pub struct AppState {
    /// Persisted identity and lock state
    pub store: Arc<dyn StateStore>,

    /// HTTP client for backend communication
    pub http_client: Arc<HttpClient>,

    /// Reconciliation engine shared by every trigger
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Initialize application state and resume a reset accepted before a
    /// restart
    pub async fn init(options: &AppOptions, hooks: HookSettings) -> Result<Self, AgentError> {
        info!("Initializing application state...");
        let app_state = Self::build(options, hooks).await?;

        let state = app_state.store.load().await?;
        if app_state.reconciler.dispatcher().resume_pending_reset(&state) {
            warn!("A device reset is pending");
        }
        Ok(app_state)
    }

    /// Wire the engine without starting anything
    pub async fn build(options: &AppOptions, hooks: HookSettings) -> Result<Self, AgentError> {

        options.storage.layout.setup().await?;
        let store: Arc<dyn StateStore> =
            Arc::new(FileStore::new(options.storage.layout.state_file()));

        let http_client = Arc::new(HttpClient::new(
            &options.backend_base_url,
            options.backend_timeout,
        )?);

        let clock = Arc::new(SystemClock);
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(HookLockdown::new(hooks.clone())),
            Arc::new(HookAlerter::new(hooks)),
            clock.clone(),
            &options.engine,
        ));

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            dispatcher.clone(),
            http_client.clone(),
            clock,
            options.engine.clone(),
        ));

        Ok(Self {
            store,
            http_client,
            reconciler,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        self.reconciler.dispatcher().shutdown().await;
        Ok(())
    }
}
