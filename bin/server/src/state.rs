//! Shared application state.

use crate::config::ServerConfig;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weaver_ai::{Advisor, OpenAiBackend};
use weaver_integration::standard_registry;
use weaver_workflow::{EventFanout, InMemoryRunStore, Orchestrator};

/// State handed to every handler.
pub struct AppState {
    /// Workflow definitions and run records.
    pub store: Arc<InMemoryRunStore>,
    pub orchestrator: Orchestrator,
    pub advisor: Advisor,
    /// Cancelled on shutdown so open observer sockets close.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<InMemoryRunStore>, orchestrator: Orchestrator, advisor: Advisor) -> Self {
        Self {
            store,
            orchestrator,
            advisor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wires the store, connectors, orchestrator and advisor from config.
    ///
    /// The database pool connects lazily, so an unreachable database only
    /// fails the nodes that use it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL cannot be parsed.
    pub fn from_config(config: &ServerConfig) -> Result<Self, sqlx::Error> {
        let store = Arc::new(InMemoryRunStore::new());

        let database = config
            .database_url
            .as_deref()
            .map(|url| PgPoolOptions::new().max_connections(5).connect_lazy(url))
            .transpose()?;
        let connectors = standard_registry(config.file_root.clone(), database);

        let orchestrator = Orchestrator::new(
            store.clone(),
            connectors,
            EventFanout::new(),
            config.engine.to_engine_config(),
        );

        let suggestions = &config.suggestions;
        let advisor = match &suggestions.api_key {
            Some(api_key) => Advisor::new(
                Arc::new(OpenAiBackend::new(
                    suggestions.base_url.clone(),
                    api_key.clone(),
                    suggestions.model.clone(),
                )),
                suggestions.timeout(),
            ),
            None => Advisor::disabled(),
        };

        Ok(Self::new(store, orchestrator, advisor))
    }

    /// Stops accepting runs, cancels active ones and closes observers.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.orchestrator.shutdown().await;
        self.orchestrator.fanout().shutdown();
    }
}
