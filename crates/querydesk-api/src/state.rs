//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use querydesk_chat::ChatOrchestrator;
use querydesk_core::config::QueryDeskConfig;
use querydesk_storage::Database;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup.
    pub config: Arc<QueryDeskConfig>,
    /// SQLite database holding the queryable data.
    pub database: Arc<Database>,
    /// The chat pipeline.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the default collaborator wiring.
    pub fn new(config: QueryDeskConfig, database: Database) -> Self {
        let database = Arc::new(database);
        let orchestrator = ChatOrchestrator::from_config(&config, Arc::clone(&database));
        Self::with_orchestrator(config, database, orchestrator)
    }

    /// Create an AppState around an already-built orchestrator.
    pub fn with_orchestrator(
        config: QueryDeskConfig,
        database: Arc<Database>,
        orchestrator: ChatOrchestrator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            database,
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
