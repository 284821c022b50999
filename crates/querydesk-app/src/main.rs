//! QueryDesk server binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database (migrations + optional sample data)
//! 4. Wire the chat pipeline
//! 5. Start the axum REST API server

mod cli;

use std::sync::Arc;

use clap::Parser;

use querydesk_api::state::AppState;
use querydesk_chat::ChatOrchestrator;
use querydesk_core::config::QueryDeskConfig;
use querydesk_storage::Database;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = QueryDeskConfig::load_or_default(&config_file);
    config.server.host = args.resolve_host(&config.server.host);
    config.server.port = args.resolve_port(config.server.port);
    if args.no_seed {
        config.database.seed_sample_data = false;
    }

    // Tracing. RUST_LOG wins over the configured level.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting QueryDesk v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let db_path = args.resolve_db_path(&config.database.path, &config.general.data_dir);
    let db = match Database::open(&db_path, config.database.seed_sample_data) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "Failed to open database");
            return Err(e.into());
        }
    };
    tracing::info!(
        path = %db_path.display(),
        seeded = config.database.seed_sample_data,
        "SQLite database ready"
    );

    // Chat pipeline.
    let orchestrator = ChatOrchestrator::from_config(&config, Arc::clone(&db));
    tracing::info!(
        max_rows = config.database.max_rows,
        context_turns = config.chat.context_turns,
        "Chat pipeline ready"
    );

    // === API server ===

    let server_config = config.clone();
    let state = AppState::with_orchestrator(config, db, orchestrator);

    if let Err(e) = querydesk_api::start_server(&server_config, state).await {
        tracing::error!(error = %e, "API server stopped - is another instance running?");
        return Err(e.into());
    }

    Ok(())
}
