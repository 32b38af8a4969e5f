//! Beehive: single-binary review orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beehive_core::{BeehiveConfig, DataPaths};
use beehive_server::{build_router, AppState};
use beehive_store::SqliteBlobStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("BEEHIVE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Some(command) = args.get(1) {
        match command.as_str() {
            "--help" | "-h" | "help" => {
                println!("Beehive: change-proposal review orchestrator");
                println!();
                println!("Usage: beehive");
                println!();
                println!("Configuration is read from the environment (PORT, BEEHIVE_DATA_DIR,");
                println!("BEEHIVE_RITUAL_BASE_URL, CODEX_CAPABILITY_KEY, GITHUB_PAT, ...).");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'beehive help' for usage.", command);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = BeehiveConfig::from_env();
    let port = config.port;
    for missing in [
        config.require_ritual_base_url().err(),
        config.require_capability_key().err(),
        config.require_github_token().err(),
    ]
    .into_iter()
    .flatten()
    {
        warn!("{}", missing);
    }

    let paths = DataPaths::new(&data_dir)?;
    let store = SqliteBlobStore::open(&paths.database)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let state = Arc::new(
        AppState::new(config, Arc::new(store))
            .map_err(|e| anyhow::anyhow!("Failed to build application state: {}", e))?,
    );

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Beehive server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
