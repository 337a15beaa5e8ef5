use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wren::auth::session;
use wren::config::{Cli, Config};
use wren::routes;
use wren::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Database, blob storage and the live feed hub
    let state = AppState::build(config.clone())?;

    let purged = session::purge_expired(&state.db)?;
    if purged > 0 {
        tracing::info!("Removed {} expired sessions", purged);
    }

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
