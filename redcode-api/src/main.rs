use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::state::AppState;
use crate::store::Store;

mod background;
mod config;
mod error;
mod extract;
mod ingest;
mod models;
mod routes;
mod state;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    shared::init_tracing!()?;
    let config = shared::load_api_config!()?;

    let store = Store::open(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to initialize database at {}",
                config.database_path.display()
            )
        })?;
    let state = Arc::new(AppState::new(store));

    background::spawn_background_workers(Arc::clone(&state), &config);

    let app = routes::router(Arc::clone(&state));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "redcode-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Flush whatever the periodic saver has not picked up yet.
    if let Err(e) = state.store.persist_now().await {
        error!("final save to {} failed: {e}", state.store.path().display());
    }
    info!("shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
