//! vigild - the vigil daemon.
//!
//! Runs the two long-lived background loops against the shared store:
//! the ingestion consumer and the auto-resolution sweeper. Both survive
//! transient store failures by retrying and stop together on Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, Level};

use vigil_core::{init_tracing, EngineConfig, Ingestor, Sweeper, METRICS};
use vigil_state::SurrealStore;

#[tokio::main]
async fn main() -> Result<()> {
    let json = std::env::var("VIGIL_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);
    init_tracing(json, Level::INFO);

    let config = EngineConfig::from_env();
    let store = Arc::new(SurrealStore::from_env().await?);

    info!(event = "vigild.started", version = vigil_core::VERSION);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestor = Ingestor::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        config.ingest.clone(),
    )
    .await;
    let ingest_handle = vigil_core::spawn_ingestor(ingestor, shutdown_rx.clone());

    let sweeper = Sweeper::new(store.clone(), config.sweeper.clone());
    let sweep_handle = vigil_core::spawn_sweeper(sweeper, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!(event = "vigild.shutdown_requested");
    shutdown_tx.send(true)?;

    ingest_handle.await?;
    sweep_handle.await?;

    METRICS.flush();
    info!(event = "vigild.stopped");
    Ok(())
}
