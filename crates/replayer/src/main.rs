//! Dataset Replayer - Main Entry Point

use replayer::{init_logging, run, ReplayConfig};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== Vibration Dataset Replayer v{} ===", env!("CARGO_PKG_VERSION"));

    let config = ReplayConfig::from_env()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    run(config, shutdown_rx).await?;
    Ok(())
}
