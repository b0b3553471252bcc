//! Anomaly Scorer - Main Entry Point

use scorer_service::{init_logging, run, ServiceConfig};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== Vibration Anomaly Scorer v{} ===", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::from_env()?;

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
