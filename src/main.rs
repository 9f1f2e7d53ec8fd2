//! peerpool daemon entry point.

use log::{error, info};
use tokio::signal;

use k8s_peerpool::{PeerPool, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let settings = Settings::load()?;
    info!("Starting peerpool with settings: {:?}", settings);
    info!("localpeer: {}", settings.local_peer());

    let config = settings.pool_config(|peers| {
        info!("update cache peers: {:?}", peers);
    })?;

    info!(
        "Starting k8s cache pool watcher with selector {}...",
        settings.selector
    );
    let mut pool = PeerPool::connect(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start k8s peer watcher: {}", e))?;

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    pool.close().await?;
    info!("Shutdown complete.");
    Ok(())
}
