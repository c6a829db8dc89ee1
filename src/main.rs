// SPDX-License-Identifier: GPL-3.0-only
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use storefront_sync::api::HttpServer;
use storefront_sync::cache::{FileStore, LocalCache};
use storefront_sync::config::Config;
use storefront_sync::logging::setup_logging;
use storefront_sync::remote::build_remote;
use storefront_sync::sync::SyncCoordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level, config.log_json)?;

    info!("Starting storefront-sync v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    // Local cache
    let store = Arc::new(FileStore::new(&config.data_dir, config.storage_quota_bytes)?);
    let cache = LocalCache::new(store, &config.cache_namespace);
    info!(path = %config.data_dir.display(), namespace = %config.cache_namespace, "Local cache ready");

    // Remote adapter
    let remote = build_remote(&config)?;
    info!(backend = %remote.kind(), "Remote adapter ready");

    let coordinator = SyncCoordinator::new(cache, remote, config.sync_settings());
    let hydration = coordinator.init().await;
    info!(hydration = ?hydration, outdated = coordinator.is_outdated(), "Coordinator initialized");

    // Periodic staleness check
    let staleness_coordinator = coordinator.clone();
    let check_interval = Duration::from_secs(config.staleness_check_secs);
    let staleness_task = tokio::spawn(async move {
        info!(every = ?check_interval, "Staleness task started");
        let mut interval = tokio::time::interval(check_interval);
        interval.tick().await;
        loop {
            interval.tick().await;

            if !staleness_coordinator.is_outdated() {
                continue;
            }

            info!("Cached content is outdated, syncing");
            if !staleness_coordinator.force_sync().await {
                warn!("Sync failed, still serving cached content");
            }
        }
    });

    // Start HTTP server
    let http_server = HttpServer::new(coordinator.clone(), config.local_api_bind);
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve().await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All services started. Waiting for shutdown signal...");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    // Graceful shutdown
    info!("Initiating graceful shutdown...");

    staleness_task.abort();
    http_task.abort();

    if let Some(outcome) = coordinator.flush().await {
        info!(outcome = ?outcome, "Flushed pending write");
    }
    coordinator.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}
