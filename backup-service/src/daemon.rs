//! # Daemon
//!
//! The long-running service: prepare the destination, optionally copy what
//! is already in the source directory, then watch for new backups until
//! `shutdown` is cancelled.
//!
//! Destination writability is checked once, by storage validation.

use crate::{BackupService, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_daemon(service: &BackupService, shutdown: CancellationToken) -> Result<()> {
    let config = service.config();

    let mount = service.prepare_destination().await?;
    info!(
        device = %mount.device.display(),
        mount_point = %mount.mount_point.display(),
        filesystem = mount.filesystem.as_deref().unwrap_or("unknown"),
        already_mounted = mount.was_already_mounted,
        "Destination ready"
    );

    let report = service.validate_storage().await?;
    for warning in &report.warnings {
        warn!(warning = %warning, "Storage warning");
    }

    let coordinator = Arc::new(service.coordinator());

    if config.sync_existing_on_start {
        match coordinator.sync_existing().await {
            Ok(synced) => info!(count = synced.len(), "Startup sync finished"),
            Err(e) => error!(error = %e, "Startup sync failed"),
        }
    }

    if shutdown.is_cancelled() {
        info!("Shutdown requested before monitoring started");
        return Ok(());
    }

    let watcher = service.dependencies().watcher.clone();
    let events = watcher.subscribe(&config.source_dir).await?;
    let outcome = coordinator.run(events, shutdown).await;

    if let Err(e) = watcher.unsubscribe(&config.source_dir).await {
        warn!(error = %e, "Could not stop watching source directory");
    }
    outcome.map_err(Into::into)
}
