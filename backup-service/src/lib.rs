//! Backup service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (filesystem, file
//! events, notifications, block devices) into the backup engine and owns the
//! steps that happen before monitoring starts: getting the destination volume
//! mounted and checking it can take backups. Linux hosts enable the
//! `desktop-shims` feature (on by default), which builds the bundle from
//! `bridge-desktop`.

pub mod daemon;
pub mod discovery;
pub mod error;
pub mod mount;
pub mod storage;

#[cfg(test)]
mod testing;

pub use daemon::run_daemon;
pub use discovery::{describe_candidates, suggest_best_device};
pub use error::{Result, ServiceError};
pub use mount::DestinationPreparer;
pub use storage::{StorageReport, StorageValidator};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{
    notification::{Notification, NotificationSink},
    storage::FileSystemAccess,
    volume::{BlockDevice, MountResult, VolumeManager},
    watch::FileEventSource,
};
use core_backup::{
    artifact::list_artifacts, Artifact, ArtifactRun, RetentionStats, SyncConfig, SyncCoordinator,
};
use core_runtime::{config::BackupConfig, events::EventBus};
use serde::Serialize;
use tracing::{info, warn};

/// Artifacts on both sides, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct BackupListing {
    pub source: Vec<Artifact>,
    pub destination: RetentionStats,
}

/// `sdb1` and `/dev/sdb1` name the same device
fn device_path(device: &str) -> PathBuf {
    let device = device.trim();
    if device.starts_with('/') {
        PathBuf::from(device)
    } else {
        PathBuf::from("/dev").join(device)
    }
}

/// Aggregated handle to all bridge dependencies the service requires.
pub struct BackupDependencies {
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub watcher: Arc<dyn FileEventSource>,
    pub notifier: Arc<dyn NotificationSink>,
    pub volumes: Arc<dyn VolumeManager>,
}

impl BackupDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        filesystem: Arc<dyn FileSystemAccess>,
        watcher: Arc<dyn FileEventSource>,
        notifier: Arc<dyn NotificationSink>,
        volumes: Arc<dyn VolumeManager>,
    ) -> Self {
        Self {
            filesystem,
            watcher,
            notifier,
            volumes,
        }
    }
}

#[cfg(feature = "desktop-shims")]
impl BackupDependencies {
    /// Linux adapters.
    ///
    /// Notifications go through the supervisor API when `SUPERVISOR_TOKEN` is
    /// set and to the log otherwise.
    pub fn desktop(config: &BackupConfig) -> Result<Self> {
        use bridge_desktop::{
            LogNotifier, LsblkVolumeManager, NotifyWatcher, ReqwestHttpClient,
            SupervisorNotifier, TokioFileSystem,
        };

        let http = Arc::new(ReqwestHttpClient::new()?);
        let notifier: Arc<dyn NotificationSink> =
            match SupervisorNotifier::from_env(http, config.notify_service.clone()) {
                Some(notifier) => {
                    info!(
                        service = %config.notify_service,
                        "Sending notifications through the supervisor"
                    );
                    Arc::new(notifier)
                }
                None => {
                    warn!("SUPERVISOR_TOKEN not set, notifications will only be logged");
                    Arc::new(LogNotifier::new(config.notify_service.clone()))
                }
            };

        Ok(Self::new(
            Arc::new(TokioFileSystem::new()),
            Arc::new(NotifyWatcher::new()),
            notifier,
            Arc::new(LsblkVolumeManager::new()),
        ))
    }
}

/// Primary façade used by the binary.
#[derive(Clone)]
pub struct BackupService {
    config: Arc<BackupConfig>,
    deps: Arc<BackupDependencies>,
    event_bus: EventBus,
}

impl BackupService {
    pub fn new(config: BackupConfig, deps: BackupDependencies) -> Self {
        Self {
            config: Arc::new(config),
            deps: Arc::new(deps),
            event_bus: EventBus::default(),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<BackupDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// A coordinator over the configured source and mount point
    pub fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(
            SyncConfig::from(self.config.as_ref()),
            self.deps.filesystem.clone(),
            self.deps.notifier.clone(),
            self.event_bus.clone(),
        )
    }

    pub async fn list_usb_candidates(&self) -> Result<Vec<BlockDevice>> {
        discovery::usb_candidates(self.deps.volumes.as_ref()).await
    }

    /// Mount the configured device at the mount point
    ///
    /// Without a configured device this lists the candidates, tells the user
    /// and fails with [`ServiceError::DeviceNotConfigured`].
    pub async fn prepare_destination(&self) -> Result<MountResult> {
        if !self.config.is_device_configured() {
            return Err(self.first_run().await);
        }

        self.mount_device(self.config.usb_device.trim(), None).await
    }

    /// Mount `device` at `mount_point`, or at the configured mount point
    pub async fn mount_device(
        &self,
        device: &str,
        mount_point: Option<&Path>,
    ) -> Result<MountResult> {
        let target = mount_point
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.mount_point.clone());
        let preparer = DestinationPreparer::new(
            self.deps.volumes.clone(),
            self.deps.filesystem.clone(),
            target,
            self.config.mount_options.clone(),
        );

        let name = device.trim().trim_start_matches("/dev/");
        let result = preparer.prepare(name).await?;
        if !result.success {
            let error = result
                .error
                .unwrap_or_else(|| "Unknown mount error".to_string());
            return Err(ServiceError::MountFailed(error));
        }
        Ok(result)
    }

    pub async fn unmount_device(&self, device: &str) -> Result<()> {
        let path = device_path(device);
        self.deps.volumes.unmount(&path).await?;
        info!(device = %path.display(), "Device unmounted");
        Ok(())
    }

    /// Describe the volume holding `path` (the mount point by default)
    pub async fn inspect_storage(&self, path: Option<&Path>) -> Result<StorageReport> {
        let path = path.unwrap_or(&self.config.mount_point);
        self.storage_validator().inspect(path).await
    }

    /// Source artifacts and destination statistics
    pub async fn list_backups(&self) -> Result<BackupListing> {
        let coordinator = self.coordinator();
        let filter = coordinator.config().filter();

        let source = match list_artifacts(
            self.deps.filesystem.as_ref(),
            &self.config.source_dir,
            &filter,
        )
        .await
        {
            Ok(artifacts) => artifacts,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let destination = coordinator.retention().stats().await?;

        Ok(BackupListing {
            source,
            destination,
        })
    }

    /// Run one source backup through the pipeline, retention included
    ///
    /// Refuses to copy over an existing destination file unless `force` is set.
    pub async fn copy_backup(&self, name: &str, force: bool) -> Result<ArtifactRun> {
        if Path::new(name).file_name().map_or(true, |n| n != name) {
            return Err(ServiceError::BackupNotFound(name.to_string()));
        }

        let source = self.config.source_dir.join(name);
        if !self.deps.filesystem.exists(&source).await? {
            return Err(ServiceError::BackupNotFound(name.to_string()));
        }
        let destination = self.config.mount_point.join(name);
        if !force && self.deps.filesystem.exists(&destination).await? {
            return Err(ServiceError::BackupExists(name.to_string()));
        }

        Ok(self.coordinator().process_artifact(&source, true).await)
    }

    pub async fn validate_storage(&self) -> Result<StorageReport> {
        self.storage_validator()
            .validate(&self.config.mount_point)
            .await
    }

    fn storage_validator(&self) -> StorageValidator {
        StorageValidator::new(
            self.deps.filesystem.clone(),
            self.deps.volumes.clone(),
            self.config.min_free_space_bytes(),
        )
    }

    async fn first_run(&self) -> ServiceError {
        let candidates = match self.list_usb_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Could not list block devices");
                Vec::new()
            }
        };

        for device in &candidates {
            info!(
                device = %device.name,
                size = %device.display_size(),
                fstype = device.fstype.as_deref().unwrap_or("unknown"),
                mounted = ?device.mount_point,
                "USB device available"
            );
        }

        let described = describe_candidates(&candidates);
        let mut message = format!(
            "No USB device configured. Available devices: {}",
            described
        );
        if let Some(best) = suggest_best_device(&candidates) {
            message.push_str(&format!("\nSuggested: usb_device: \"{}\"", best.name));
        }
        if let Err(e) = self
            .deps
            .notifier
            .send(Notification::warning("Backup Sync Setup Required", message))
            .await
        {
            warn!(error = %e, "Could not send notification");
        }

        ServiceError::DeviceNotConfigured {
            candidates: described,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{usb_partition, FakeVolumes, FakeWatcher};
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::error::Result as BridgeResult;
    use mockall::mock;

    mock! {
        pub Sink {}

        #[async_trait]
        impl NotificationSink for Sink {
            async fn send(&self, notification: Notification) -> BridgeResult<()>;
            async fn test_connection(&self) -> BridgeResult<bool>;
        }
    }

    fn service(src: &Path, dst: &Path, volumes: FakeVolumes) -> BackupService {
        let mut sink = MockSink::new();
        sink.expect_send().returning(|_| Ok(()));
        let config = BackupConfig::builder()
            .usb_device("sdb1")
            .source_dir(src)
            .mount_point(dst)
            .wait_time(0)
            .retry_delay(0)
            .stability_max_samples(0)
            .build()
            .unwrap();
        let deps = BackupDependencies::new(
            Arc::new(TokioFileSystem::new()),
            Arc::new(FakeWatcher::new(Vec::new())),
            Arc::new(sink),
            Arc::new(volumes),
        );
        BackupService::new(config, deps)
    }

    #[test]
    fn test_device_path_accepts_both_forms() {
        assert_eq!(device_path("sdb1"), PathBuf::from("/dev/sdb1"));
        assert_eq!(device_path(" /dev/sdc1 "), PathBuf::from("/dev/sdc1"));
    }

    #[tokio::test]
    async fn test_copy_backup_refuses_existing_without_force() {
        let (src, dst) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        std::fs::write(src.path().join("a.tar"), vec![3u8; 64]).unwrap();
        std::fs::write(dst.path().join("a.tar"), b"older").unwrap();
        let service = service(src.path(), dst.path(), FakeVolumes::new(Vec::new()));

        let refused = service.copy_backup("a.tar", false).await;
        assert!(matches!(refused, Err(ServiceError::BackupExists(_))));
        assert_eq!(std::fs::read(dst.path().join("a.tar")).unwrap(), b"older");

        let run = service.copy_backup("a.tar", true).await.unwrap();
        assert!(run.succeeded());
        assert_eq!(std::fs::read(dst.path().join("a.tar")).unwrap(), vec![3u8; 64]);
    }

    #[tokio::test]
    async fn test_copy_backup_requires_a_plain_source_name() {
        let (src, dst) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let service = service(src.path(), dst.path(), FakeVolumes::new(Vec::new()));

        for name in ["missing.tar", "../escape.tar", "nested/a.tar"] {
            let result = service.copy_backup(name, false).await;
            assert!(matches!(result, Err(ServiceError::BackupNotFound(_))), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_list_backups_covers_both_sides() {
        let (src, dst) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        std::fs::write(src.path().join("one.tar"), b"1").unwrap();
        std::fs::write(src.path().join("two.tar.gz"), b"22").unwrap();
        std::fs::write(src.path().join("skip.log"), b"x").unwrap();
        std::fs::write(dst.path().join("one.tar"), b"1").unwrap();
        let service = service(src.path(), dst.path(), FakeVolumes::new(Vec::new()));

        let listing = service.list_backups().await.unwrap();
        let mut names: Vec<&str> = listing.source.iter().map(|a| a.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["one.tar", "two.tar.gz"]);
        assert_eq!(listing.destination.count, 1);
        assert_eq!(listing.destination.total_bytes, 1);
    }

    #[tokio::test]
    async fn test_mount_and_unmount_device() {
        let (src, dst) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let other = dst.path().join("other");
        let service = service(
            src.path(),
            dst.path(),
            FakeVolumes::new(vec![usb_partition("sdb1")]),
        );

        let result = service
            .mount_device("/dev/sdb1", Some(&other))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.mount_point, other);
        assert!(other.is_dir());

        service.unmount_device("sdb1").await.unwrap();
        let missing = service.mount_device("sdz9", None).await;
        assert!(matches!(missing, Err(ServiceError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_inspect_storage_defaults_to_mount_point() {
        let (src, dst) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let service = service(src.path(), dst.path(), FakeVolumes::new(Vec::new()));

        let report = service.inspect_storage(None).await.unwrap();
        assert_eq!(report.path, dst.path());
        assert!(report.writable);
        assert!((report.free_percent - 60.0).abs() < 0.01);
    }
}
