//! # Destination Preparation
//!
//! Gets the configured block device mounted at the backup mount point.
//!
//! ## Overview
//!
//! [`DestinationPreparer::prepare`] resolves `/dev/<name>` against the devices
//! the host reports, unmounts it from any other location, creates the mount
//! point and mounts it. The detected filesystem type is tried first; when that
//! mount fails the host is asked to auto-detect instead. The outcome is always
//! a [`MountResult`]; only an unknown device or a host failure is an error.

use crate::{Result, ServiceError};
use bridge_traits::{
    storage::FileSystemAccess,
    volume::{BlockDevice, MountResult, VolumeManager},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const DEFAULT_UNMOUNT_ATTEMPTS: u32 = 3;
pub const DEFAULT_UNMOUNT_PAUSE: Duration = Duration::from_secs(1);

pub struct DestinationPreparer {
    volumes: Arc<dyn VolumeManager>,
    fs: Arc<dyn FileSystemAccess>,
    mount_point: PathBuf,
    options: String,
    unmount_attempts: u32,
    unmount_pause: Duration,
}

impl DestinationPreparer {
    pub fn new(
        volumes: Arc<dyn VolumeManager>,
        fs: Arc<dyn FileSystemAccess>,
        mount_point: impl Into<PathBuf>,
        options: impl Into<String>,
    ) -> Self {
        Self {
            volumes,
            fs,
            mount_point: mount_point.into(),
            options: options.into(),
            unmount_attempts: DEFAULT_UNMOUNT_ATTEMPTS,
            unmount_pause: DEFAULT_UNMOUNT_PAUSE,
        }
    }

    pub fn with_unmount_policy(mut self, attempts: u32, pause: Duration) -> Self {
        self.unmount_attempts = attempts.max(1);
        self.unmount_pause = pause;
        self
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Mount `device_name` (e.g. `sdb1`) at the mount point
    #[instrument(skip(self), fields(mount_point = %self.mount_point.display()))]
    pub async fn prepare(&self, device_name: &str) -> Result<MountResult> {
        let device_path = PathBuf::from("/dev").join(device_name);
        let device = self.find_device(device_name, &device_path).await?;
        let fstype = device.fstype.clone().filter(|fs| !fs.is_empty());

        if let Some(current) = self.volumes.mounted_at(&device_path).await? {
            if current == self.mount_point {
                info!(device = %device_name, "Device already mounted at destination");
                let mut result =
                    MountResult::mounted(device_path, self.mount_point.clone(), fstype);
                result.was_already_mounted = true;
                return Ok(result);
            }

            warn!(
                device = %device_name,
                current = %current.display(),
                "Device mounted elsewhere, remounting"
            );
            if !self.unmount_with_retries(&device_path).await {
                return Ok(MountResult::failed(
                    device_path,
                    self.mount_point.clone(),
                    format!("Failed to unmount from {}", current.display()),
                ));
            }
        }

        if let Err(e) = self.fs.create_dir_all(&self.mount_point).await {
            return Ok(MountResult::failed(
                device_path,
                self.mount_point.clone(),
                format!(
                    "Failed to prepare mount point {}: {}",
                    self.mount_point.display(),
                    e
                ),
            ));
        }

        info!(device = %device_name, fstype = ?fstype, "Mounting device");
        if let Err(e) = self.mount(&device_path, fstype.as_deref()).await {
            return Ok(MountResult::failed(
                device_path,
                self.mount_point.clone(),
                format!("Mount command failed for {}: {}", device_name, e),
            ));
        }

        match self.volumes.mounted_at(&device_path).await? {
            Some(current) if current == self.mount_point => {
                info!(device = %device_name, "Device mounted");
                Ok(MountResult::mounted(
                    device_path,
                    self.mount_point.clone(),
                    fstype,
                ))
            }
            _ => {
                let mut result = MountResult::failed(
                    device_path,
                    self.mount_point.clone(),
                    "Mount appeared successful but device not found at mount point",
                );
                result.filesystem = fstype;
                Ok(result)
            }
        }
    }

    async fn find_device(&self, name: &str, path: &Path) -> Result<BlockDevice> {
        self.volumes
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.name == name || d.path == path)
            .ok_or_else(|| ServiceError::DeviceNotFound(path.display().to_string()))
    }

    async fn mount(&self, device: &Path, fstype: Option<&str>) -> Result<()> {
        match self
            .volumes
            .mount(device, &self.mount_point, fstype, &self.options)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if fstype.is_some() => {
                warn!(
                    error = %e,
                    "Mount with detected filesystem failed, retrying with auto-detect"
                );
                self.volumes
                    .mount(device, &self.mount_point, None, &self.options)
                    .await
                    .map_err(Into::into)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn unmount_with_retries(&self, device: &Path) -> bool {
        for attempt in 1..=self.unmount_attempts {
            match self.volumes.unmount(device).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(attempt, error = %e, "Unmount attempt failed");
                    if attempt < self.unmount_attempts {
                        tokio::time::sleep(self.unmount_pause).await;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{usb_partition, FakeVolumes};
    use bridge_desktop::TokioFileSystem;

    fn preparer(volumes: Arc<FakeVolumes>, mount_point: &Path) -> DestinationPreparer {
        DestinationPreparer::new(
            volumes,
            Arc::new(TokioFileSystem::new()),
            mount_point,
            "defaults,nofail",
        )
        .with_unmount_policy(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_unknown_device_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(FakeVolumes::new(vec![usb_partition("sdb1")]));

        let result = preparer(volumes, dir.path()).prepare("sdz9").await;
        assert!(matches!(result, Err(ServiceError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_already_mounted_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(
            FakeVolumes::new(vec![usb_partition("sdb1")]).mounted_at_start(dir.path()),
        );

        let result = preparer(volumes.clone(), dir.path())
            .prepare("sdb1")
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.was_already_mounted);
        assert_eq!(result.filesystem.as_deref(), Some("ext4"));
        assert!(volumes.mount_calls().is_empty());
    }

    #[tokio::test]
    async fn test_mounts_with_detected_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let mount_point = dir.path().join("backups");
        let volumes = Arc::new(FakeVolumes::new(vec![usb_partition("sdb1")]));

        let result = preparer(volumes.clone(), &mount_point)
            .prepare("sdb1")
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert!(!result.was_already_mounted);
        assert!(mount_point.is_dir());
        assert_eq!(volumes.mount_calls(), vec![Some("ext4".to_string())]);
    }

    #[tokio::test]
    async fn test_falls_back_to_auto_detect() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(FakeVolumes::new(vec![usb_partition("sdb1")]).reject_typed_mounts());

        let result = preparer(volumes.clone(), dir.path())
            .prepare("sdb1")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(volumes.mount_calls(), vec![Some("ext4".to_string()), None]);
    }

    #[tokio::test]
    async fn test_remounts_from_another_location() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(
            FakeVolumes::new(vec![usb_partition("sdb1")]).mounted_at_start("/media/usb0"),
        );

        let result = preparer(volumes.clone(), dir.path())
            .prepare("sdb1")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(volumes.unmount_calls(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_unmount_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(
            FakeVolumes::new(vec![usb_partition("sdb1")])
                .mounted_at_start("/media/usb0")
                .busy(),
        );

        let result = preparer(volumes.clone(), dir.path())
            .prepare("sdb1")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Failed to unmount from /media/usb0")
        );
        assert_eq!(volumes.unmount_calls(), 3);
        assert!(volumes.mount_calls().is_empty());
    }

    #[tokio::test]
    async fn test_mount_not_visible_afterwards_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = Arc::new(FakeVolumes::new(vec![usb_partition("sdb1")]).phantom_mounts());

        let result = preparer(volumes, dir.path()).prepare("sdb1").await.unwrap();
        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .contains("device not found at mount point"));
    }
}
