//! # Storage Validation
//!
//! Checks the destination is usable before any artifact is copied to it:
//! it exists, is a directory, accepts writes and has enough free space.
//! A destination that is not a mount point only produces a warning.

use crate::{Result, ServiceError};
use bridge_traits::{
    storage::FileSystemAccess,
    volume::{format_bytes, StorageInfo, VolumeManager},
};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const WRITE_TEST_NAME: &str = ".write_test";
const WRITE_TEST_DATA: &[u8] = b"test";

/// Free space below this share of the volume is flagged
const LOW_FREE_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct StorageReport {
    pub path: PathBuf,
    pub info: StorageInfo,
    pub free_percent: f64,
    pub is_mount_point: bool,
    pub writable: bool,
    pub warnings: Vec<String>,
}

pub struct StorageValidator {
    fs: Arc<dyn FileSystemAccess>,
    volumes: Arc<dyn VolumeManager>,
    min_free_space_bytes: u64,
}

impl StorageValidator {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        volumes: Arc<dyn VolumeManager>,
        min_free_space_bytes: u64,
    ) -> Self {
        Self {
            fs,
            volumes,
            min_free_space_bytes,
        }
    }

    /// Fail unless `path` is a writable directory with enough free space
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn validate(&self, path: &Path) -> Result<StorageReport> {
        let report = self.inspect(path).await?;

        if !report.writable {
            return Err(ServiceError::StorageInvalid(format!(
                "Path is not writable: {}",
                path.display()
            )));
        }
        if report.info.free_bytes < self.min_free_space_bytes {
            return Err(ServiceError::StorageInvalid(format!(
                "Insufficient free space: {} < {}",
                format_bytes(report.info.free_bytes),
                format_bytes(self.min_free_space_bytes)
            )));
        }

        info!(
            free = %format_bytes(report.info.free_bytes),
            total = %format_bytes(report.info.total_bytes),
            free_percent = %format!("{:.1}", report.free_percent),
            "Storage space"
        );
        Ok(report)
    }

    /// Describe the volume holding `path` without enforcing any threshold
    ///
    /// Only a missing path or a non-directory is an error.
    pub async fn inspect(&self, path: &Path) -> Result<StorageReport> {
        let display = path.display();

        let metadata = match self.fs.metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => {
                return Err(ServiceError::StorageInvalid(format!(
                    "Path does not exist: {}",
                    display
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_directory {
            return Err(ServiceError::StorageInvalid(format!(
                "Path is not a directory: {}",
                display
            )));
        }

        let mut warnings = Vec::new();
        let is_mount_point = self.fs.is_mount_point(path).await.unwrap_or(false);
        if !is_mount_point {
            warn!("Destination is not a mount point");
            warnings.push(format!(
                "{} is not a mount point; backups may land on the system disk",
                display
            ));
        }

        let writable = match self.check_writable(path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Write check failed");
                false
            }
        };

        let info = self.volumes.storage_info(path).await?;
        let free_percent = info.free_percent();
        if free_percent < LOW_FREE_PERCENT {
            warn!(free_percent, "Low free space");
            warnings.push(format!("Low free space: only {:.1}% free", free_percent));
        }

        Ok(StorageReport {
            path: path.to_path_buf(),
            info,
            free_percent,
            is_mount_point,
            writable,
            warnings,
        })
    }

    async fn check_writable(&self, dir: &Path) -> bridge_traits::error::Result<()> {
        let marker = dir.join(WRITE_TEST_NAME);
        self.fs
            .write_file(&marker, Bytes::from_static(WRITE_TEST_DATA))
            .await?;
        self.fs.delete_file(&marker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{usb_partition, FakeVolumes};
    use bridge_desktop::TokioFileSystem;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn validator(volumes: FakeVolumes, min_free: u64) -> StorageValidator {
        StorageValidator::new(
            Arc::new(TokioFileSystem::new()),
            Arc::new(volumes),
            min_free,
        )
    }

    #[tokio::test]
    async fn test_plain_directory_passes_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let report = validator(FakeVolumes::new(vec![usb_partition("sdb1")]), GIB)
            .validate(dir.path())
            .await
            .unwrap();

        assert!(!report.is_mount_point);
        assert_eq!(report.warnings.len(), 1);
        assert!((report.free_percent - 60.0).abs() < 0.01);
        assert!(!dir.path().join(WRITE_TEST_NAME).exists());
    }

    #[tokio::test]
    async fn test_missing_path_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let result = validator(FakeVolumes::new(Vec::new()), GIB)
            .validate(&dir.path().join("absent"))
            .await;

        match result {
            Err(ServiceError::StorageInvalid(message)) => {
                assert!(message.starts_with("Path does not exist"))
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.path)),
        }
    }

    #[tokio::test]
    async fn test_file_is_not_a_destination() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let result = validator(FakeVolumes::new(Vec::new()), GIB)
            .validate(&file)
            .await;
        assert!(matches!(result, Err(ServiceError::StorageInvalid(_))));
    }

    #[tokio::test]
    async fn test_insufficient_free_space_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = FakeVolumes::new(Vec::new()).with_storage(StorageInfo {
            total_bytes: 8 * GIB,
            used_bytes: 8 * GIB - 100 * 1024 * 1024,
            free_bytes: 100 * 1024 * 1024,
        });

        let result = validator(volumes, GIB).validate(dir.path()).await;
        match result {
            Err(ServiceError::StorageInvalid(message)) => {
                assert_eq!(message, "Insufficient free space: 100.0 MB < 1.0 GB")
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.path)),
        }
    }

    #[tokio::test]
    async fn test_low_free_percent_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = FakeVolumes::new(Vec::new()).with_storage(StorageInfo {
            total_bytes: 100 * GIB,
            used_bytes: 95 * GIB,
            free_bytes: 5 * GIB,
        });

        let report = validator(volumes, GIB).validate(dir.path()).await.unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.starts_with("Low free space: only 5.0% free")));
    }

    #[tokio::test]
    async fn test_inspect_reports_without_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = FakeVolumes::new(Vec::new()).with_storage(StorageInfo {
            total_bytes: 8 * GIB,
            used_bytes: 8 * GIB - 100 * 1024 * 1024,
            free_bytes: 100 * 1024 * 1024,
        });

        let report = validator(volumes, GIB).inspect(dir.path()).await.unwrap();

        assert!(report.writable);
        assert_eq!(report.info.free_bytes, 100 * 1024 * 1024);
        assert!(report.free_percent < 10.0);
        assert_eq!(report.warnings.len(), 2);
        assert!(!dir.path().join(WRITE_TEST_NAME).exists());
    }
}
