//! Block Device and Volume Management
//!
//! Discovery, mounting and capacity queries for the removable destination
//! volume. Desktop hosts implement this by shelling out to `lsblk`, `mount`,
//! `umount` and `df`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A block device or partition reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    /// Kernel name (e.g. `sdb1`)
    pub name: String,
    /// Device node (e.g. `/dev/sdb1`)
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// `disk`, `part`, `rom`, ...
    pub device_type: String,
    pub mount_point: Option<PathBuf>,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub fstype: Option<String>,
    /// Attached through a USB bus or flagged removable
    pub is_usb: bool,
}

impl BlockDevice {
    pub fn is_partition(&self) -> bool {
        self.device_type == "part"
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    /// Human readable size (e.g. `14.9 GB`)
    pub fn display_size(&self) -> String {
        format_bytes(self.size)
    }
}

/// Outcome of a mount request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResult {
    pub success: bool,
    pub device: PathBuf,
    pub mount_point: PathBuf,
    pub filesystem: Option<String>,
    pub error: Option<String>,
    pub was_already_mounted: bool,
}

impl MountResult {
    pub fn mounted(device: PathBuf, mount_point: PathBuf, filesystem: Option<String>) -> Self {
        Self {
            success: true,
            device,
            mount_point,
            filesystem,
            error: None,
            was_already_mounted: false,
        }
    }

    pub fn failed(device: PathBuf, mount_point: PathBuf, error: impl Into<String>) -> Self {
        Self {
            success: false,
            device,
            mount_point,
            filesystem: None,
            error: Some(error.into()),
            was_already_mounted: false,
        }
    }
}

/// Capacity of the filesystem containing a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl StorageInfo {
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Volume manager trait
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// List block devices and partitions, excluding loop and ram devices
    async fn list_devices(&self) -> Result<Vec<BlockDevice>>;

    /// Where `device` is currently mounted, if anywhere
    async fn mounted_at(&self, device: &Path) -> Result<Option<PathBuf>>;

    /// Mount `device` at `mount_point`
    ///
    /// With `fstype` set to `None` the host auto-detects the filesystem.
    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        fstype: Option<&str>,
        options: &str,
    ) -> Result<()>;

    /// Unmount whatever is mounted at `target` (device or mount point)
    async fn unmount(&self, target: &Path) -> Result<()>;

    /// Capacity of the filesystem containing `path`
    async fn storage_info(&self, path: &Path) -> Result<StorageInfo>;
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
