//! Volume manager backed by `lsblk`, `mount`, `umount` and `df`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    volume::{BlockDevice, StorageInfo, VolumeManager},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Device name prefixes that never hold user data
const IGNORED_PREFIXES: &[&str] = &["loop", "ram", "zram"];

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkNode>,
}

#[derive(Debug, Deserialize)]
struct LsblkNode {
    name: String,
    #[serde(default)]
    size: Option<serde_json::Value>,
    #[serde(rename = "type", default)]
    device_type: String,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    children: Vec<LsblkNode>,
}

/// Linux volume manager shelling out to util-linux tools
pub struct LsblkVolumeManager {
    sysfs_block: PathBuf,
    proc_mounts: PathBuf,
}

impl LsblkVolumeManager {
    pub fn new() -> Self {
        Self {
            sysfs_block: PathBuf::from("/sys/block"),
            proc_mounts: PathBuf::from("/proc/mounts"),
        }
    }

    /// Override the sysfs and mount table locations
    pub fn with_paths(sysfs_block: impl Into<PathBuf>, proc_mounts: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_block: sysfs_block.into(),
            proc_mounts: proc_mounts.into(),
        }
    }

    async fn run(program: &str, args: &[&str]) -> Result<String> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!(command = %command_line, "Running command");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| BridgeError::CommandFailed {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BridgeError::CommandFailed {
                command: command_line,
                message: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Parse `lsblk -J` output into a flat device list (without USB detection)
    fn parse_lsblk(json: &str) -> Result<Vec<(BlockDevice, String)>> {
        let output: LsblkOutput = serde_json::from_str(json).map_err(|e| {
            BridgeError::OperationFailed(format!("Unparseable lsblk output: {}", e))
        })?;

        let mut devices = Vec::new();
        for node in output.blockdevices {
            let base = node.name.clone();
            flatten(node, &base, &mut devices);
        }
        Ok(devices)
    }

    async fn is_usb(&self, base: &str) -> bool {
        let device_dir = self.sysfs_block.join(base);

        if let Ok(resolved) = tokio::fs::canonicalize(device_dir.join("device")).await {
            if resolved.to_string_lossy().contains("usb") {
                return true;
            }
        }

        match tokio::fs::read_to_string(device_dir.join("removable")).await {
            Ok(flag) => flag.trim() == "1",
            Err(_) => false,
        }
    }
}

impl Default for LsblkVolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten(node: LsblkNode, base: &str, out: &mut Vec<(BlockDevice, String)>) {
    if IGNORED_PREFIXES.iter().any(|p| node.name.starts_with(p)) {
        return;
    }

    let size = match &node.size {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    let device = BlockDevice {
        path: PathBuf::from("/dev").join(&node.name),
        name: node.name,
        size,
        device_type: node.device_type,
        mount_point: node.mountpoint.filter(|m| !m.is_empty()).map(PathBuf::from),
        label: node.label.filter(|l| !l.is_empty()),
        uuid: node.uuid.filter(|u| !u.is_empty()),
        fstype: node.fstype.filter(|f| !f.is_empty()),
        is_usb: false,
    };
    out.push((device, base.to_string()));

    for child in node.children {
        flatten(child, base, out);
    }
}

/// Decode the octal escapes `/proc/mounts` uses for spaces and tabs
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\134", "\\")
}

fn parse_mount_table(table: &str, device: &Path) -> Option<PathBuf> {
    let device = device.to_string_lossy();
    table.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        let target = fields.next()?;
        (unescape_mount_field(source) == device)
            .then(|| PathBuf::from(unescape_mount_field(target)))
    })
}

fn parse_df(output: &str) -> Result<StorageInfo> {
    let line = output
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| BridgeError::OperationFailed("Empty df output".to_string()))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .map(|v| v.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| BridgeError::OperationFailed(format!("Unparseable df output: {}", e)))?;

    match values.as_slice() {
        [total, used, free, ..] => Ok(StorageInfo {
            total_bytes: *total,
            used_bytes: *used,
            free_bytes: *free,
        }),
        _ => Err(BridgeError::OperationFailed(format!(
            "Unexpected df output: {}",
            line
        ))),
    }
}

#[async_trait]
impl VolumeManager for LsblkVolumeManager {
    async fn list_devices(&self) -> Result<Vec<BlockDevice>> {
        let json = Self::run(
            "lsblk",
            &["-J", "-b", "-o", "NAME,SIZE,TYPE,MOUNTPOINT,LABEL,UUID,FSTYPE"],
        )
        .await?;

        let mut devices = Vec::new();
        for (mut device, base) in Self::parse_lsblk(&json)? {
            device.is_usb = self.is_usb(&base).await;
            devices.push(device);
        }

        debug!(count = devices.len(), "Listed block devices");
        Ok(devices)
    }

    async fn mounted_at(&self, device: &Path) -> Result<Option<PathBuf>> {
        let table = tokio::fs::read_to_string(&self.proc_mounts).await?;
        Ok(parse_mount_table(&table, device))
    }

    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        fstype: Option<&str>,
        options: &str,
    ) -> Result<()> {
        let device_arg = device.to_string_lossy();
        let target_arg = mount_point.to_string_lossy();

        let mut args: Vec<&str> = Vec::new();
        if let Some(fstype) = fstype {
            args.extend(["-t", fstype]);
        }
        if !options.is_empty() {
            args.extend(["-o", options]);
        }
        args.push(&device_arg);
        args.push(&target_arg);

        Self::run("mount", &args).await?;
        info!(device = ?device, mount_point = ?mount_point, fstype = ?fstype, "Mounted device");
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<()> {
        let target_arg = target.to_string_lossy();
        match Self::run("umount", &[&target_arg]).await {
            Ok(_) => {
                info!(target = ?target, "Unmounted");
                Ok(())
            }
            Err(e) => {
                warn!(target = ?target, error = %e, "Unmount failed");
                Err(e)
            }
        }
    }

    async fn storage_info(&self, path: &Path) -> Result<StorageInfo> {
        let path_arg = path.to_string_lossy();
        let output = Self::run("df", &["-B1", "--output=size,used,avail", &path_arg]).await?;
        parse_df(&output)
    }
}
