//! First-run device discovery.

use crate::Result;
use bridge_traits::volume::{BlockDevice, VolumeManager};

/// USB devices that could hold backups: partitions, or whole disks carrying a filesystem
pub async fn usb_candidates(volumes: &dyn VolumeManager) -> Result<Vec<BlockDevice>> {
    Ok(volumes
        .list_devices()
        .await?
        .into_iter()
        .filter(|d| d.is_usb && (d.is_partition() || d.fstype.is_some()))
        .collect())
}

/// Pick the most likely backup target
///
/// Prefers partitions, then devices with a filesystem, then ext4, then the
/// largest of what remains.
pub fn suggest_best_device(candidates: &[BlockDevice]) -> Option<&BlockDevice> {
    fn narrow<'a>(
        pool: Vec<&'a BlockDevice>,
        keep: impl Fn(&BlockDevice) -> bool,
    ) -> Vec<&'a BlockDevice> {
        let narrowed: Vec<&BlockDevice> = pool.iter().copied().filter(|d| keep(d)).collect();
        if narrowed.is_empty() {
            pool
        } else {
            narrowed
        }
    }

    let pool: Vec<&BlockDevice> = candidates.iter().collect();
    let pool = narrow(pool, BlockDevice::is_partition);
    let pool = narrow(pool, |d| d.fstype.is_some());
    let pool = narrow(pool, |d| d.fstype.as_deref() == Some("ext4"));
    pool.into_iter().max_by_key(|d| d.size)
}

/// One-line summary of candidates for error messages
pub fn describe_candidates(candidates: &[BlockDevice]) -> String {
    if candidates.is_empty() {
        return "none found, connect a USB drive and restart".to_string();
    }

    candidates
        .iter()
        .map(|d| {
            let mut parts = vec![d.display_size()];
            if let Some(fstype) = &d.fstype {
                parts.push(fstype.clone());
            }
            if let Some(label) = d.label.as_ref().filter(|l| !l.is_empty()) {
                parts.push(label.clone());
            }
            format!("{} ({})", d.name, parts.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{usb_partition, FakeVolumes};

    fn device(name: &str, device_type: &str, fstype: Option<&str>, size_gb: u64) -> BlockDevice {
        BlockDevice {
            device_type: device_type.to_string(),
            fstype: fstype.map(str::to_string),
            size: size_gb * 1024 * 1024 * 1024,
            label: None,
            ..usb_partition(name)
        }
    }

    #[test]
    fn test_suggestion_prefers_ext4_partitions() {
        let candidates = vec![
            device("sdb", "disk", Some("ext4"), 500),
            device("sdc1", "part", Some("vfat"), 256),
            device("sdd1", "part", Some("ext4"), 64),
            device("sdd2", "part", Some("ext4"), 128),
        ];

        assert_eq!(suggest_best_device(&candidates).unwrap().name, "sdd2");
    }

    #[test]
    fn test_suggestion_falls_back_to_largest() {
        let candidates = vec![
            device("sdb", "disk", None, 32),
            device("sdc", "disk", None, 64),
        ];
        assert_eq!(suggest_best_device(&candidates).unwrap().name, "sdc");
        assert!(suggest_best_device(&[]).is_none());
    }

    #[test]
    fn test_describe_candidates() {
        let candidates = vec![usb_partition("sdb1")];
        assert_eq!(
            describe_candidates(&candidates),
            "sdb1 (32.0 GB, ext4, BACKUPS)"
        );
        assert!(describe_candidates(&[]).starts_with("none found"));
    }

    #[tokio::test]
    async fn test_candidates_exclude_internal_and_bare_disks() {
        let internal = BlockDevice {
            is_usb: false,
            ..usb_partition("sda1")
        };
        let bare_disk = device("sdb", "disk", None, 32);
        let volumes = FakeVolumes::new(vec![internal, bare_disk, usb_partition("sdb1")]);

        let candidates = usb_candidates(&volumes).await.unwrap();
        let names: Vec<&str> = candidates.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdb1"]);
    }
}
