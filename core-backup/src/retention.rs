//! # Retention Manager
//!
//! Bounds the number of artifacts held at the destination.
//!
//! ## Overview
//!
//! The destination set is always derived by listing the directory. Artifacts are
//! ordered oldest first (modification time, then name) and the oldest
//! `count - max` become delete candidates. The same listing feeds planning and
//! statistics, so the two never disagree.
//!
//! Deletion tolerates individual failures: an undeletable file is logged and
//! reported, and the pass continues with the next candidate.
//!
//! A cap of zero is only honoured when the caller forces the pass. A zero cap in
//! an ordinary pass over a non-empty set is refused with
//! [`BackupError::UnsafeRetentionCap`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::RetentionManager;
//!
//! let manager = RetentionManager::new(fs, "/media/backups", 5);
//! let plan = manager.plan().await?;
//! println!("would delete {:?}", plan.delete_names());
//!
//! let report = manager.apply(false).await?;
//! println!("deleted {}", report.deleted.len());
//! ```

use crate::artifact::{checksum_file, list_artifacts, Artifact, ArtifactFilter};
use crate::{BackupError, Result};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::events::{CoreEvent, EventBus, RetentionEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Plans and reports
// ============================================================================

/// A computed, not yet executed, cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    pub current_count: usize,
    pub max_allowed: u32,
    /// Oldest first
    pub to_delete: Vec<Artifact>,
    /// Oldest first
    pub to_keep: Vec<Artifact>,
    pub freed_bytes: u64,
}

impl RetentionPlan {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty()
    }

    pub fn delete_names(&self) -> Vec<String> {
        self.to_delete.iter().map(|a| a.name.clone()).collect()
    }

    pub fn keep_names(&self) -> Vec<String> {
        self.to_keep.iter().map(|a| a.name.clone()).collect()
    }
}

/// Partition artifacts (already sorted oldest first) against a cap
pub fn plan_retention(artifacts: Vec<Artifact>, max_allowed: u32) -> RetentionPlan {
    let current_count = artifacts.len();
    let excess = current_count.saturating_sub(max_allowed as usize);

    let mut to_delete = artifacts;
    let to_keep = to_delete.split_off(excess);
    let freed_bytes = to_delete.iter().map(|a| a.size).sum();

    RetentionPlan {
        current_count,
        max_allowed,
        to_delete,
        to_keep,
        freed_bytes,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of an executed pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Deleted names, oldest first
    pub deleted: Vec<String>,
    pub failures: Vec<RetentionFailure>,
    pub freed_bytes: u64,
    /// Artifacts left on the destination
    pub kept: usize,
}

impl RetentionReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionStats {
    pub count: usize,
    pub total_bytes: u64,
    pub oldest: Option<Artifact>,
    pub newest: Option<Artifact>,
    /// Oldest first
    pub artifacts: Vec<Artifact>,
}

impl RetentionStats {
    /// Summarize artifacts already sorted oldest first
    pub fn from_artifacts(artifacts: Vec<Artifact>) -> Self {
        Self {
            count: artifacts.len(),
            total_bytes: artifacts.iter().map(|a| a.size).sum(),
            oldest: artifacts.first().cloned(),
            newest: artifacts.last().cloned(),
            artifacts,
        }
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityEntry {
    pub name: String,
    pub size: u64,
    pub readable: bool,
    pub checksum: Option<String>,
    pub error: Option<String>,
}

impl IntegrityEntry {
    pub fn is_valid(&self) -> bool {
        self.readable && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub details: Vec<IntegrityEntry>,
}

// ============================================================================
// Manager
// ============================================================================

pub struct RetentionManager {
    fs: Arc<dyn FileSystemAccess>,
    destination_dir: PathBuf,
    max_copies: u32,
    filter: ArtifactFilter,
    event_bus: Option<EventBus>,
}

impl RetentionManager {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        destination_dir: impl Into<PathBuf>,
        max_copies: u32,
    ) -> Self {
        Self {
            fs,
            destination_dir: destination_dir.into(),
            max_copies,
            filter: ArtifactFilter::default(),
            event_bus: None,
        }
    }

    pub fn with_filter(mut self, filter: ArtifactFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn max_copies(&self) -> u32 {
        self.max_copies
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Destination artifacts, oldest first; a missing directory is empty
    pub async fn inventory(&self) -> Result<Vec<Artifact>> {
        match list_artifacts(self.fs.as_ref(), &self.destination_dir, &self.filter).await {
            Ok(artifacts) => Ok(artifacts),
            Err(e) if e.is_not_found() => {
                warn!(
                    dir = %self.destination_dir.display(),
                    "Destination directory does not exist"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn plan(&self) -> Result<RetentionPlan> {
        Ok(plan_retention(self.inventory().await?, self.max_copies))
    }

    pub async fn needs_cleanup(&self) -> Result<bool> {
        Ok(self.inventory().await?.len() > self.max_copies as usize)
    }

    /// Enforce the cap, deleting the oldest excess artifacts
    ///
    /// With `force` and a cap of zero every artifact is deleted.
    #[instrument(skip(self), fields(max_copies = self.max_copies))]
    pub async fn apply(&self, force: bool) -> Result<RetentionReport> {
        let plan = self.plan().await?;

        if plan.current_count == 0 {
            debug!("No artifacts at destination");
            return Ok(RetentionReport::default());
        }
        if self.max_copies == 0 && !force {
            return Err(BackupError::UnsafeRetentionCap);
        }
        if plan.is_noop() {
            debug!(
                count = plan.current_count,
                "Artifact count within limit, nothing to clean"
            );
            return Ok(RetentionReport {
                kept: plan.current_count,
                ..RetentionReport::default()
            });
        }

        info!(
            count = plan.current_count,
            deleting = plan.to_delete.len(),
            "Cleaning up old backups"
        );

        let mut report = RetentionReport::default();
        for artifact in &plan.to_delete {
            match self.fs.delete_file(&artifact.path).await {
                Ok(()) => {
                    info!(
                        artifact = %artifact.name,
                        modified_at = %artifact.modified_at,
                        "Deleted old backup"
                    );
                    report.deleted.push(artifact.name.clone());
                    report.freed_bytes += artifact.size;
                }
                Err(e) => {
                    warn!(artifact = %artifact.name, error = %e, "Failed to delete old backup");
                    self.emit(RetentionEvent::DeletionFailed {
                        artifact: artifact.name.clone(),
                        error: e.to_string(),
                    });
                    report.failures.push(RetentionFailure {
                        name: artifact.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.kept = plan.current_count - report.deleted.len();

        info!(
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            freed_mb = report.freed_bytes / (1024 * 1024),
            "Cleanup complete"
        );
        self.emit(RetentionEvent::Applied {
            deleted: report.deleted.clone(),
            kept: report.kept,
            freed_bytes: report.freed_bytes,
        });

        Ok(report)
    }

    pub async fn stats(&self) -> Result<RetentionStats> {
        Ok(RetentionStats::from_artifacts(self.inventory().await?))
    }

    pub async fn largest(&self) -> Result<Option<Artifact>> {
        Ok(self
            .inventory()
            .await?
            .into_iter()
            .max_by(|a, b| a.size.cmp(&b.size).then_with(|| b.name.cmp(&a.name))))
    }

    /// Delete one artifact by name; `false` when it does not exist
    pub async fn delete_specific(&self, name: &str) -> Result<bool> {
        if name.is_empty() || name.contains('/') || name == ".." {
            return Err(BackupError::ArtifactNotFound(name.to_string()));
        }

        let path = self.destination_dir.join(name);
        if !self.fs.exists(&path).await? {
            warn!(artifact = %name, "Backup not found for deletion");
            return Ok(false);
        }

        self.fs.delete_file(&path).await?;
        info!(artifact = %name, "Deleted backup");
        Ok(true)
    }

    /// Check every destination artifact can be read, optionally hashing it
    pub async fn verify_integrity(&self, check_hashes: bool) -> Result<IntegrityReport> {
        let artifacts = self.inventory().await?;
        let mut report = IntegrityReport {
            total: artifacts.len(),
            ..IntegrityReport::default()
        };

        for artifact in artifacts {
            let mut entry = IntegrityEntry {
                name: artifact.name.clone(),
                size: artifact.size,
                readable: false,
                checksum: None,
                error: None,
            };

            let check = if check_hashes {
                checksum_file(self.fs.as_ref(), &artifact.path)
                    .await
                    .map(Some)
            } else {
                self.read_first_byte(&artifact.path).await.map(|_| None)
            };

            match check {
                Ok(checksum) => {
                    entry.readable = true;
                    entry.checksum = checksum;
                    report.valid += 1;
                }
                Err(e) => {
                    warn!(artifact = %artifact.name, error = %e, "Backup failed integrity check");
                    entry.error = Some(e.to_string());
                    report.invalid += 1;
                }
            }
            report.details.push(entry);
        }

        Ok(report)
    }

    async fn read_first_byte(&self, path: &Path) -> Result<()> {
        let mut reader = self.fs.open_read_stream(path).await?;
        let mut byte = [0u8; 1];
        reader
            .read(&mut byte)
            .await
            .map_err(bridge_traits::BridgeError::Io)?;
        Ok(())
    }

    fn emit(&self, event: RetentionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Retention(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use chrono::{TimeZone, Utc};
    use filetime::FileTime;

    fn artifact(name: &str, secs: i64, size: u64) -> Artifact {
        Artifact {
            name: name.to_string(),
            path: PathBuf::from("/dst").join(name),
            size,
            modified_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            checksum: None,
        }
    }

    fn populate(dir: &Path, count: usize) {
        for i in 0..count {
            let path = dir.join(format!("backup_{}.tar", i));
            std::fs::write(&path, vec![0u8; 10 * (i + 1)]).unwrap();
            filetime::set_file_mtime(
                &path,
                FileTime::from_unix_time(1_700_000_000 + i as i64 * 60, 0),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_plan_partitions_oldest_first() {
        let artifacts: Vec<Artifact> = (0..7)
            .map(|i| artifact(&format!("{}.tar", i), i, 100))
            .collect();
        let plan = plan_retention(artifacts, 5);

        assert_eq!(plan.current_count, 7);
        assert_eq!(plan.delete_names(), vec!["0.tar", "1.tar"]);
        assert_eq!(plan.to_keep.len(), 5);
        assert_eq!(plan.freed_bytes, 200);
    }

    #[test]
    fn test_plan_sizes_hold_for_all_counts() {
        for n in 0..8usize {
            for m in 0..8u32 {
                let artifacts: Vec<Artifact> =
                    (0..n).map(|i| artifact(&format!("{}.tar", i), i as i64, 1)).collect();
                let plan = plan_retention(artifacts, m);
                assert_eq!(plan.to_keep.len(), n.min(m as usize));
                assert_eq!(plan.to_delete.len(), n.saturating_sub(m as usize));
            }
        }
    }

    #[tokio::test]
    async fn test_apply_deletes_single_oldest() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 6);

        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 5);
        let report = manager.apply(false).await.unwrap();

        assert_eq!(report.deleted, vec!["backup_0.tar"]);
        assert_eq!(report.kept, 5);
        assert_eq!(report.freed_bytes, 10);
        assert!(!dir.path().join("backup_0.tar").exists());
        assert_eq!(manager.inventory().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_apply_at_cap_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 5);

        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 5);
        assert!(!manager.needs_cleanup().await.unwrap());
        let report = manager.apply(false).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.kept, 5);
    }

    #[tokio::test]
    async fn test_zero_cap_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 2);
        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 0);

        assert!(matches!(
            manager.apply(false).await,
            Err(BackupError::UnsafeRetentionCap)
        ));
        assert_eq!(manager.inventory().await.unwrap().len(), 2);

        let report = manager.apply(true).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.kept, 0);
    }

    #[tokio::test]
    async fn test_missing_destination_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(
            Arc::new(TokioFileSystem::new()),
            dir.path().join("unmounted"),
            5,
        );
        assert!(manager.plan().await.unwrap().is_noop());
        assert!(manager.apply(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_largest() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 3);
        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 5);

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_bytes, 60);
        assert_eq!(stats.oldest.unwrap().name, "backup_0.tar");
        assert_eq!(stats.newest.unwrap().name, "backup_2.tar");
        assert_eq!(manager.largest().await.unwrap().unwrap().name, "backup_2.tar");
    }

    #[tokio::test]
    async fn test_delete_specific() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 2);
        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 5);

        assert!(manager.delete_specific("backup_1.tar").await.unwrap());
        assert!(!manager.delete_specific("backup_1.tar").await.unwrap());
        assert!(manager.delete_specific("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_verify_integrity_with_hashes() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 2);
        let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), 5);

        let report = manager.verify_integrity(true).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 2);
        assert!(report.details.iter().all(|d| d.checksum.as_ref().map(|c| c.len()) == Some(64)));

        let quick = manager.verify_integrity(false).await.unwrap();
        assert_eq!(quick.valid, 2);
        assert!(quick.details.iter().all(|d| d.checksum.is_none()));
    }
}
