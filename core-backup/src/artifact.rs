//! # Backup Artifacts
//!
//! Identity, filtering and hashing of backup archive files.
//!
//! ## Overview
//!
//! An artifact is a single backup file identified by its file name. Directories
//! are never artifacts, and only names ending in one of the configured suffixes
//! qualify. Membership of a directory is always derived by listing it; nothing is
//! persisted between calls.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::artifact::{list_artifacts, ArtifactFilter};
//!
//! let filter = ArtifactFilter::default();
//! let artifacts = list_artifacts(fs.as_ref(), Path::new("/backup"), &filter).await?;
//! for artifact in &artifacts {
//!     println!("{} ({} bytes)", artifact.name, artifact.size);
//! }
//! ```

use crate::Result;
use bridge_traits::storage::{FileMetadata, FileSystemAccess};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Suffixes accepted when none are configured
pub const DEFAULT_SUFFIXES: &[&str] = &[".tar", ".tar.gz"];

const CHECKSUM_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Artifact
// ============================================================================

/// A single backup file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name, unique within its directory
    pub name: String,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time (epoch when the platform does not report one)
    pub modified_at: DateTime<Utc>,
    /// Hex SHA-256 digest, when computed
    pub checksum: Option<String>,
}

impl Artifact {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }

    pub fn size_gb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn from_metadata(path: &Path, metadata: &FileMetadata) -> Self {
        Self {
            name: file_name(path),
            path: path.to_path_buf(),
            size: metadata.size,
            modified_at: metadata.modified_at.unwrap_or_else(epoch),
            checksum: None,
        }
    }

    /// Ordering key: oldest first, ties broken by name
    fn age_key(&self) -> (DateTime<Utc>, &str) {
        (self.modified_at, self.name.as_str())
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// File name of `path` as an owned string
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Filter
// ============================================================================

/// Decides which file names are backup artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFilter {
    suffixes: Vec<String>,
}

impl ArtifactFilter {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let suffixes: Vec<String> = suffixes
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect();

        if suffixes.is_empty() {
            return Self::default();
        }
        Self { suffixes }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.suffixes
            .iter()
            .any(|suffix| lower.len() > suffix.len() && lower.ends_with(suffix.as_str()))
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.matches_name(&file_name(path))
    }

    /// Human-readable list for error messages
    pub fn describe(&self) -> String {
        self.suffixes.join(", ")
    }
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self {
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================================================
// Directory listing
// ============================================================================

/// Stat one path into an [`Artifact`] without checking the filter
pub async fn stat_artifact(fs: &dyn FileSystemAccess, path: &Path) -> Result<Artifact> {
    let metadata = fs.metadata(path).await?;
    Ok(Artifact::from_metadata(path, &metadata))
}

/// List the artifacts in `dir`, oldest first
///
/// Entries removed between the listing and the stat are skipped.
pub async fn list_artifacts(
    fs: &dyn FileSystemAccess,
    dir: &Path,
    filter: &ArtifactFilter,
) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();

    for entry in fs.list_directory(dir).await? {
        if !filter.matches(&entry) {
            continue;
        }

        let metadata = match fs.metadata(&entry).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        if metadata.is_directory {
            continue;
        }

        artifacts.push(Artifact::from_metadata(&entry, &metadata));
    }

    artifacts.sort_by(|a, b| a.age_key().cmp(&b.age_key()));
    debug!(dir = ?dir, count = artifacts.len(), "Listed artifacts");
    Ok(artifacts)
}

/// Stream `path` through SHA-256 and return the lowercase hex digest
pub async fn checksum_file(fs: &dyn FileSystemAccess, path: &Path) -> Result<String> {
    let mut reader = fs.open_read_stream(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_CHUNK_SIZE];

    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(bridge_traits::BridgeError::Io)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use filetime::FileTime;

    #[test]
    fn test_filter_defaults() {
        let filter = ArtifactFilter::default();
        assert!(filter.matches_name("backup_2024.tar"));
        assert!(filter.matches_name("Backup.TAR"));
        assert!(filter.matches_name("full.tar.gz"));
        assert!(!filter.matches_name("notes.txt"));
        assert!(!filter.matches_name("backup.tar.partial"));
        assert!(!filter.matches_name(".tar"));
    }

    #[test]
    fn test_filter_custom_suffixes() {
        let filter = ArtifactFilter::new([".tar"]);
        assert!(filter.matches(Path::new("/backup/a.tar")));
        assert!(!filter.matches(Path::new("/backup/a.tar.gz")));

        let fallback = ArtifactFilter::new(Vec::<String>::new());
        assert_eq!(fallback, ArtifactFilter::default());
    }

    #[tokio::test]
    async fn test_list_artifacts_sorted_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        for (name, secs) in [("c.tar", 300), ("a.tar", 100), ("b.tar", 100)] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"data").unwrap();
            filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 + secs, 0))
                .unwrap();
        }
        std::fs::write(dir.path().join("readme.txt"), b"skip").unwrap();
        std::fs::create_dir(dir.path().join("dir.tar")).unwrap();

        let artifacts = list_artifacts(&fs, dir.path(), &ArtifactFilter::default())
            .await
            .unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.tar", "b.tar", "c.tar"]);
        assert_eq!(artifacts[0].size, 4);
    }

    #[tokio::test]
    async fn test_checksum_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar");
        std::fs::write(&path, b"abc").unwrap();

        let digest = checksum_file(&TokioFileSystem::new(), &path).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
