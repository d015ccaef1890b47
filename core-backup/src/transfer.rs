//! # Transfer Engine
//!
//! Copies one artifact to the destination with verification and bounded retry.
//!
//! ## Overview
//!
//! A transfer runs in two phases:
//!
//! 1. **Pre-validation**: the source must exist, be a regular file, be non-empty
//!    and carry an accepted suffix. Failures here return with zero attempts.
//! 2. **Attempt loop**: up to `max_retries` attempts. Each attempt computes the
//!    source SHA-256 if it is still missing (only below the size ceiling), copies
//!    into a hidden staging file `.<name>.partial`, verifies it and renames it
//!    over `<name>`. Verification requires equal sizes and, when a source
//!    checksum exists, an equal staged checksum. Between attempts the engine
//!    sleeps `retry_delay * attempt`.
//!
//! The staging name never matches an artifact suffix, so retention and bulk
//! sync never see a copy that has not been verified. Each attempt may be bounded
//! by `attempt_timeout`; expiry counts as a failed attempt and dropping the copy
//! future stops writing. After the last failed attempt the staging file is
//! removed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::{TransferConfig, TransferEngine};
//!
//! let engine = TransferEngine::new(fs, "/media/backups", TransferConfig::default());
//! let result = engine.transfer(Path::new("/backup/backup_2024.tar")).await;
//! if result.success {
//!     println!("copied in {} attempt(s)", result.attempts);
//! }
//! ```

use crate::artifact::{checksum_file, file_name, Artifact, ArtifactFilter};
use crate::{BackupError, Result};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Sources at or above this size are copied without a checksum
pub const DEFAULT_CHECKSUM_CEILING: u64 = 10 * 1024 * 1024 * 1024;

/// Appended to the hidden name of a copy that has not been verified yet
pub const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Total attempts, at least 1
    pub max_retries: u32,
    /// Base of the linear backoff
    pub retry_delay: Duration,
    /// Checksums are skipped for sources of this size or larger
    pub checksum_ceiling: u64,
    /// Upper bound on one copy-and-verify attempt
    pub attempt_timeout: Option<Duration>,
    pub filter: ArtifactFilter,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(30),
            checksum_ceiling: DEFAULT_CHECKSUM_CEILING,
            attempt_timeout: None,
            filter: ArtifactFilter::default(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One copy try
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAttempt {
    /// 1-based, contiguous
    pub ordinal: u32,
    pub success: bool,
    pub reason: Option<String>,
    pub elapsed: Duration,
}

/// Terminal outcome of every attempt for one artifact
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub artifact_name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub success: bool,
    pub source_size: u64,
    pub destination_size: u64,
    pub duration: Duration,
    pub attempts: u32,
    /// True only when a checksum was computed and matched
    pub checksum_match: bool,
    pub source_checksum: Option<String>,
    pub error: Option<String>,
    pub attempt_log: Vec<TransferAttempt>,
}

impl TransferResult {
    fn new(source: &Path, destination: PathBuf) -> Self {
        Self {
            artifact_name: file_name(source),
            source: source.to_path_buf(),
            destination,
            success: false,
            source_size: 0,
            destination_size: 0,
            duration: Duration::ZERO,
            attempts: 0,
            checksum_match: false,
            source_checksum: None,
            error: None,
            attempt_log: Vec::new(),
        }
    }

    fn rejected(mut self, error: &BackupError, started: Instant) -> Self {
        self.error = Some(error.to_string());
        self.duration = started.elapsed();
        self
    }

    /// `None` when the checksum was skipped
    pub fn checksum_verified(&self) -> Option<bool> {
        self.source_checksum.as_ref().map(|_| self.checksum_match)
    }

    pub fn size_mb(&self) -> f64 {
        self.source_size as f64 / (1024.0 * 1024.0)
    }

    pub fn speed_mb_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.size_mb() / secs
        } else {
            0.0
        }
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..8).unwrap_or(digest)
}

// ============================================================================
// Engine
// ============================================================================

pub struct TransferEngine {
    fs: Arc<dyn FileSystemAccess>,
    destination_dir: PathBuf,
    config: TransferConfig,
    event_bus: Option<EventBus>,
}

impl TransferEngine {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        destination_dir: impl Into<PathBuf>,
        config: TransferConfig,
    ) -> Self {
        let mut config = config;
        config.max_retries = config.max_retries.max(1);

        Self {
            fs,
            destination_dir: destination_dir.into(),
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Destination path for a source artifact
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        self.destination_dir.join(file_name(source))
    }

    /// Staging path an attempt copies into before the rename
    pub fn staging_path_for(&self, source: &Path) -> PathBuf {
        self.destination_dir
            .join(format!(".{}{}", file_name(source), PARTIAL_SUFFIX))
    }

    /// Check the source is a non-empty regular file with an accepted suffix
    pub async fn validate_source(&self, path: &Path) -> Result<Artifact> {
        let display = path.display().to_string();

        let metadata = match self.fs.metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return Err(BackupError::SourceMissing(display)),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_directory {
            return Err(BackupError::NotAFile(display));
        }
        if metadata.size == 0 {
            return Err(BackupError::SourceEmpty(display));
        }
        if !self.config.filter.matches(path) {
            return Err(BackupError::UnsupportedExtension {
                name: file_name(path),
                expected: self.config.filter.describe(),
            });
        }

        Ok(Artifact::from_metadata(path, &metadata))
    }

    /// SHA-256 hex digest of a file
    pub async fn checksum(&self, path: &Path) -> Result<String> {
        checksum_file(self.fs.as_ref(), path).await
    }

    /// Copy `source` into the destination directory
    ///
    /// Never returns an error: every failure is reported in the result.
    #[instrument(skip(self), fields(artifact = %file_name(source)))]
    pub async fn transfer(&self, source: &Path) -> TransferResult {
        let started = Instant::now();
        let destination = self.destination_for(source);
        let mut result = TransferResult::new(source, destination.clone());

        let mut artifact = match self.validate_source(source).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "Source validation failed");
                return result.rejected(&e, started);
            }
        };
        result.source_size = artifact.size;

        if artifact.size >= self.config.checksum_ceiling {
            info!(
                size_gb = artifact.size_gb(),
                "Skipping checksum for large artifact"
            );
        }

        info!(
            destination = %destination.display(),
            size_mb = %format!("{:.1}", artifact.size_mb()),
            "Copying backup"
        );

        let staging = self.staging_path_for(source);
        let max_attempts = self.config.max_retries;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let attempt_started = Instant::now();
            result.attempts = attempt;

            let outcome = match self.ensure_source_checksum(&mut artifact).await {
                Ok(()) => {
                    result.source_checksum = artifact.checksum.clone();
                    self.run_attempt(&artifact, &staging, &destination).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(destination_size) => {
                    result.attempt_log.push(TransferAttempt {
                        ordinal: attempt,
                        success: true,
                        reason: None,
                        elapsed: attempt_started.elapsed(),
                    });
                    result.success = true;
                    result.destination_size = destination_size;
                    result.checksum_match = artifact.checksum.is_some();
                    result.duration = started.elapsed();

                    info!(
                        attempt,
                        size_mb = %format!("{:.1}", result.size_mb()),
                        duration_secs = %format!("{:.1}", result.duration.as_secs_f64()),
                        speed_mb_s = %format!("{:.1}", result.speed_mb_per_sec()),
                        "Backup copied successfully"
                    );
                    return result;
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Transfer attempt failed");
                    last_error = e.to_string();
                    result.attempt_log.push(TransferAttempt {
                        ordinal: attempt,
                        success: false,
                        reason: Some(last_error.clone()),
                        elapsed: attempt_started.elapsed(),
                    });
                    self.emit(TransferEvent::AttemptFailed {
                        artifact: artifact.name.clone(),
                        attempt,
                        reason: last_error.clone(),
                    });

                    if e.is_structural() {
                        break;
                    }
                    if attempt < max_attempts {
                        let delay = self.config.retry_delay * attempt;
                        info!(delay_secs = delay.as_secs_f64(), "Retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.discard_staging(&staging).await;

        let message = format!("Failed after {} attempts: {}", result.attempts, last_error);
        error!(error = %message, "Transfer failed");
        result.error = Some(message);
        result.duration = started.elapsed();
        result
    }

    /// Hash the source once, below the ceiling; an I/O failure fails only this attempt
    async fn ensure_source_checksum(&self, artifact: &mut Artifact) -> Result<()> {
        if artifact.checksum.is_some() || artifact.size >= self.config.checksum_ceiling {
            return Ok(());
        }

        match self.checksum(&artifact.path).await {
            Ok(digest) => {
                debug!(checksum = %short_digest(&digest), "Source checksum computed");
                artifact.checksum = Some(digest);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(BackupError::SourceVanished(
                artifact.path.display().to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn run_attempt(
        &self,
        artifact: &Artifact,
        staging: &Path,
        destination: &Path,
    ) -> Result<u64> {
        let work = self.copy_and_verify(artifact, staging, destination);
        match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| BackupError::AttemptTimeout(limit))?,
            None => work.await,
        }
    }

    async fn copy_and_verify(
        &self,
        artifact: &Artifact,
        staging: &Path,
        destination: &Path,
    ) -> Result<u64> {
        if self.fs.exists(staging).await? {
            debug!(staging = %staging.display(), "Removing stale staging file");
            self.fs.delete_file(staging).await?;
        }

        if let Err(e) = self.fs.copy_file(&artifact.path, staging).await {
            if e.is_not_found() && !self.fs.exists(&artifact.path).await.unwrap_or(false) {
                return Err(BackupError::SourceVanished(artifact.path.display().to_string()));
            }
            return Err(e.into());
        }

        let size = self.verify(artifact, staging).await?;
        self.fs.rename(staging, destination).await?;
        Ok(size)
    }

    async fn verify(&self, artifact: &Artifact, staged: &Path) -> Result<u64> {
        if !self.fs.exists(staged).await? {
            return Err(BackupError::VerificationFailed(
                "Destination file not created".to_string(),
            ));
        }

        let source_size = self.fs.metadata(&artifact.path).await?.size;
        let destination_size = self.fs.metadata(staged).await?.size;
        if source_size != destination_size {
            return Err(BackupError::VerificationFailed(format!(
                "Size mismatch: source={}, dest={}",
                source_size, destination_size
            )));
        }

        if let Some(expected) = &artifact.checksum {
            let actual = self.checksum(staged).await?;
            if &actual != expected {
                return Err(BackupError::VerificationFailed(format!(
                    "Checksum mismatch: {} != {}",
                    short_digest(expected),
                    short_digest(&actual)
                )));
            }
        }

        Ok(destination_size)
    }

    async fn discard_staging(&self, staging: &Path) {
        match self.fs.exists(staging).await {
            Ok(true) => {
                if let Err(e) = self.fs.delete_file(staging).await {
                    warn!(
                        staging = %staging.display(),
                        error = %e,
                        "Could not remove partial copy"
                    );
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(staging = %staging.display(), error = %e, "Could not inspect staging file")
            }
        }
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Transfer(event)).ok();
        }
    }
}
