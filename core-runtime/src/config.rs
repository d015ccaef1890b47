//! # Backup Configuration Module
//!
//! Provides the add-on options for the backup engine.
//!
//! ## Overview
//!
//! `BackupConfig` mirrors the JSON options file written by the supervisor
//! (`/data/options.json` inside an add-on container). Every field has a
//! default, so a missing file or a partial file yields a usable configuration;
//! unknown keys are ignored. Validation is fail-fast and names the offending
//! field so the operator can fix the add-on options directly.
//!
//! ## Usage
//!
//! ### Loading the options file
//!
//! ```ignore
//! use core_runtime::config::BackupConfig;
//!
//! let config = BackupConfig::load("/data/options.json")?;
//! config.validate()?;
//! ```
//!
//! ### Building programmatically
//!
//! ```ignore
//! use core_runtime::config::BackupConfig;
//!
//! let config = BackupConfig::builder()
//!     .usb_device("sdb1")
//!     .max_copies(3)
//!     .wait_time(0)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the options file inside an add-on container
pub const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

/// Accepted `log_level` values (case-insensitive)
pub const LOG_LEVELS: &[&str] = &["OFF", "DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Accepted block device name prefixes for `usb_device`
const DEVICE_PREFIXES: &[&str] = &["sd", "mmc", "nvme"];

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;
const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Backup engine options.
///
/// The first group of fields are the add-on options exposed to users; the
/// second group are engine tunables that keep sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Destination partition name (`sdb1`, `mmcblk0p1`, `nvme0n1p1`); empty until configured
    pub usb_device: String,

    /// Maximum number of artifacts kept on the destination
    pub max_copies: u32,

    /// Fixed settle delay before copying, in seconds
    pub wait_time: u64,

    /// Copy artifacts already in the source directory at startup
    pub sync_existing_on_start: bool,

    /// Copy attempts per artifact
    pub max_retries: u32,

    /// Base retry delay in seconds; attempt `k` waits `retry_delay * k`
    pub retry_delay: u64,

    /// One of OFF, DEBUG, INFO, WARNING, ERROR, CRITICAL
    pub log_level: String,

    /// Home Assistant notify service name
    pub notify_service: String,

    /// Directory new backup artifacts appear in
    pub source_dir: PathBuf,

    /// Where the destination device is mounted
    pub mount_point: PathBuf,

    /// Options passed to `mount -o`
    pub mount_options: String,

    /// Duplicate-event suppression window, in seconds
    pub debounce_secs: u64,

    /// Interval between size samples while waiting for a write to finish
    pub stability_poll_interval_ms: u64,

    /// Size samples taken before giving up on stability; 0 disables polling
    pub stability_max_samples: u32,

    /// Copy an artifact whose size never stabilized
    pub proceed_when_unstable: bool,

    /// Artifacts at or above this size skip checksum verification, in GiB
    pub checksum_ceiling_gb: u64,

    /// Per-attempt timeout in seconds; 0 disables it
    pub transfer_timeout_secs: u64,

    /// Concurrent transfers
    pub max_workers: usize,

    /// Pending artifacts accepted before submitters wait
    pub queue_capacity: usize,

    /// Minimum free space required on the destination, in MiB
    pub min_free_space_mb: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            usb_device: String::new(),
            max_copies: 5,
            wait_time: 300,
            sync_existing_on_start: true,
            max_retries: 3,
            retry_delay: 30,
            log_level: "INFO".to_string(),
            notify_service: "notification_channel".to_string(),
            source_dir: PathBuf::from("/backup"),
            mount_point: PathBuf::from("/media/backups"),
            mount_options: "defaults,nofail".to_string(),
            debounce_secs: 2,
            stability_poll_interval_ms: 1000,
            stability_max_samples: 10,
            proceed_when_unstable: true,
            checksum_ceiling_gb: 10,
            transfer_timeout_secs: 0,
            max_workers: 2,
            queue_capacity: 32,
            min_free_space_mb: 1024,
        }
    }
}

impl BackupConfig {
    /// Create a builder seeded with defaults
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::default()
    }

    /// Load options from a JSON file.
    ///
    /// A missing file yields the defaults. The result is not validated; call
    /// [`validate`](Self::validate) before use.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = ?path, "Options file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
            .map_err(|e| Error::Config(format!("Invalid options in {}: {}", path.display(), e)))
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate every option, failing on the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.max_copies < 1 {
            return Err(Error::Config(
                "max_copies must be at least 1".to_string(),
            ));
        }

        if self.max_retries < 1 {
            return Err(Error::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if !LOG_LEVELS
            .iter()
            .any(|level| level.eq_ignore_ascii_case(&self.log_level))
        {
            return Err(Error::Config(format!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }

        if !self.usb_device.is_empty()
            && !DEVICE_PREFIXES
                .iter()
                .any(|prefix| self.usb_device.starts_with(prefix))
        {
            return Err(Error::Config(format!(
                "usb_device must name a block device starting with sd, mmc or nvme, got '{}'",
                self.usb_device
            )));
        }

        if self.max_workers < 1 {
            return Err(Error::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }

        if self.queue_capacity < 1 {
            return Err(Error::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.stability_max_samples == 1 {
            return Err(Error::Config(
                "stability_max_samples must be 0 (disabled) or at least 2".to_string(),
            ));
        }

        if self.source_dir.as_os_str().is_empty() {
            return Err(Error::Config("source_dir cannot be empty".to_string()));
        }

        if self.mount_point.as_os_str().is_empty() {
            return Err(Error::Config("mount_point cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Whether a destination device has been chosen yet
    pub fn is_device_configured(&self) -> bool {
        !self.usb_device.trim().is_empty()
    }

    /// `/dev/<usb_device>`, when configured
    pub fn device_path(&self) -> Option<PathBuf> {
        self.is_device_configured()
            .then(|| PathBuf::from("/dev").join(self.usb_device.trim()))
    }

    /// Map `log_level` onto a tracing level; `None` means logging is off.
    pub fn logging_level(&self) -> Option<LogLevel> {
        match self.log_level.to_ascii_uppercase().as_str() {
            "OFF" => None,
            "DEBUG" => Some(LogLevel::Debug),
            "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "CRITICAL" => Some(LogLevel::Error),
            _ => Some(LogLevel::Info),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.wait_time)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn stability_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stability_poll_interval_ms)
    }

    /// Per-attempt timeout, or `None` when disabled
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.transfer_timeout_secs > 0).then(|| Duration::from_secs(self.transfer_timeout_secs))
    }

    pub fn checksum_ceiling_bytes(&self) -> u64 {
        self.checksum_ceiling_gb.saturating_mul(BYTES_PER_GIB)
    }

    pub fn min_free_space_bytes(&self) -> u64 {
        self.min_free_space_mb.saturating_mul(BYTES_PER_MIB)
    }
}

/// Builder for [`BackupConfig`]; `build` validates.
#[derive(Debug, Default)]
pub struct BackupConfigBuilder {
    config: BackupConfig,
}

impl BackupConfigBuilder {
    pub fn usb_device(mut self, device: impl Into<String>) -> Self {
        self.config.usb_device = device.into();
        self
    }

    pub fn max_copies(mut self, max_copies: u32) -> Self {
        self.config.max_copies = max_copies;
        self
    }

    pub fn wait_time(mut self, seconds: u64) -> Self {
        self.config.wait_time = seconds;
        self
    }

    pub fn sync_existing_on_start(mut self, enabled: bool) -> Self {
        self.config.sync_existing_on_start = enabled;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, seconds: u64) -> Self {
        self.config.retry_delay = seconds;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn notify_service(mut self, service: impl Into<String>) -> Self {
        self.config.notify_service = service.into();
        self
    }

    pub fn source_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.source_dir = path.into();
        self
    }

    pub fn mount_point<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.mount_point = path.into();
        self
    }

    pub fn mount_options(mut self, options: impl Into<String>) -> Self {
        self.config.mount_options = options.into();
        self
    }

    pub fn debounce_secs(mut self, seconds: u64) -> Self {
        self.config.debounce_secs = seconds;
        self
    }

    pub fn stability_poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.stability_poll_interval_ms = millis;
        self
    }

    pub fn stability_max_samples(mut self, samples: u32) -> Self {
        self.config.stability_max_samples = samples;
        self
    }

    pub fn proceed_when_unstable(mut self, proceed: bool) -> Self {
        self.config.proceed_when_unstable = proceed;
        self
    }

    pub fn checksum_ceiling_gb(mut self, gigabytes: u64) -> Self {
        self.config.checksum_ceiling_gb = gigabytes;
        self
    }

    pub fn transfer_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.transfer_timeout_secs = seconds;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn min_free_space_mb(mut self, megabytes: u64) -> Self {
        self.config.min_free_space_mb = megabytes;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<BackupConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
