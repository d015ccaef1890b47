//! # Stability Waiter
//!
//! Holds an artifact back until its writer has finished.
//!
//! ## Overview
//!
//! Two policies are combined:
//!
//! - **Size polling**: sample the file size every `poll_interval` and declare it
//!   stable once two consecutive samples agree. After `max_samples` without
//!   agreement the outcome is [`StabilityOutcome::DidNotStabilize`]; whether to
//!   proceed anyway is the caller's decision ([`UnstablePolicy`]).
//! - **Fixed settle delay**: sleep once, then re-check that the file still exists
//!   and is non-empty.
//!
//! A file that disappears at any point fails fast with
//! [`BackupError::SourceVanished`](crate::BackupError::SourceVanished).

use crate::{BackupError, Result};
use bridge_traits::storage::FileSystemAccess;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default interval between size samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default sample budget for size polling
pub const DEFAULT_MAX_SAMPLES: u32 = 10;

/// What to do with an artifact whose size never settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnstablePolicy {
    /// Apply the settle delay and transfer anyway
    Proceed,
    /// Fail the artifact
    Abort,
}

impl UnstablePolicy {
    pub fn from_proceed(proceed: bool) -> Self {
        if proceed {
            UnstablePolicy::Proceed
        } else {
            UnstablePolicy::Abort
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    Stable { size: u64, samples: u32 },
    DidNotStabilize { last_size: u64, samples: u32 },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityOutcome::Stable { .. })
    }
}

pub struct StabilityWaiter {
    fs: Arc<dyn FileSystemAccess>,
    settle_delay: Duration,
    poll_interval: Duration,
    max_samples: u32,
}

impl StabilityWaiter {
    pub fn new(fs: Arc<dyn FileSystemAccess>, settle_delay: Duration) -> Self {
        Self {
            fs,
            settle_delay,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    /// Configure size polling; `max_samples == 0` disables it
    pub fn with_polling(mut self, poll_interval: Duration, max_samples: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_samples = if max_samples == 0 { 0 } else { max_samples.max(2) };
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn polling_enabled(&self) -> bool {
        self.max_samples > 0
    }

    async fn current_size(&self, path: &Path) -> Result<u64> {
        match self.fs.metadata(path).await {
            Ok(metadata) => Ok(metadata.size),
            Err(e) if e.is_not_found() => {
                Err(BackupError::SourceVanished(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sample the size until two consecutive samples agree
    pub async fn poll_until_stable(&self, path: &Path) -> Result<StabilityOutcome> {
        let max_samples = self.max_samples.max(2);
        let mut previous = self.current_size(path).await?;
        let mut samples = 1;

        while samples < max_samples {
            tokio::time::sleep(self.poll_interval).await;
            let size = self.current_size(path).await?;
            samples += 1;

            if size == previous {
                debug!(path = ?path, size, samples, "Size stable");
                return Ok(StabilityOutcome::Stable { size, samples });
            }
            debug!(path = ?path, previous, size, "Size still changing");
            previous = size;
        }

        Ok(StabilityOutcome::DidNotStabilize {
            last_size: previous,
            samples,
        })
    }

    /// Sleep the settle delay, then confirm the file is still present and non-empty
    pub async fn settle(&self, path: &Path) -> Result<u64> {
        if !self.settle_delay.is_zero() {
            debug!(
                path = ?path,
                delay_secs = self.settle_delay.as_secs(),
                "Waiting for file to settle"
            );
            tokio::time::sleep(self.settle_delay).await;
        }

        let size = self.current_size(path).await?;
        if size == 0 {
            return Err(BackupError::SourceEmpty(path.display().to_string()));
        }
        Ok(size)
    }

    /// Run polling (when enabled) followed by the settle delay
    ///
    /// `DidNotStabilize` is returned before settling so the caller can apply
    /// its [`UnstablePolicy`].
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn wait(&self, path: &Path) -> Result<StabilityOutcome> {
        let samples = if self.polling_enabled() {
            match self.poll_until_stable(path).await? {
                StabilityOutcome::Stable { samples, .. } => samples,
                unstable @ StabilityOutcome::DidNotStabilize { .. } => return Ok(unstable),
            }
        } else {
            0
        };

        let size = self.settle(path).await?;
        Ok(StabilityOutcome::Stable { size, samples })
    }
}
