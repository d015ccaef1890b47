//! # Arrival Detector
//!
//! Turns raw filesystem notifications into a deduplicated stream of
//! "new artifact" signals.
//!
//! ## Overview
//!
//! Writers and watch backends often report the same file more than once in quick
//! succession (a create followed by a rename, or two rename events). The detector
//! keeps the last detection time per file name and drops any signal for a name
//! seen inside the debounce window.
//!
//! The bookkeeping map is bounded: once it grows past its capacity, entries older
//! than the retention horizon are purged. Names detected recently are never
//! evicted early, so a still-active name cannot re-trigger.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::{ArrivalDetector, ArtifactFilter};
//!
//! let detector = ArrivalDetector::new(ArtifactFilter::default(), clock);
//! while let Some(event) = events.recv().await {
//!     if let Some(signal) = detector.observe(&event) {
//!         pool.submit(signal).await?;
//!     }
//! }
//! ```

use crate::artifact::{file_name, ArtifactFilter};
use bridge_traits::{time::Clock, watch::FileEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Default suppression window for repeated events
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Default number of tracked names before a purge is attempted
pub const DEFAULT_DEBOUNCE_CAPACITY: usize = 100;

/// Default age after which a tracked name may be purged
pub const DEFAULT_DEBOUNCE_HORIZON: Duration = Duration::from_secs(3600);

/// A qualifying, non-duplicate arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalSignal {
    pub name: String,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

/// What the detector did with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Forward this arrival
    Accepted(ArrivalSignal),
    /// Same name seen inside the window
    Debounced { name: String },
    /// Directory, or a name outside the artifact filter
    Ignored,
}

pub struct ArrivalDetector {
    filter: ArtifactFilter,
    window: Duration,
    capacity: usize,
    horizon: Duration,
    clock: Arc<dyn Clock>,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ArrivalDetector {
    pub fn new(filter: ArtifactFilter, clock: Arc<dyn Clock>) -> Self {
        Self {
            filter,
            window: DEFAULT_DEBOUNCE_WINDOW,
            capacity: DEFAULT_DEBOUNCE_CAPACITY,
            horizon: DEFAULT_DEBOUNCE_HORIZON,
            clock,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn filter(&self) -> &ArtifactFilter {
        &self.filter
    }

    /// Forward `event` as an arrival, or drop it
    pub fn observe(&self, event: &FileEvent) -> Option<ArrivalSignal> {
        match self.inspect(event) {
            Detection::Accepted(signal) => Some(signal),
            _ => None,
        }
    }

    /// Like [`observe`](Self::observe), reporting why an event was dropped
    pub fn inspect(&self, event: &FileEvent) -> Detection {
        if event.is_directory || !self.filter.matches(&event.path) {
            return Detection::Ignored;
        }

        let name = file_name(&event.path);
        let now = self.clock.now();
        let window = to_chrono(self.window);

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = seen.get(&name) {
            if now.signed_duration_since(*last) < window {
                debug!(artifact = %name, kind = %event.kind, "Debounced duplicate event");
                return Detection::Debounced { name };
            }
        }

        seen.insert(name.clone(), now);
        if seen.len() > self.capacity {
            let horizon = to_chrono(self.horizon);
            let before = seen.len();
            seen.retain(|_, at| now.signed_duration_since(*at) < horizon);
            debug!(purged = before - seen.len(), remaining = seen.len(), "Purged debounce records");
        }
        drop(seen);

        debug!(artifact = %name, kind = %event.kind, "Artifact arrival detected");
        Detection::Accepted(ArrivalSignal {
            name,
            path: event.path.clone(),
            detected_at: now,
        })
    }

    /// Number of names currently tracked
    pub fn tracked(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Tracked names with their last detection time, most recent first
    pub fn recent(&self) -> Vec<(String, DateTime<Utc>)> {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = seen.iter().map(|(k, v)| (k.clone(), *v)).collect();
        drop(seen);
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}
