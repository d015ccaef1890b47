//! # Backup Transfer & Retention Engine
//!
//! Moves backup archives from a watched source directory to a destination
//! volume and bounds how many copies the destination keeps.
//!
//! ## Overview
//!
//! This crate holds the engine only. Filesystem access, event watching and
//! notification delivery come in through `bridge-traits`, and configuration is
//! loaded by `core-runtime`.
//!
//! ## Components
//!
//! - **Artifacts** (`artifact`): Identity, suffix filtering, listing and SHA-256 hashing
//! - **Arrival Detector** (`detector`): Filters and debounces filesystem events
//! - **Stability Waiter** (`stability`): Size polling and settle delay before a copy
//! - **Transfer Engine** (`transfer`): Copy, verify and retry with linear backoff
//! - **Retention Manager** (`retention`): Plans and applies the destination cap
//! - **Artifact Run** (`pipeline`): Per-artifact state machine
//! - **Worker Pool** (`dispatch`): Bounded, observable dispatch of arrivals
//! - **Sync Coordinator** (`coordinator`): Bulk sync, monitoring loop and status

pub mod artifact;
pub mod coordinator;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod retention;
pub mod stability;
pub mod transfer;

pub use artifact::{Artifact, ArtifactFilter, DEFAULT_SUFFIXES};
pub use coordinator::{
    CoordinatorStatus, DestinationInfo, PerformanceStats, SyncConfig, SyncCoordinator,
};
pub use detector::{ArrivalDetector, ArrivalSignal, Detection};
pub use dispatch::{JobHandler, PoolMetrics, WorkerPool};
pub use error::{BackupError, Result};
pub use pipeline::{ArtifactRun, ArtifactRunId, ArtifactStage};
pub use retention::{
    plan_retention, IntegrityEntry, IntegrityReport, RetentionFailure, RetentionManager,
    RetentionPlan, RetentionReport, RetentionStats,
};
pub use stability::{StabilityOutcome, StabilityWaiter, UnstablePolicy};
pub use transfer::{TransferAttempt, TransferConfig, TransferEngine, TransferResult};
