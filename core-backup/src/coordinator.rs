//! # Sync Coordinator
//!
//! Sequences detection, stabilization, transfer and retention for each artifact
//! and keeps process-wide counters.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns one instance of each engine component and drives
//! artifacts through them:
//! - `ArrivalDetector` filters and debounces filesystem events
//! - `StabilityWaiter` holds an artifact until its writer is done
//! - `TransferEngine` copies, verifies and retries
//! - `RetentionManager` enforces the destination cap after a success
//!
//! Every stage change is emitted on the `EventBus`, and every terminal outcome is
//! sent to the notification sink. Sink failures are logged and never affect the
//! outcome.
//!
//! ## Workflow
//!
//! ### Bulk sync
//! 1. List source artifacts, oldest first
//! 2. Skip names already present at the destination
//! 3. Run each remaining artifact through the pipeline, one at a time
//! 4. Apply retention once if anything was copied
//! 5. Send a summary notification
//!
//! ### Continuous monitoring
//! 1. Receive filesystem events until the shutdown token fires
//! 2. Forward accepted arrivals into a bounded `WorkerPool`
//! 3. Each worker runs the pipeline and applies retention after a success;
//!    retention passes never overlap
//! 4. On shutdown, stop accepting events and drain accepted work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::{SyncConfig, SyncCoordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! let coordinator = Arc::new(SyncCoordinator::new(config, fs, notifier, event_bus));
//! let synced = coordinator.sync_existing().await?;
//!
//! let events = watcher.subscribe(&source_dir).await?;
//! let shutdown = CancellationToken::new();
//! coordinator.clone().run(events, shutdown.clone()).await?;
//! ```

use crate::{
    artifact::{list_artifacts, ArtifactFilter, DEFAULT_SUFFIXES},
    detector::{ArrivalDetector, ArrivalSignal, Detection},
    dispatch::{JobHandler, PoolMetrics, WorkerPool},
    pipeline::{ArtifactRun, ArtifactStage},
    retention::{plan_retention, RetentionManager, RetentionPlan, RetentionReport, RetentionStats},
    stability::{StabilityOutcome, StabilityWaiter, UnstablePolicy},
    transfer::{TransferConfig, TransferEngine, TransferResult},
    BackupError, Result,
};
use bridge_traits::{
    notification::{Notification, NotificationSink},
    storage::FileSystemAccess,
    time::{Clock, SystemClock},
    watch::FileEventReceiver,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use core_runtime::{
    events::{CoreEvent, DetectionEvent, EventBus, MonitorEvent, TransferEvent},
    BackupConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Names listed in the bulk sync summary before it is truncated
const SUMMARY_NAME_LIMIT: usize = 5;

const WRITE_TEST_NAME: &str = ".write_test";

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Watched directory where backups appear
    pub source_dir: PathBuf,

    /// Directory on the destination volume
    pub destination_dir: PathBuf,

    /// Retention cap
    pub max_copies: u32,

    /// Fixed delay before each transfer
    pub settle_delay: Duration,

    /// Interval between size samples
    pub poll_interval: Duration,

    /// Size samples before giving up; 0 disables polling
    pub stability_max_samples: u32,

    /// What to do when the size never settles
    pub unstable_policy: UnstablePolicy,

    /// Total copy attempts per artifact
    pub max_retries: u32,

    /// Base of the linear backoff between attempts
    pub retry_delay: Duration,

    /// Sources of this size or larger skip checksums
    pub checksum_ceiling: u64,

    /// Upper bound on one copy-and-verify attempt
    pub attempt_timeout: Option<Duration>,

    /// Duplicate-event suppression window
    pub debounce_window: Duration,

    /// Concurrent transfers while monitoring
    pub max_workers: usize,

    /// Accepted arrivals waiting for a worker
    pub queue_capacity: usize,

    /// Accepted artifact suffixes
    pub suffixes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("/backup"),
            destination_dir: PathBuf::from("/media/backups"),
            max_copies: 5,
            settle_delay: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            stability_max_samples: 10,
            unstable_policy: UnstablePolicy::Proceed,
            max_retries: 3,
            retry_delay: Duration::from_secs(30),
            checksum_ceiling: crate::transfer::DEFAULT_CHECKSUM_CEILING,
            attempt_timeout: None,
            debounce_window: crate::detector::DEFAULT_DEBOUNCE_WINDOW,
            max_workers: 2,
            queue_capacity: 32,
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&BackupConfig> for SyncConfig {
    fn from(config: &BackupConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            destination_dir: config.mount_point.clone(),
            max_copies: config.max_copies,
            settle_delay: config.settle_delay(),
            poll_interval: config.stability_poll_interval(),
            stability_max_samples: config.stability_max_samples,
            unstable_policy: UnstablePolicy::from_proceed(config.proceed_when_unstable),
            max_retries: config.max_retries,
            retry_delay: config.retry_base_delay(),
            checksum_ceiling: config.checksum_ceiling_bytes(),
            attempt_timeout: config.attempt_timeout(),
            debounce_window: config.debounce_window(),
            max_workers: config.max_workers,
            queue_capacity: config.queue_capacity,
            ..Self::default()
        }
    }
}

impl SyncConfig {
    pub fn filter(&self) -> ArtifactFilter {
        ArtifactFilter::new(self.suffixes.iter().cloned())
    }

    fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            checksum_ceiling: self.checksum_ceiling,
            attempt_timeout: self.attempt_timeout,
            filter: self.filter(),
        }
    }
}

// ============================================================================
// Status types
// ============================================================================

struct CoordinatorState {
    processed: u64,
    failed: u64,
    last_success_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    monitoring: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub monitoring: bool,
    pub started_at: DateTime<Utc>,
    pub processed: u64,
    pub failed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub max_copies: u32,
    pub queue_depth: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub uptime_hours: f64,
    pub processed: u64,
    pub failed: u64,
    pub success_rate_percent: f64,
    pub backups_per_hour: f64,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Destination statistics and the retention plan from one listing
#[derive(Debug, Clone, Serialize)]
pub struct DestinationInfo {
    pub stats: RetentionStats,
    pub plan: RetentionPlan,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct SyncCoordinator {
    config: SyncConfig,
    fs: Arc<dyn FileSystemAccess>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    detector: ArrivalDetector,
    waiter: StabilityWaiter,
    engine: TransferEngine,
    retention: RetentionManager,
    /// One retention pass at a time across workers
    retention_lock: tokio::sync::Mutex<()>,
    state: Mutex<CoordinatorState>,
    pool_metrics: Arc<PoolMetrics>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        fs: Arc<dyn FileSystemAccess>,
        notifier: Arc<dyn NotificationSink>,
        event_bus: EventBus,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let filter = config.filter();

        let detector = ArrivalDetector::new(filter.clone(), clock.clone())
            .with_window(config.debounce_window);
        let waiter = StabilityWaiter::new(fs.clone(), config.settle_delay)
            .with_polling(config.poll_interval, config.stability_max_samples);
        let engine = TransferEngine::new(
            fs.clone(),
            config.destination_dir.clone(),
            config.transfer_config(),
        )
        .with_event_bus(event_bus.clone());
        let retention = RetentionManager::new(
            fs.clone(),
            config.destination_dir.clone(),
            config.max_copies,
        )
        .with_filter(filter)
        .with_event_bus(event_bus.clone());

        let state = CoordinatorState {
            processed: 0,
            failed: 0,
            last_success_at: None,
            started_at: clock.now(),
            monitoring: false,
        };

        Self {
            config,
            fs,
            notifier,
            clock,
            event_bus,
            detector,
            waiter,
            engine,
            retention,
            retention_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(state),
            pool_metrics: Arc::new(PoolMetrics::default()),
        }
    }

    /// Replace the time source used for debouncing and timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.detector = ArrivalDetector::new(self.config.filter(), clock.clone())
            .with_window(self.config.debounce_window);
        self.lock_state().started_at = clock.now();
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn detector(&self) -> &ArrivalDetector {
        &self.detector
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(notification).await {
            warn!(error = %e, "Could not send notification");
        }
    }

    fn advance(&self, run: &mut ArtifactRun, stage: ArtifactStage) {
        if let Err(e) = run.advance(stage, self.clock.now()) {
            error!(run_id = %run.id, error = %e, "Pipeline stage out of order");
        }
    }

    // ========================================================================
    // Per-artifact pipeline
    // ========================================================================

    /// Run one artifact through stabilization, transfer and (optionally) retention
    #[instrument(skip(self), fields(artifact = %crate::artifact::file_name(path)))]
    pub async fn process_artifact(&self, path: &Path, retain: bool) -> ArtifactRun {
        let name = crate::artifact::file_name(path);
        let mut run = ArtifactRun::new(name.clone(), path, self.clock.now());

        self.advance(&mut run, ArtifactStage::Stabilizing);
        let size = match self.stabilize(path).await {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Artifact rejected before transfer");
                self.record_failure(&mut run, 0, e.to_string()).await;
                return run;
            }
        };

        self.advance(&mut run, ArtifactStage::Transferring);
        self.emit(CoreEvent::Transfer(TransferEvent::Started {
            artifact: name.clone(),
            size_bytes: size,
        }));
        self.notify(Notification::info(
            "Backup Copy Started",
            format!("Starting to copy backup: {}", name),
        ))
        .await;

        let result = self.engine.transfer(path).await;
        if result.success {
            self.record_success(&mut run, &result).await;
            run.result = Some(result);

            if retain {
                self.advance(&mut run, ArtifactStage::Retaining);
                self.run_retention().await;
            }
            self.advance(&mut run, ArtifactStage::Completed);
        } else {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "Unknown transfer error".to_string());
            self.record_failure(&mut run, result.attempts, error).await;
            run.result = Some(result);
        }

        run
    }

    async fn stabilize(&self, path: &Path) -> Result<u64> {
        match self.waiter.wait(path).await? {
            StabilityOutcome::Stable { size, .. } => Ok(size),
            StabilityOutcome::DidNotStabilize { last_size, samples } => {
                match self.config.unstable_policy {
                    UnstablePolicy::Proceed => {
                        warn!(last_size, samples, "Size still changing, proceeding anyway");
                        self.waiter.settle(path).await
                    }
                    UnstablePolicy::Abort => Err(BackupError::SourceChanged(format!(
                        "size still changing after {} samples",
                        samples
                    ))),
                }
            }
        }
    }

    async fn record_success(&self, run: &mut ArtifactRun, result: &TransferResult) {
        let now = self.clock.now();
        {
            let mut state = self.lock_state();
            state.processed += 1;
            state.last_success_at = Some(now);
        }
        self.advance(run, ArtifactStage::Succeeded);

        self.emit(CoreEvent::Transfer(TransferEvent::Completed {
            artifact: run.artifact.clone(),
            size_bytes: result.destination_size,
            attempts: result.attempts,
            duration_ms: result.duration.as_millis() as u64,
            checksum_match: result.checksum_verified(),
        }));
        self.notify(Notification::info(
            "Backup Copied Successfully",
            format!(
                "Backup copied: {}\nSize: {:.1} MB\nTime: {:.1}s\nSpeed: {:.1} MB/s",
                run.artifact,
                result.size_mb(),
                result.duration.as_secs_f64(),
                result.speed_mb_per_sec()
            ),
        ))
        .await;
    }

    async fn record_failure(&self, run: &mut ArtifactRun, attempts: u32, error: String) {
        self.lock_state().failed += 1;
        if let Err(e) = run.fail(error.clone(), self.clock.now()) {
            error!(run_id = %run.id, error = %e, "Pipeline stage out of order");
        }

        error!(attempts, error = %error, "Backup processing failed");
        self.emit(CoreEvent::Transfer(TransferEvent::Failed {
            artifact: run.artifact.clone(),
            attempts,
            error: error.clone(),
        }));
        self.notify(Notification::error(
            "Backup Copy Failed",
            format!(
                "Failed to copy backup: {}\nError: {}\nAttempts: {}",
                run.artifact, error, attempts
            ),
        ))
        .await;
    }

    /// Best-effort retention pass; failures are reported, never propagated
    async fn run_retention(&self) -> Option<RetentionReport> {
        let _pass = self.retention_lock.lock().await;
        match self.retention.apply(false).await {
            Ok(report) => {
                self.notify_retention(&report).await;
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Retention pass failed");
                self.notify(Notification::error(
                    "Cleanup Failed",
                    format!("Failed to clean up old backups: {}", e),
                ))
                .await;
                None
            }
        }
    }

    async fn notify_retention(&self, report: &RetentionReport) {
        if !report.deleted.is_empty() {
            self.notify(Notification::info(
                "Backup Cleanup",
                format!(
                    "Cleaned up {} old backup(s): {}",
                    report.deleted.len(),
                    report.deleted.join(", ")
                ),
            ))
            .await;
        }
        if !report.failures.is_empty() {
            let names: Vec<&str> = report.failures.iter().map(|f| f.name.as_str()).collect();
            self.notify(Notification::warning(
                "Backup Cleanup Incomplete",
                format!(
                    "Could not delete {} old backup(s): {}",
                    names.len(),
                    names.join(", ")
                ),
            ))
            .await;
        }
    }

    // ========================================================================
    // Bulk sync
    // ========================================================================

    /// Copy every source artifact not yet at the destination
    ///
    /// Returns the names copied, oldest first.
    #[instrument(skip(self))]
    pub async fn sync_existing(&self) -> Result<Vec<String>> {
        info!(source = %self.config.source_dir.display(), "Starting sync of existing backups");
        self.ensure_source_dir().await?;

        let artifacts =
            list_artifacts(self.fs.as_ref(), &self.config.source_dir, &self.config.filter()).await?;
        if artifacts.is_empty() {
            info!("No existing backups found to sync");
            return Ok(Vec::new());
        }
        info!(count = artifacts.len(), "Found existing backups");

        let mut synced = Vec::new();
        let mut failed = 0usize;

        for artifact in artifacts {
            let destination = self.config.destination_dir.join(&artifact.name);
            match self.fs.exists(&destination).await {
                Ok(true) => {
                    debug!(artifact = %artifact.name, "Backup already exists at destination");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(artifact = %artifact.name, error = %e, "Could not check destination");
                    failed += 1;
                    continue;
                }
            }

            info!(artifact = %artifact.name, "Syncing");
            let run = self.process_artifact(&artifact.path, false).await;
            if run.succeeded() {
                synced.push(artifact.name);
            } else {
                failed += 1;
            }
        }

        if !synced.is_empty() {
            self.run_retention().await;

            let mut summary = format!(
                "Successfully synced {} backup(s):\n{}",
                synced.len(),
                synced
                    .iter()
                    .take(SUMMARY_NAME_LIMIT)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if synced.len() > SUMMARY_NAME_LIMIT {
                summary.push_str("...");
            }
            self.notify(Notification::info("Existing Backups Synced", summary))
                .await;
        }

        info!(synced = synced.len(), failed, "Existing backup sync finished");
        self.emit(CoreEvent::Monitor(MonitorEvent::BulkSyncCompleted {
            synced: synced.clone(),
            failed,
        }));

        Ok(synced)
    }

    async fn ensure_source_dir(&self) -> Result<()> {
        let source = &self.config.source_dir;
        match self.fs.metadata(source).await {
            Ok(metadata) if metadata.is_directory => Ok(()),
            Ok(_) => Err(BackupError::SourceDirectoryMissing(source.display().to_string())),
            Err(e) if e.is_not_found() => {
                Err(BackupError::SourceDirectoryMissing(source.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Continuous monitoring
    // ========================================================================

    /// Dispatch arrivals until `shutdown` fires or the event source closes
    ///
    /// Accepted work is drained before this returns; in-flight copies are
    /// never cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut events: FileEventReceiver,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.ensure_source_dir().await?;

        let source = self.config.source_dir.display().to_string();
        let destination = self.config.destination_dir.display().to_string();

        self.lock_state().monitoring = true;
        info!(source = %source, destination = %destination, "Backup monitoring started");
        self.emit(CoreEvent::Monitor(MonitorEvent::Started {
            source_dir: source.clone(),
            destination_dir: destination.clone(),
        }));
        self.notify(Notification::info(
            "Backup Sync Monitoring Started",
            format!(
                "Watching {} for new backups.\nDestination: {}\nMax backups to keep: {}",
                source, destination, self.config.max_copies
            ),
        ))
        .await;

        let coordinator = Arc::clone(&self);
        let handler: JobHandler<ArrivalSignal> = Arc::new(move |signal: ArrivalSignal| {
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator.process_artifact(&signal.path, true).await;
            }
            .boxed()
        });
        let pool = WorkerPool::with_metrics(
            self.config.max_workers,
            self.config.queue_capacity,
            handler,
            self.pool_metrics.clone(),
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("File event source closed");
                        break;
                    };

                    match self.detector.inspect(&event) {
                        Detection::Accepted(signal) => {
                            info!(artifact = %signal.name, "New backup detected");
                            self.emit(CoreEvent::Detection(DetectionEvent::ArtifactDetected {
                                artifact: signal.name.clone(),
                                path: signal.path.display().to_string(),
                            }));

                            tokio::select! {
                                submitted = pool.submit(signal) => {
                                    if let Err(e) = submitted {
                                        error!(error = %e, "Could not queue backup");
                                        break;
                                    }
                                }
                                _ = shutdown.cancelled() => {
                                    info!("Shutdown requested while queue was full");
                                    break;
                                }
                            }
                        }
                        Detection::Debounced { name } => {
                            self.emit(CoreEvent::Detection(DetectionEvent::Debounced {
                                artifact: name,
                            }));
                        }
                        Detection::Ignored => {}
                    }
                }
            }
        }

        info!(
            queued = self.pool_metrics.queue_depth(),
            in_flight = self.pool_metrics.in_flight(),
            "Waiting for accepted backups to finish"
        );
        pool.shutdown().await;

        let (processed, failed) = {
            let mut state = self.lock_state();
            state.monitoring = false;
            (state.processed, state.failed)
        };
        info!(processed, failed, "Backup monitoring stopped");
        self.emit(CoreEvent::Monitor(MonitorEvent::Stopped { processed, failed }));
        self.notify(Notification::info(
            "Backup Sync Stopped",
            "Backup monitoring has been stopped.",
        ))
        .await;

        Ok(())
    }

    // ========================================================================
    // Status and maintenance
    // ========================================================================

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.lock_state();
        CoordinatorStatus {
            monitoring: state.monitoring,
            started_at: state.started_at,
            processed: state.processed,
            failed: state.failed,
            last_success_at: state.last_success_at,
            source_dir: self.config.source_dir.clone(),
            destination_dir: self.config.destination_dir.clone(),
            max_copies: self.config.max_copies,
            queue_depth: self.pool_metrics.queue_depth(),
            in_flight: self.pool_metrics.in_flight(),
        }
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        let now = self.clock.now();
        let state = self.lock_state();

        let uptime_hours =
            now.signed_duration_since(state.started_at).num_milliseconds().max(0) as f64
                / 3_600_000.0;
        let backups_per_hour = if uptime_hours > 0.0 && state.processed > 0 {
            state.processed as f64 / uptime_hours
        } else {
            0.0
        };
        let attempted = state.processed + state.failed;
        let success_rate_percent = if attempted > 0 {
            state.processed as f64 / attempted as f64 * 100.0
        } else {
            0.0
        };

        PerformanceStats {
            uptime_hours: round_to(uptime_hours, 2),
            processed: state.processed,
            failed: state.failed,
            success_rate_percent: round_to(success_rate_percent, 1),
            backups_per_hour: round_to(backups_per_hour, 2),
            last_success_at: state.last_success_at,
        }
    }

    pub async fn destination_info(&self) -> Result<DestinationInfo> {
        let artifacts = self.retention.inventory().await?;
        Ok(DestinationInfo {
            plan: plan_retention(artifacts.clone(), self.config.max_copies),
            stats: RetentionStats::from_artifacts(artifacts),
        })
    }

    /// Run a forced retention pass and report it
    pub async fn force_cleanup(&self) -> Result<RetentionReport> {
        info!("Forcing cleanup of old backups");
        let _pass = self.retention_lock.lock().await;
        match self.retention.apply(true).await {
            Ok(report) => {
                self.notify_retention(&report).await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Forced cleanup failed");
                self.notify(Notification::error(
                    "Cleanup Failed",
                    format!("Failed to clean up old backups: {}", e),
                ))
                .await;
                Err(e)
            }
        }
    }

    /// Check the destination is a writable directory
    pub async fn validate_destination(&self) -> bool {
        let dir = &self.config.destination_dir;

        match self.fs.metadata(dir).await {
            Ok(metadata) if metadata.is_directory => {}
            Ok(_) => {
                error!(dir = %dir.display(), "Destination is not a directory");
                return false;
            }
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "Destination does not exist");
                return false;
            }
        }

        let marker = dir.join(WRITE_TEST_NAME);
        if let Err(e) = self.fs.write_file(&marker, Bytes::new()).await {
            error!(dir = %dir.display(), error = %e, "Destination is not writable");
            return false;
        }
        if let Err(e) = self.fs.delete_file(&marker).await {
            warn!(path = %marker.display(), error = %e, "Could not remove write test file");
        }

        true
    }

    pub fn queue_depth(&self) -> usize {
        self.pool_metrics.queue_depth()
    }

    pub fn in_flight(&self) -> usize {
        self.pool_metrics.in_flight()
    }
}
