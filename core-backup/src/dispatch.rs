//! # Worker Pool
//!
//! Bounded dispatch of artifact work off the detection loop.
//!
//! ## Overview
//!
//! Jobs enter a bounded queue of `queue_capacity`. A dispatcher task takes jobs
//! off the queue and runs each on its own task once one of `max_workers` permits
//! is free. When the queue is full, [`WorkerPool::submit`] waits, which pushes
//! back on the producer instead of spawning without limit.
//!
//! [`PoolMetrics`] exposes queue depth and in-flight counts at any time.
//! [`WorkerPool::shutdown`] closes intake and waits for every accepted job.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handler: JobHandler<PathBuf> = Arc::new(|path: PathBuf| {
//!     async move { copy(path).await }.boxed()
//! });
//! let pool = WorkerPool::new(2, 32, handler);
//! pool.submit(PathBuf::from("/backup/a.tar")).await?;
//! pool.shutdown().await;
//! ```

use crate::{BackupError, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

/// Async work run for every accepted job
pub type JobHandler<J> = Arc<dyn Fn(J) -> BoxFuture<'static, ()> + Send + Sync>;

/// Live counters for a [`WorkerPool`]
#[derive(Debug, Default)]
pub struct PoolMetrics {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
}

impl PoolMetrics {
    /// Jobs accepted but not yet running
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.queue_depth() == 0 && self.in_flight() == 0
    }
}

/// Decrements the in-flight count even if the job panics
struct InFlightGuard(Arc<PoolMetrics>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.completed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool<J> {
    sender: Option<mpsc::Sender<J>>,
    dispatcher: Option<JoinHandle<()>>,
    metrics: Arc<PoolMetrics>,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn new(max_workers: usize, queue_capacity: usize, handler: JobHandler<J>) -> Self {
        Self::with_metrics(max_workers, queue_capacity, handler, Arc::new(PoolMetrics::default()))
    }

    /// Share counters with an observer that outlives the pool
    pub fn with_metrics(
        max_workers: usize,
        queue_capacity: usize,
        handler: JobHandler<J>,
        metrics: Arc<PoolMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let dispatcher = tokio::spawn(dispatch(receiver, semaphore, handler, metrics.clone()));

        Self {
            sender: Some(sender),
            dispatcher: Some(dispatcher),
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }

    /// Enqueue a job, waiting while the queue is full
    pub async fn submit(&self, job: J) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(BackupError::WorkerPoolClosed)?;

        self.metrics.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).await.is_err() {
            self.metrics.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(BackupError::WorkerPoolClosed);
        }
        Ok(())
    }

    /// Stop accepting jobs and wait for accepted ones to finish
    pub async fn shutdown(mut self) {
        self.sender.take();
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }
    }
}

async fn dispatch<J: Send + 'static>(
    mut receiver: mpsc::Receiver<J>,
    semaphore: Arc<Semaphore>,
    handler: JobHandler<J>,
    metrics: Arc<PoolMetrics>,
) {
    let mut tasks = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        metrics.queued.fetch_sub(1, Ordering::SeqCst);
        metrics.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(metrics.clone());
        let work = handler(job);

        tasks.spawn(async move {
            work.await;
            drop(guard);
            drop(permit);
        });

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Worker task panicked");
            }
        }
    }

    debug!(remaining = tasks.len(), "Intake closed, draining workers");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Worker task panicked");
        }
    }
}
