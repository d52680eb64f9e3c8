//! # Gatecheck Runtime
//!
//! The in-memory validation code pool that backs ticket/QR validation at
//! events: codes are generated into per-event pools, checked and marked
//! used in O(1) with no storage round trip, and the results are flushed
//! to durable storage in batches by a background reconciler.
//!
//! ## Core Components
//!
//! - **[`CodePool`]**: concurrent per-event code store; the validate hot
//!   path is its atomic check-and-set
//! - **[`Preloader`]**: seeds a pool from durable storage (or a P2P
//!   snapshot) before a validation burst
//! - **[`BatchReconciler`]**: drains the write-behind queue into storage
//!   with batching, retry and backoff
//! - **[`RetentionSweeper`]**: evicts idle event pools to bound memory
//! - **[`PoolRuntime`]**: wires the above together with an explicit
//!   lifecycle (construct at process start, `shutdown` to drain)
//!
//! ## Example
//!
//! ```ignore
//! use gatecheck_runtime::{PoolConfig, PoolRuntime};
//! use gatecheck_core::{SystemClock, ValidatorId};
//! use std::sync::Arc;
//!
//! let runtime = PoolRuntime::start(storage, Arc::new(SystemClock), PoolConfig::from_env());
//!
//! let code = runtime.generate_code(event_id);
//! runtime.preload(event_id).await?;
//! let outcome = runtime.validate(event_id, &code, &ValidatorId::new("gate-1"));
//!
//! runtime.shutdown(Duration::from_secs(5)).await?;
//! ```

use gatecheck_core::{
    Clock, CodeStorage, EventId, PoolStats, StorageError, StoredCode, ValidationCode,
    ValidationOutcome, ValidatorId,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runtime configuration loaded from the environment
pub mod config;

/// Validation code minting (color-noun-suffix scheme)
mod generator;

/// Synthetic load harness for the validate hot path
pub mod harness;

/// Prometheus-style metrics for the pool
pub mod metrics;

/// The concurrent per-event code pool
pub mod pool;

/// Pool seeding from storage or P2P snapshots
pub mod preloader;

/// Write-behind batch reconciliation to durable storage
pub mod reconciler;

/// Exponential backoff policy for storage writes
pub mod retry;

/// Inactivity-based pool eviction
pub mod sweeper;

pub use config::PoolConfig;
pub use harness::{HarnessConfig, HarnessReport, run_harness};
pub use pool::{CodePool, InsertError};
pub use preloader::Preloader;
pub use reconciler::BatchReconciler;
pub use retry::RetryPolicy;
pub use sweeper::RetentionSweeper;

/// Errors from the pool runtime lifecycle.
///
/// Validation itself is infallible by design (every call gets a
/// [`ValidationOutcome`]); errors only arise from preloading and from
/// shutdown.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown timed out before the reconciler drained.
    ///
    /// The payload is the number of validations still pending a durable
    /// write when the timeout elapsed.
    #[error("shutdown timed out with {0} validations still pending")]
    ShutdownTimeout(u64),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Process-wide handle to the validation code pool and its background
/// tasks.
///
/// Construct once at process start with [`PoolRuntime::start`], pass the
/// handle to whatever serves the scanning endpoint, and call
/// [`PoolRuntime::shutdown`] on teardown so pending validations drain to
/// storage. There is no ambient global: everything is injected.
pub struct PoolRuntime {
    pool: Arc<CodePool>,
    preloader: Preloader,
    reconciler_task: JoinHandle<()>,
    reconciler_shutdown: watch::Sender<bool>,
    sweeper_task: JoinHandle<()>,
    sweeper_shutdown: watch::Sender<bool>,
}

impl PoolRuntime {
    /// Build the pool and spawn the reconciler and sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime context (the background
    /// tasks are spawned immediately).
    #[must_use]
    pub fn start(storage: Arc<dyn CodeStorage>, clock: Arc<dyn Clock>, config: PoolConfig) -> Self {
        metrics::register_pool_metrics();

        let (pool, pending_rx) = CodePool::new(clock, config.max_generate_attempts);
        let (reconciler, reconciler_shutdown) = BatchReconciler::new(
            Arc::clone(&storage),
            pending_rx,
            pool.pending_writes_handle(),
            config.reconcile_interval,
            config.max_batch,
            config.flush_retry.clone(),
        );
        let reconciler_task = tokio::spawn(reconciler.run());

        let (sweeper, sweeper_shutdown) =
            RetentionSweeper::new(Arc::clone(&pool), config.retention, config.sweep_interval);
        let sweeper_task = tokio::spawn(sweeper.run());

        let preloader = Preloader::new(Arc::clone(&pool), storage);

        tracing::info!("pool runtime started");
        Self {
            pool,
            preloader,
            reconciler_task,
            reconciler_shutdown,
            sweeper_task,
            sweeper_shutdown,
        }
    }

    /// Shared handle to the underlying pool (for benches and harnesses).
    #[must_use]
    pub fn pool(&self) -> Arc<CodePool> {
        Arc::clone(&self.pool)
    }

    /// Generate a fresh validation code for an event. See
    /// [`CodePool::generate_code`].
    #[must_use]
    pub fn generate_code(&self, event_id: EventId) -> String {
        self.pool.generate_code(event_id)
    }

    /// Validate a scanned code. The hot path; see
    /// [`CodePool::try_validate`].
    pub fn validate(
        &self,
        event_id: EventId,
        code: &str,
        validator: &ValidatorId,
    ) -> ValidationOutcome {
        self.pool.try_validate(event_id, code, validator)
    }

    /// Warm the pool for an event from durable storage. Returns the
    /// number of newly loaded codes.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from the load.
    pub async fn preload(&self, event_id: EventId) -> Result<usize, StorageError> {
        self.preloader.preload(event_id).await
    }

    /// Warm the pool from a snapshot the caller already holds (offline
    /// P2P sessions).
    pub fn preload_snapshot(&self, event_id: EventId, codes: Vec<StoredCode>) -> usize {
        self.preloader.preload_snapshot(event_id, codes)
    }

    /// Per-event counters plus the process-wide pending-write count.
    #[must_use]
    pub fn stats(&self, event_id: EventId) -> PoolStats {
        self.pool.stats(event_id)
    }

    /// Copy of one code's record, if present.
    #[must_use]
    pub fn get_code(&self, event_id: EventId, code: &str) -> Option<ValidationCode> {
        self.pool.get_code(event_id, code)
    }

    /// Drop an event's pool immediately (e.g. when an event is deleted).
    pub fn evict(&self, event_id: EventId) -> bool {
        self.pool.evict(event_id)
    }

    /// Stop the background tasks, draining pending validations.
    ///
    /// The reconciler gets up to `timeout` to flush its buffer; the
    /// sweeper is stopped (and aborted if it does not exit in time).
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ShutdownTimeout`]: the reconciler could not
    ///   drain in time; the payload is the number of still-pending
    ///   validations
    /// - [`RuntimeError::TaskJoin`]: a background task panicked
    pub async fn shutdown(self, timeout: Duration) -> Result<(), RuntimeError> {
        tracing::info!("pool runtime shutting down");
        let _ = self.sweeper_shutdown.send(true);
        let _ = self.reconciler_shutdown.send(true);

        let reconciler_abort = self.reconciler_task.abort_handle();
        match tokio::time::timeout(timeout, self.reconciler_task).await {
            Ok(join) => join?,
            Err(_) => {
                let pending = self.pool.pending_writes_handle().load(Ordering::Relaxed);
                tracing::error!(pending, "reconciler did not drain before shutdown timeout");
                reconciler_abort.abort();
                self.sweeper_task.abort();
                return Err(RuntimeError::ShutdownTimeout(pending));
            }
        }

        let sweeper_abort = self.sweeper_task.abort_handle();
        match tokio::time::timeout(timeout, self.sweeper_task).await {
            Ok(join) => join?,
            Err(_) => {
                tracing::warn!("sweeper did not stop in time; aborting");
                sweeper_abort.abort();
            }
        }

        tracing::info!("pool runtime stopped");
        Ok(())
    }
}
