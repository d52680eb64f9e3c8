//! Retention sweeping of idle event pools.
//!
//! Event pools are memory-resident and never persisted wholesale, so they
//! must be dropped once an event is over. The sweeper is a cancellable
//! repeating task owned by the runtime lifecycle: every `interval` it
//! evicts pools that nothing has touched for the retention window and
//! prunes old eviction tombstones.
//!
//! A validation arriving after its pool was swept safely reads as
//! `NotFound`; the pool's tombstone makes that race visible in the logs.

use crate::pool::CodePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Background task bounding pool memory via inactivity-based eviction.
pub struct RetentionSweeper {
    pool: Arc<CodePool>,
    retention: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RetentionSweeper {
    /// Create a sweeper and its shutdown handle.
    #[must_use]
    pub fn new(
        pool: Arc<CodePool>,
        retention: Duration,
        interval: Duration,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = Self {
            pool,
            retention,
            interval,
            shutdown: shutdown_rx,
        };
        (sweeper, shutdown_tx)
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.pool.sweep_idle(self.retention);
                    self.pool.prune_tombstones(self.retention);
                    if !evicted.is_empty() {
                        tracing::info!(
                            evicted = evicted.len(),
                            live_events = self.pool.event_count(),
                            "swept idle event pools"
                        );
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("retention sweeper stopped");
    }
}
