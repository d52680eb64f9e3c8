//! Batch reconciliation of validation results to durable storage.
//!
//! # Overview
//!
//! The reconciler owns the receiving end of the pool's write-behind queue
//! and is the only writer to durable storage. It flushes:
//!
//! - on a fixed interval, or
//! - as soon as `max_batch` records are buffered,
//!
//! whichever comes first. Writes are idempotent upserts keyed by
//! `(event_id, code)`, so at-least-once delivery is safe.
//!
//! # Failure semantics
//!
//! A flush that fails partway retries only the failed subset, with the
//! configured exponential backoff. Records that still fail are re-queued
//! at the front of the buffer and picked up next cycle - never dropped.
//! Storage being down therefore shows up only as a growing
//! `pending_writes` gauge; validation traffic is unaffected.
//!
//! # Lifecycle
//!
//! [`BatchReconciler::new`] returns the reconciler and a shutdown sender
//! (send `true` to stop). On shutdown the channel is drained and flushed,
//! retrying until empty; the runtime's shutdown timeout bounds the wait
//! and aborts the task if storage never recovers.

use crate::metrics;
use crate::retry::RetryPolicy;
use gatecheck_core::{CodeStorage, PendingValidation};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, sleep};

/// Background task draining the write-behind queue into durable storage.
pub struct BatchReconciler {
    storage: Arc<dyn CodeStorage>,
    pending_rx: mpsc::UnboundedReceiver<PendingValidation>,
    /// Shared with the pool; decremented only on durable success.
    pending_writes: Arc<AtomicU64>,
    interval: Duration,
    max_batch: usize,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    buffer: VecDeque<PendingValidation>,
}

impl BatchReconciler {
    /// Create a reconciler and its shutdown handle.
    ///
    /// # Arguments
    ///
    /// - `storage`: durable storage (shared with the preloader)
    /// - `pending_rx`: receiver from [`crate::pool::CodePool::new`]
    /// - `pending_writes`: counter from
    ///   [`crate::pool::CodePool::pending_writes_handle`]
    /// - `interval` / `max_batch` / `retry`: flush cadence and backoff
    #[must_use]
    pub fn new(
        storage: Arc<dyn CodeStorage>,
        pending_rx: mpsc::UnboundedReceiver<PendingValidation>,
        pending_writes: Arc<AtomicU64>,
        interval: Duration,
        max_batch: usize,
        retry: RetryPolicy,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = Self {
            storage,
            pending_rx,
            pending_writes,
            interval,
            max_batch: max_batch.max(1),
            retry,
            shutdown: shutdown_rx,
            buffer: VecDeque::new(),
        };
        (reconciler, shutdown_tx)
    }

    /// Run until shutdown is signalled or the pool closes the queue.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.interval.as_millis(),
            max_batch = self.max_batch,
            "batch reconciler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                received = self.pending_rx.recv() => {
                    match received {
                        Some(record) => {
                            self.buffer.push_back(record);
                            if self.buffer.len() >= self.max_batch {
                                self.flush().await;
                            }
                        }
                        // Pool dropped the sender: final flush and exit.
                        None => {
                            self.flush().await;
                            break;
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    let stopping = changed.is_err() || *self.shutdown.borrow();
                    if stopping {
                        // Keep retrying until the buffer drains; the
                        // runtime's shutdown timeout bounds this wait.
                        loop {
                            self.drain_channel();
                            self.flush().await;
                            if self.buffer.is_empty() && self.pending_rx.is_empty() {
                                break;
                            }
                            sleep(self.retry.delay_for_attempt(0)).await;
                        }
                        break;
                    }
                }
            }
        }

        let remaining = self.buffer.len();
        if remaining > 0 {
            tracing::error!(remaining, "reconciler stopped with undrained validations");
        } else {
            tracing::info!("batch reconciler stopped");
        }
    }

    /// Move everything already queued into the buffer (shutdown path).
    fn drain_channel(&mut self) {
        while let Ok(record) = self.pending_rx.try_recv() {
            self.buffer.push_back(record);
        }
    }

    /// Write buffered records in `max_batch` chunks.
    ///
    /// Stops early if a chunk cannot be fully written even after retries;
    /// the failed records are back at the front of the buffer and the next
    /// tick will try again.
    async fn flush(&mut self) {
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.max_batch);
            let batch: Vec<PendingValidation> = self.buffer.drain(..take).collect();
            let batch_len = batch.len();

            let started = Instant::now();
            let failed = self.write_batch(batch).await;
            let failed_len = failed.len();
            metrics::record_flush(
                batch_len - failed_len,
                failed_len,
                started.elapsed().as_secs_f64(),
            );

            if failed_len == 0 {
                continue;
            }
            for record in failed.into_iter().rev() {
                self.buffer.push_front(record);
            }
            tracing::warn!(
                failed = failed_len,
                buffered = self.buffer.len(),
                "flush incomplete; failed records re-queued for next cycle"
            );
            break;
        }
    }

    /// Upsert one batch, retrying the failed subset with backoff.
    ///
    /// Returns the records that still failed after the retry budget.
    async fn write_batch(&self, batch: Vec<PendingValidation>) -> Vec<PendingValidation> {
        let mut remaining = batch;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                sleep(self.retry.delay_for_attempt(attempt - 1)).await;
            }

            let mut failed = Vec::new();
            for record in remaining {
                match self.storage.upsert_validation(record.clone()).await {
                    Ok(()) => {
                        self.pending_writes.fetch_sub(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        tracing::debug!(
                            %record.event_id,
                            code = %record.code,
                            error = %err,
                            "validation upsert failed"
                        );
                        failed.push(record);
                    }
                }
            }

            if failed.is_empty() {
                return Vec::new();
            }
            tracing::warn!(
                attempt,
                failed = failed.len(),
                "storage rejected part of a batch, backing off"
            );
            remaining = failed;
        }

        remaining
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatecheck_core::{EventId, ValidatorId};
    use gatecheck_testing::mocks::InMemoryCodeStorage;

    fn pending(event_id: EventId, code: &str) -> PendingValidation {
        PendingValidation {
            event_id,
            code: code.to_string(),
            used_at: Utc::now(),
            used_by: ValidatorId::new("scanner-1"),
        }
    }

    fn test_reconciler(
        storage: Arc<InMemoryCodeStorage>,
    ) -> (BatchReconciler, mpsc::UnboundedSender<PendingValidation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let retry = RetryPolicy::builder()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1))
            .build();
        let (reconciler, _shutdown) = BatchReconciler::new(
            storage,
            rx,
            Arc::new(AtomicU64::new(0)),
            Duration::from_secs(60),
            4,
            retry,
        );
        (reconciler, tx)
    }

    #[tokio::test]
    async fn flush_on_empty_buffer_is_a_noop() {
        let storage = Arc::new(InMemoryCodeStorage::new());
        let (mut reconciler, _tx) = test_reconciler(Arc::clone(&storage));
        reconciler.flush().await;
        assert_eq!(storage.upsert_count(), 0);
    }

    #[tokio::test]
    async fn write_batch_requeues_failures_and_keeps_pending_count() {
        let storage = Arc::new(InMemoryCodeStorage::new());
        let (reconciler, _tx) = test_reconciler(Arc::clone(&storage));
        let event_id = EventId::new();

        storage.set_available(false);
        reconciler.pending_writes.store(2, Ordering::Relaxed);
        let failed = reconciler
            .write_batch(vec![pending(event_id, "a"), pending(event_id, "b")])
            .await;
        assert_eq!(failed.len(), 2);
        assert_eq!(reconciler.pending_writes.load(Ordering::Relaxed), 2);

        storage.set_available(true);
        let failed = reconciler.write_batch(failed).await;
        assert!(failed.is_empty());
        assert_eq!(reconciler.pending_writes.load(Ordering::Relaxed), 0);
        assert_eq!(storage.used_count(event_id), 2);
    }

    #[tokio::test]
    async fn flush_writes_in_batches() {
        let storage = Arc::new(InMemoryCodeStorage::new());
        let (mut reconciler, _tx) = test_reconciler(Arc::clone(&storage));
        let event_id = EventId::new();

        reconciler.pending_writes.store(10, Ordering::Relaxed);
        for i in 0..10 {
            reconciler.buffer.push_back(pending(event_id, &format!("code-{i}")));
        }
        reconciler.flush().await;
        assert!(reconciler.buffer.is_empty());
        assert_eq!(storage.used_count(event_id), 10);
        assert_eq!(reconciler.pending_writes.load(Ordering::Relaxed), 0);
    }
}
