//! The in-memory validation code pool.
//!
//! # Structure
//!
//! Two lock levels:
//!
//! - an outer `RwLock` over the map of per-event pools, taken briefly to
//!   look up (or lazily create / evict) an event's pool
//! - a per-event `Mutex` over that event's code map, which is the single
//!   atomic primitive everything coordinates through: validation's
//!   check-and-set, generation's insert-if-absent, and preload's
//!   skip-if-present all run under it
//!
//! Critical sections are O(1) hash operations and nothing ever awaits
//! while holding a lock, so the hot path stays sub-millisecond and scales
//! with cores rather than with any external resource.
//!
//! # Write-behind
//!
//! An accepted validation enqueues a [`PendingValidation`] on an unbounded
//! channel and returns immediately; the batch reconciler owns the other
//! end. Storage being down never blocks or fails a validation.

use crate::generator;
use crate::metrics;
use chrono::{DateTime, Utc};
use gatecheck_core::{
    Clock, CodeState, EventId, PendingValidation, PoolStats, StoredCode, ValidationCode,
    ValidationOutcome, ValidatorId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

/// Error from inserting a code into an event's pool.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InsertError {
    /// The code is already live for this event. Generation retries on
    /// this; preload treats it as "skip".
    #[error("code already exists for this event")]
    AlreadyExists,
}

/// One code's in-pool record. The code string itself is the map key.
#[derive(Debug, Clone)]
struct CodeEntry {
    state: CodeState,
    used_at: Option<DateTime<Utc>>,
    used_by: Option<ValidatorId>,
}

impl CodeEntry {
    const fn unused() -> Self {
        Self {
            state: CodeState::Unused,
            used_at: None,
            used_by: None,
        }
    }
}

/// One event's pool of live codes plus its bookkeeping counters.
struct EventPool {
    codes: Mutex<HashMap<String, CodeEntry>>,
    /// When the pool was last (re)seeded from durable storage.
    loaded_at: Mutex<DateTime<Utc>>,
    total: AtomicU64,
    used: AtomicU64,
    /// Millisecond timestamp of the last generate/validate/preload touch,
    /// read by the retention sweeper.
    last_access_ms: AtomicI64,
}

impl EventPool {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            loaded_at: Mutex::new(now),
            total: AtomicU64::new(0),
            used: AtomicU64::new(0),
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_access_ms
            .fetch_max(now.timestamp_millis(), Ordering::Relaxed);
    }
}

/// Concurrent, per-event store of validation codes.
///
/// Created once at process start via [`CodePool::new`] and shared through
/// an `Arc`; see `PoolRuntime` for the wiring that attaches the batch
/// reconciler and retention sweeper.
pub struct CodePool {
    events: RwLock<HashMap<EventId, Arc<EventPool>>>,
    /// Recently evicted events, kept so a validation racing an eviction
    /// can be flagged as an anomaly instead of silently reading as an
    /// unknown event. Pruned by the sweeper.
    tombstones: Mutex<HashMap<EventId, DateTime<Utc>>>,
    pending_tx: mpsc::UnboundedSender<PendingValidation>,
    pending_writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    max_generate_attempts: u32,
}

impl CodePool {
    /// Create a pool and the receiving end of its write-behind queue.
    ///
    /// The receiver must be handed to a `BatchReconciler`; if it is
    /// dropped instead, accepted validations are still correct in memory
    /// but are never durably written.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        max_generate_attempts: u32,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PendingValidation>) {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            events: RwLock::new(HashMap::new()),
            tombstones: Mutex::new(HashMap::new()),
            pending_tx,
            pending_writes: Arc::new(AtomicU64::new(0)),
            clock,
            max_generate_attempts,
        });
        (pool, pending_rx)
    }

    /// Shared counter of validations not yet durably written.
    #[must_use]
    pub fn pending_writes_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.pending_writes)
    }

    /// Generate a fresh code for an event and insert it (state `Unused`).
    ///
    /// Collisions within the event's pool are retried up to the configured
    /// bound; after that a time-derived disambiguator guarantees progress.
    /// Callers never observe a collision.
    #[must_use]
    pub fn generate_code(&self, event_id: EventId) -> String {
        let mut rng = rand::thread_rng();

        for attempt in 0..self.max_generate_attempts {
            let code = generator::mint(&mut rng);
            if self.insert(event_id, code.clone()).is_ok() {
                metrics::record_code_generated(u64::from(attempt));
                return code;
            }
        }

        tracing::warn!(
            %event_id,
            attempts = self.max_generate_attempts,
            "code generation exhausted retries; appending disambiguator"
        );
        let millis = self.clock.now().timestamp_millis();
        let mut nonce = 0;
        loop {
            let code = generator::mint_disambiguated(&mut rng, millis, nonce);
            if self.insert(event_id, code.clone()).is_ok() {
                metrics::record_code_generated(u64::from(self.max_generate_attempts + nonce));
                return code;
            }
            nonce += 1;
        }
    }

    /// Insert a code as `Unused`, creating the event's pool if needed.
    ///
    /// # Errors
    ///
    /// [`InsertError::AlreadyExists`] if the code is already live for this
    /// event. The existing entry is untouched.
    pub fn insert(&self, event_id: EventId, code: String) -> Result<(), InsertError> {
        let now = self.clock.now();
        let pool = self.pool_or_create(event_id, now);
        pool.touch(now);

        let mut codes = lock(&pool.codes);
        if codes.contains_key(&code) {
            return Err(InsertError::AlreadyExists);
        }
        codes.insert(code, CodeEntry::unused());
        pool.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The hot path: atomically check a code and mark it used.
    ///
    /// Exactly one caller per `(event_id, code)` ever gets
    /// [`ValidationOutcome::Accepted`]; concurrent losers get
    /// [`ValidationOutcome::AlreadyUsed`]. A code never issued for the
    /// event, or one whose pool has been evicted, reads as
    /// [`ValidationOutcome::NotFound`] - an invalid ticket, not a fault.
    ///
    /// Never touches storage, never awaits: on acceptance the durable
    /// write is queued for the batch reconciler and this call returns.
    pub fn try_validate(
        &self,
        event_id: EventId,
        code: &str,
        validator: &ValidatorId,
    ) -> ValidationOutcome {
        let pool = {
            let events = read_lock(&self.events);
            events.get(&event_id).cloned()
        };

        let Some(pool) = pool else {
            self.note_miss_on_unknown_event(event_id, code);
            metrics::record_validation(ValidationOutcome::NotFound);
            return ValidationOutcome::NotFound;
        };

        let now = self.clock.now();
        pool.touch(now);

        let outcome = {
            let mut codes = lock(&pool.codes);
            match codes.get_mut(code) {
                None => ValidationOutcome::NotFound,
                Some(entry) if entry.state == CodeState::Used => ValidationOutcome::AlreadyUsed,
                Some(entry) => {
                    entry.state = CodeState::Used;
                    entry.used_at = Some(now);
                    entry.used_by = Some(validator.clone());
                    pool.used.fetch_add(1, Ordering::Relaxed);
                    ValidationOutcome::Accepted
                }
            }
        };

        if outcome.is_accepted() {
            self.enqueue_pending(PendingValidation {
                event_id,
                code: code.to_string(),
                used_at: now,
                used_by: validator.clone(),
            });
        }
        metrics::record_validation(outcome);
        outcome
    }

    /// Seed codes into an event's pool, skipping any already present.
    ///
    /// The skip is what makes preload safe to run at any time: a code
    /// validated between two preloads keeps its `Used` state and audit
    /// fields. Returns the number of newly added codes and refreshes the
    /// pool's `loaded_at`.
    pub fn preload_snapshot(&self, event_id: EventId, codes: Vec<StoredCode>) -> usize {
        let now = self.clock.now();
        let pool = self.pool_or_create(event_id, now);
        pool.touch(now);

        let mut added = 0_u64;
        let mut added_used = 0_u64;
        {
            let mut live = lock(&pool.codes);
            for stored in codes {
                if live.contains_key(&stored.code) {
                    continue;
                }
                let entry = CodeEntry {
                    state: stored.state,
                    used_at: stored.used_at,
                    used_by: stored.used_by,
                };
                if entry.state == CodeState::Used {
                    added_used += 1;
                }
                live.insert(stored.code, entry);
                added += 1;
            }
        }
        pool.total.fetch_add(added, Ordering::Relaxed);
        pool.used.fetch_add(added_used, Ordering::Relaxed);
        *lock(&pool.loaded_at) = now;

        #[allow(clippy::cast_possible_truncation)]
        let added_usize = added as usize;
        added_usize
    }

    /// Point-in-time counters for an event, O(1).
    ///
    /// An unknown (or evicted) event reads as an empty pool;
    /// `pending_writes` is process-wide either way.
    #[must_use]
    pub fn stats(&self, event_id: EventId) -> PoolStats {
        let pending_writes = self.pending_writes.load(Ordering::Relaxed);
        let pool = {
            let events = read_lock(&self.events);
            events.get(&event_id).cloned()
        };
        pool.map_or(
            PoolStats {
                pending_writes,
                ..PoolStats::default()
            },
            |pool| {
                let total = pool.total.load(Ordering::Relaxed);
                let used = pool.used.load(Ordering::Relaxed);
                PoolStats {
                    total,
                    used,
                    unused: total.saturating_sub(used),
                    pending_writes,
                }
            },
        )
    }

    /// Copy of one code's full record, for dashboards and tests.
    #[must_use]
    pub fn get_code(&self, event_id: EventId, code: &str) -> Option<ValidationCode> {
        let pool = {
            let events = read_lock(&self.events);
            events.get(&event_id).cloned()
        }?;
        let codes = lock(&pool.codes);
        codes.get(code).map(|entry| ValidationCode {
            code: code.to_string(),
            event_id,
            state: entry.state,
            used_at: entry.used_at,
            used_by: entry.used_by.clone(),
        })
    }

    /// When the event's pool was last seeded from durable storage.
    #[must_use]
    pub fn loaded_at(&self, event_id: EventId) -> Option<DateTime<Utc>> {
        let pool = {
            let events = read_lock(&self.events);
            events.get(&event_id).cloned()
        }?;
        Some(*lock(&pool.loaded_at))
    }

    /// Drop an event's entire pool.
    ///
    /// Returns `true` if a pool existed. A tombstone is kept so that late
    /// validations log the eviction race before answering `NotFound`.
    pub fn evict(&self, event_id: EventId) -> bool {
        let removed = {
            let mut events = write_lock(&self.events);
            events.remove(&event_id)
        };
        let Some(pool) = removed else {
            return false;
        };

        lock(&self.tombstones).insert(event_id, self.clock.now());
        metrics::record_pool_evicted();
        tracing::info!(
            %event_id,
            total = pool.total.load(Ordering::Relaxed),
            used = pool.used.load(Ordering::Relaxed),
            "evicted event code pool"
        );
        true
    }

    /// Evict every pool idle longer than `retention`. Returns the evicted
    /// event ids. Called by the retention sweeper.
    pub fn sweep_idle(&self, retention: std::time::Duration) -> Vec<EventId> {
        let now_ms = self.clock.now().timestamp_millis();
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);

        let idle: Vec<EventId> = {
            let events = read_lock(&self.events);
            events
                .iter()
                .filter(|(_, pool)| {
                    now_ms.saturating_sub(pool.last_access_ms.load(Ordering::Relaxed))
                        > retention_ms
                })
                .map(|(event_id, _)| *event_id)
                .collect()
        };

        for event_id in &idle {
            self.evict(*event_id);
        }
        idle
    }

    /// Drop tombstones older than `retention` so the map stays bounded.
    ///
    /// A retention beyond chrono's representable range prunes nothing.
    pub fn prune_tombstones(&self, retention: std::time::Duration) {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return;
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(retention) else {
            return;
        };
        lock(&self.tombstones).retain(|_, evicted_at| *evicted_at > cutoff);
    }

    /// Number of events with a live pool.
    #[must_use]
    pub fn event_count(&self) -> usize {
        read_lock(&self.events).len()
    }

    fn pool_or_create(&self, event_id: EventId, now: DateTime<Utc>) -> Arc<EventPool> {
        if let Some(pool) = read_lock(&self.events).get(&event_id) {
            return Arc::clone(pool);
        }
        let mut events = write_lock(&self.events);
        Arc::clone(
            events
                .entry(event_id)
                .or_insert_with(|| Arc::new(EventPool::new(now))),
        )
    }

    fn enqueue_pending(&self, pending: PendingValidation) {
        self.pending_writes.fetch_add(1, Ordering::Relaxed);
        if self.pending_tx.send(pending).is_err() {
            // Reconciler is gone (shutdown); the in-memory state is still
            // correct but this result will not be durably written.
            self.pending_writes.fetch_sub(1, Ordering::Relaxed);
            tracing::warn!("pending validation dropped: reconciler not running");
            return;
        }
        metrics::record_pending_enqueued();
    }

    fn note_miss_on_unknown_event(&self, event_id: EventId, code: &str) {
        let evicted_at = lock(&self.tombstones).get(&event_id).copied();
        if let Some(evicted_at) = evicted_at {
            tracing::warn!(
                %event_id,
                code,
                %evicted_at,
                "validation arrived after pool eviction"
            );
        } else {
            tracing::debug!(%event_id, code, "validation for unknown event");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
