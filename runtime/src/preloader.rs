//! Pool preloading from durable storage or a caller-supplied snapshot.
//!
//! Preloading runs once per scanning session, before the validation burst
//! begins (doors opening, a P2P session starting), so that no validation
//! call is ever the first access that would otherwise need a storage read.

use crate::metrics;
use crate::pool::CodePool;
use gatecheck_core::{CodeStorage, EventId, StorageError, StoredCode};
use std::sync::Arc;

/// Seeds event pools ahead of validation traffic.
///
/// This is the only component that reads durable storage; the validator
/// itself never does.
pub struct Preloader {
    pool: Arc<CodePool>,
    storage: Arc<dyn CodeStorage>,
}

impl Preloader {
    /// Pair a pool with its durable storage.
    #[must_use]
    pub fn new(pool: Arc<CodePool>, storage: Arc<dyn CodeStorage>) -> Self {
        Self { pool, storage }
    }

    /// Load every durably known code for `event_id` into the pool.
    ///
    /// Codes already present in the pool are skipped, so in-flight `Used`
    /// state survives a re-preload. Returns the number of newly loaded
    /// codes.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from the load; the pool is left
    /// untouched in that case.
    pub async fn preload(&self, event_id: EventId) -> Result<usize, StorageError> {
        let stored = self.storage.load_codes(event_id).await?;
        let known = stored.len();
        let added = self.pool.preload_snapshot(event_id, stored);
        metrics::record_preload(added as u64);
        tracing::info!(%event_id, added, known, "pool preloaded from storage");
        Ok(added)
    }

    /// Seed the pool from a snapshot the caller already holds.
    ///
    /// This is the offline/P2P path: a scanning client that received the
    /// code list peer-to-peer can warm the pool with no storage round
    /// trip. Returns the number of newly loaded codes.
    pub fn preload_snapshot(&self, event_id: EventId, codes: Vec<StoredCode>) -> usize {
        let known = codes.len();
        let added = self.pool.preload_snapshot(event_id, codes);
        metrics::record_preload(added as u64);
        tracing::info!(%event_id, added, known, "pool preloaded from snapshot");
        added
    }
}
