//! # Gatecheck Testing
//!
//! Testing utilities and mocks for the gatecheck validation code pool.
//!
//! This crate provides:
//! - [`mocks::InMemoryCodeStorage`]: a durable-storage mock with an
//!   availability switch for storage-outage scenarios
//! - [`mocks::FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```
//! use gatecheck_testing::mocks::InMemoryCodeStorage;
//! use gatecheck_core::{CodeStorage, EventId, StoredCode};
//!
//! # async fn example() {
//! let storage = InMemoryCodeStorage::new();
//! let event_id = EventId::new();
//! storage.seed_unused(event_id, ["amber-falcon-x7k2"]);
//!
//! let codes = storage.load_codes(event_id).await.unwrap();
//! assert_eq!(codes.len(), 1);
//! # }
//! ```

/// Mock implementations of the pool's injected dependencies.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use gatecheck_core::{
        Clock, CodeStorage, CodeState, EventId, PendingValidation, StorageError, StoredCode,
    };
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{PoisonError, RwLock};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making `used_at` assertions exact.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should
    /// never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// One durable record in the mock store.
    #[derive(Debug, Clone)]
    struct DurableCode {
        state: CodeState,
        used_at: Option<DateTime<Utc>>,
        used_by: Option<String>,
    }

    /// In-memory stand-in for durable code storage.
    ///
    /// Supports the two behaviors integration tests need beyond the trait:
    ///
    /// - `set_available(false)` makes every call fail with
    ///   [`StorageError::Unavailable`], simulating an outage
    /// - accessors expose what was written, for eventual-consistency
    ///   assertions
    #[derive(Debug)]
    pub struct InMemoryCodeStorage {
        records: RwLock<HashMap<EventId, HashMap<String, DurableCode>>>,
        available: AtomicBool,
        upserts: AtomicU64,
    }

    impl Default for InMemoryCodeStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryCodeStorage {
        /// Create an empty, available store.
        #[must_use]
        pub fn new() -> Self {
            Self {
                records: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
                upserts: AtomicU64::new(0),
            }
        }

        /// Seed unused codes for an event, as if tickets had been issued.
        pub fn seed_unused<I, S>(&self, event_id: EventId, codes: I)
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let mut records = write_lock(&self.records);
            let event = records.entry(event_id).or_default();
            for code in codes {
                event.entry(code.into()).or_insert(DurableCode {
                    state: CodeState::Unused,
                    used_at: None,
                    used_by: None,
                });
            }
        }

        /// Seed a code already marked used durably.
        pub fn seed_used(
            &self,
            event_id: EventId,
            code: impl Into<String>,
            used_at: DateTime<Utc>,
            used_by: impl Into<String>,
        ) {
            let mut records = write_lock(&self.records);
            records.entry(event_id).or_default().insert(
                code.into(),
                DurableCode {
                    state: CodeState::Used,
                    used_at: Some(used_at),
                    used_by: Some(used_by.into()),
                },
            );
        }

        /// Flip storage availability. While `false`, every call fails.
        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        /// Total successful upserts, including idempotent replays.
        #[must_use]
        pub fn upsert_count(&self) -> u64 {
            self.upserts.load(Ordering::SeqCst)
        }

        /// How many codes are durably marked used for an event.
        #[must_use]
        pub fn used_count(&self, event_id: EventId) -> usize {
            let records = read_lock(&self.records);
            records.get(&event_id).map_or(0, |event| {
                event
                    .values()
                    .filter(|code| code.state == CodeState::Used)
                    .count()
            })
        }

        /// The durable `(used_at, used_by)` audit pair for a code, if used.
        #[must_use]
        pub fn used_record(
            &self,
            event_id: EventId,
            code: &str,
        ) -> Option<(DateTime<Utc>, String)> {
            let records = read_lock(&self.records);
            let durable = records.get(&event_id)?.get(code)?;
            match (&durable.used_at, &durable.used_by) {
                (Some(at), Some(by)) => Some((*at, by.clone())),
                _ => None,
            }
        }

        fn check_available(&self) -> Result<(), StorageError> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StorageError::Unavailable(
                    "storage offline (test switch)".to_string(),
                ))
            }
        }
    }

    impl CodeStorage for InMemoryCodeStorage {
        fn load_codes(
            &self,
            event_id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredCode>, StorageError>> + Send + '_>>
        {
            Box::pin(async move {
                self.check_available()?;
                let records = read_lock(&self.records);
                let codes = records.get(&event_id).map_or_else(Vec::new, |event| {
                    event
                        .iter()
                        .map(|(code, durable)| StoredCode {
                            code: code.clone(),
                            state: durable.state,
                            used_at: durable.used_at,
                            used_by: durable.used_by.clone().map(Into::into),
                        })
                        .collect()
                });
                Ok(codes)
            })
        }

        fn upsert_validation(
            &self,
            validation: PendingValidation,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            Box::pin(async move {
                self.check_available()?;
                let mut records = write_lock(&self.records);
                records.entry(validation.event_id).or_default().insert(
                    validation.code,
                    DurableCode {
                        state: CodeState::Used,
                        used_at: Some(validation.used_at),
                        used_by: Some(validation.used_by.to_string()),
                    },
                );
                self.upserts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryCodeStorage, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatecheck_core::{Clock, CodeState, CodeStorage, EventId};

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn seeded_codes_round_trip() {
        let storage = InMemoryCodeStorage::new();
        let event_id = EventId::new();
        storage.seed_unused(event_id, ["alpha", "beta"]);
        storage.seed_used(event_id, "gamma", test_clock().now(), "scanner-1");

        // load_codes is async but the mock never awaits; poll it directly.
        let codes = futures_executor(storage.load_codes(event_id)).unwrap();
        assert_eq!(codes.len(), 3);
        assert_eq!(
            codes
                .iter()
                .filter(|code| code.state == CodeState::Used)
                .count(),
            1
        );
        assert_eq!(storage.used_count(event_id), 1);
    }

    #[test]
    fn default_store_starts_available() {
        let storage = InMemoryCodeStorage::default();
        assert!(futures_executor(storage.load_codes(EventId::new())).is_ok());
    }

    #[test]
    fn outage_switch_fails_calls() {
        let storage = InMemoryCodeStorage::new();
        let event_id = EventId::new();
        storage.set_available(false);
        assert!(futures_executor(storage.load_codes(event_id)).is_err());
        storage.set_available(true);
        assert!(futures_executor(storage.load_codes(event_id)).is_ok());
    }

    /// Minimal single-future executor; the mock's futures are always ready.
    fn futures_executor<F: std::future::Future>(fut: F) -> F::Output {
        use std::pin::pin;
        use std::task::{Context, Poll, Waker};

        let mut fut = pin!(fut);
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => out,
            Poll::Pending => unreachable!("mock storage futures are always ready"),
        }
    }
}
