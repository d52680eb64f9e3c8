//! Durable storage seam for the validation code pool.
//!
//! # Design
//!
//! The pool never reads storage on the validation hot path. Storage is
//! touched in exactly two places:
//!
//! - the **preloader** calls [`CodeStorage::load_codes`] once per scanning
//!   session, before the burst begins
//! - the **batch reconciler** calls [`CodeStorage::upsert_validation`] off
//!   the request path, draining the write-behind queue
//!
//! Both operations are idempotent and retryable: `(event_id, code)` is the
//! natural key, so replaying an upsert after a partial failure is safe.
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the trait can be held as `Arc<dyn CodeStorage>` and shared between the
//! preloader and the reconciler.

use crate::code::{PendingValidation, StoredCode};
use crate::types::EventId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by durable storage.
///
/// These never reach scanning clients: preload failures are returned to
/// the session bootstrap, and reconciler failures are absorbed by its
/// retry/backoff loop (visible only as elevated `pending_writes`).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage is temporarily unreachable. Retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Query or write failed for a non-transient reason.
    #[error("storage error: {0}")]
    Io(String),
}

/// Narrow interface to whichever persistence engine backs the pool.
///
/// Implementations must be `Send + Sync`; the pool runtime shares one
/// instance between the preloader and the batch reconciler.
pub trait CodeStorage: Send + Sync {
    /// Load every code known durably for an event, with its used state.
    ///
    /// Returns an empty vector for an event with no issued codes (not an
    /// error - new events start empty).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Unavailable`]: storage unreachable
    /// - [`StorageError::Io`]: query failed
    fn load_codes(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredCode>, StorageError>> + Send + '_>>;

    /// Durably record one accepted validation, keyed by `(event_id, code)`.
    ///
    /// Must be an idempotent upsert: the reconciler delivers at-least-once,
    /// so the same record may arrive twice.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Unavailable`]: storage unreachable (will be retried)
    /// - [`StorageError::Io`]: write failed
    fn upsert_validation(
        &self,
        validation: PendingValidation,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_error_display() {
        let err = StorageError::Unavailable("connection refused".to_string());
        assert!(format!("{err}").contains("unavailable"));
    }

    #[test]
    fn io_error_display() {
        let err = StorageError::Io("constraint violation".to_string());
        assert!(format!("{err}").contains("constraint violation"));
    }
}
