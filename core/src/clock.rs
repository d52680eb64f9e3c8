//! Clock abstraction for timestamping validations.
//!
//! The pool stamps `used_at` through an injected [`Clock`] rather than
//! calling `Utc::now()` directly, so tests can pin time (see `FixedClock`
//! in `gatecheck-testing`).

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
