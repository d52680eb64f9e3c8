//! Validation code value types.
//!
//! A validation code is the short token embedded in a ticket's QR payload.
//! Its whole lifecycle is two states: `Unused` until a scanner accepts it,
//! then `Used` forever. The transition happens exactly once, inside the
//! pool's atomic check-and-set.

use crate::types::{EventId, ValidatorId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a validation code. `Used` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeState {
    /// Code has been issued but not yet scanned.
    Unused,
    /// Code has been accepted at the door. Never reverts.
    Used,
}

/// A validation code held in an event's in-memory pool.
///
/// `used_at` and `used_by` are set exactly once, on the `Unused` → `Used`
/// transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCode {
    /// The scannable token. Unique within the event's live pool.
    pub code: String,
    /// Owning event.
    pub event_id: EventId,
    /// Current state.
    pub state: CodeState,
    /// When the code was accepted, if it has been.
    pub used_at: Option<DateTime<Utc>>,
    /// Which scanner accepted it, if any.
    pub used_by: Option<ValidatorId>,
}

impl ValidationCode {
    /// Create a fresh, unused code for an event.
    #[must_use]
    pub const fn unused(code: String, event_id: EventId) -> Self {
        Self {
            code,
            event_id,
            state: CodeState::Unused,
            used_at: None,
            used_by: None,
        }
    }
}

/// Answer given to a scanning client. Always fast, always definitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// The code was unused and is now marked used. Exactly one caller per
    /// code ever sees this.
    Accepted,
    /// The code was already used (by this call's loser in a race, or long
    /// before).
    AlreadyUsed,
    /// The code was never issued for this event, or the event's pool is
    /// gone. "Invalid ticket", not a system fault.
    NotFound,
}

impl ValidationOutcome {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::AlreadyUsed => "already_used",
            Self::NotFound => "not_found",
        }
    }

    /// True only for [`ValidationOutcome::Accepted`].
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Write-behind record created the instant a code is accepted.
///
/// Delivered to durable storage at-least-once; `(event_id, code)` is the
/// natural key, so a duplicate flush is an idempotent upsert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingValidation {
    /// Owning event.
    pub event_id: EventId,
    /// The accepted code.
    pub code: String,
    /// Acceptance timestamp.
    pub used_at: DateTime<Utc>,
    /// Accepting scanner.
    pub used_by: ValidatorId,
}

/// A code as known to durable storage, used to seed the pool on preload.
///
/// Carries used/unused state so that preloading a partially-used event
/// does not resurrect codes that were burned before the session started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCode {
    /// The code string.
    pub code: String,
    /// State recorded durably.
    pub state: CodeState,
    /// Acceptance timestamp, if used.
    pub used_at: Option<DateTime<Utc>>,
    /// Accepting scanner, if used.
    pub used_by: Option<ValidatorId>,
}

impl StoredCode {
    /// An unused stored code (the common case when issuing tickets).
    #[must_use]
    pub const fn unused(code: String) -> Self {
        Self {
            code,
            state: CodeState::Unused,
            used_at: None,
            used_by: None,
        }
    }

    /// A stored code already marked used.
    #[must_use]
    pub const fn used(code: String, used_at: DateTime<Utc>, used_by: ValidatorId) -> Self {
        Self {
            code,
            state: CodeState::Used,
            used_at: Some(used_at),
            used_by: Some(used_by),
        }
    }
}

/// Point-in-time counters for one event's pool, for dashboards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Codes currently held in the pool.
    pub total: u64,
    /// Codes in the `Used` state.
    pub used: u64,
    /// Codes still `Unused`.
    pub unused: u64,
    /// Validation results not yet durably written (process-wide).
    pub pending_writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_code_has_no_audit_fields() {
        let code = ValidationCode::unused("amber-falcon-x7k2".to_string(), EventId::new());
        assert_eq!(code.state, CodeState::Unused);
        assert!(code.used_at.is_none());
        assert!(code.used_by.is_none());
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(ValidationOutcome::Accepted.as_str(), "accepted");
        assert_eq!(ValidationOutcome::AlreadyUsed.as_str(), "already_used");
        assert_eq!(ValidationOutcome::NotFound.as_str(), "not_found");
    }

    #[test]
    fn only_accepted_is_accepted() {
        assert!(ValidationOutcome::Accepted.is_accepted());
        assert!(!ValidationOutcome::AlreadyUsed.is_accepted());
        assert!(!ValidationOutcome::NotFound.is_accepted());
    }
}
