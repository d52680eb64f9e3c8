//! # Gatecheck Core
//!
//! Core types and traits for the gatecheck validation code pool.
//!
//! This crate defines the vocabulary shared by the pool runtime and its
//! collaborators:
//!
//! - **Identifiers**: [`EventId`], [`ValidatorId`]
//! - **Codes**: [`ValidationCode`], [`CodeState`], [`ValidationOutcome`]
//! - **Write-behind**: [`PendingValidation`], the record flushed to durable
//!   storage after a code is marked used
//! - **Storage seam**: [`CodeStorage`], the narrow interface to whatever
//!   persistence engine sits behind the pool
//! - **Time**: [`Clock`], injected so tests can pin timestamps
//!
//! ## Design principles
//!
//! - The in-memory pool owns all live [`ValidationCode`] state; durable
//!   storage is eventually consistent with it via batched upserts.
//! - `NotFound` is a domain answer ("invalid ticket"), never an error.
//! - This crate performs no I/O: the [`CodeStorage`] trait describes I/O,
//!   implementations live elsewhere.

pub mod clock;
pub mod code;
pub mod storage;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use code::{
    CodeState, PendingValidation, PoolStats, StoredCode, ValidationCode, ValidationOutcome,
};
pub use storage::{CodeStorage, StorageError};
pub use types::{EventId, ValidatorId};
