//! Pool metrics for monitoring and dashboards.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `gatecheck_validations_total{outcome}` - Validation calls by outcome
//! - `gatecheck_codes_generated_total` - Codes minted into pools
//! - `gatecheck_code_collision_retries_total` - Generation retries caused by collisions
//! - `gatecheck_codes_preloaded_total` - Codes seeded by the preloader
//! - `gatecheck_pools_evicted_total` - Event pools dropped by eviction
//! - `gatecheck_flush_failures_total` - Records that failed a flush cycle (re-queued)
//!
//! ## Gauges
//! - `gatecheck_pending_writes` - Validation results awaiting durable write
//!
//! ## Histograms
//! - `gatecheck_flush_batch_size` - Records per reconciler flush
//! - `gatecheck_flush_duration_seconds` - Wall-clock time per flush

use gatecheck_core::ValidationOutcome;
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all pool metric descriptions.
///
/// Call once at process startup, before any metrics are recorded.
pub fn register_pool_metrics() {
    describe_counter!(
        "gatecheck_validations_total",
        "Total validation calls by outcome (accepted, already_used, not_found)"
    );
    describe_counter!(
        "gatecheck_codes_generated_total",
        "Total validation codes generated into event pools"
    );
    describe_counter!(
        "gatecheck_code_collision_retries_total",
        "Generation attempts discarded due to in-pool collisions"
    );
    describe_counter!(
        "gatecheck_codes_preloaded_total",
        "Codes seeded into pools by the preloader"
    );
    describe_counter!(
        "gatecheck_pools_evicted_total",
        "Event pools evicted after the retention window"
    );
    describe_counter!(
        "gatecheck_flush_failures_total",
        "Pending validations that failed a flush cycle and were re-queued"
    );
    describe_gauge!(
        "gatecheck_pending_writes",
        "Validation results accepted in memory but not yet durably written"
    );
    describe_histogram!(
        "gatecheck_flush_batch_size",
        "Number of records written per reconciler flush"
    );
    describe_histogram!(
        "gatecheck_flush_duration_seconds",
        "Wall-clock time of one reconciler flush"
    );

    tracing::info!("Pool metrics registered");
}

/// Record one validation call.
pub fn record_validation(outcome: ValidationOutcome) {
    metrics::counter!("gatecheck_validations_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record one validation result queued for the reconciler.
///
/// The gauge moves only with the write-behind queue: up here, down in
/// [`record_flush`]. An accepted validation whose record could not be
/// queued does not touch it.
pub fn record_pending_enqueued() {
    metrics::gauge!("gatecheck_pending_writes").increment(1.0);
}

/// Record a successful code generation and how many collision retries it cost.
pub fn record_code_generated(collision_retries: u64) {
    metrics::counter!("gatecheck_codes_generated_total").increment(1);
    if collision_retries > 0 {
        metrics::counter!("gatecheck_code_collision_retries_total").increment(collision_retries);
        tracing::debug!(collision_retries, "Code generation needed retries");
    }
}

/// Record codes newly seeded by a preload.
pub fn record_preload(count: u64) {
    metrics::counter!("gatecheck_codes_preloaded_total").increment(count);
}

/// Record an evicted event pool.
pub fn record_pool_evicted() {
    metrics::counter!("gatecheck_pools_evicted_total").increment(1);
}

/// Record one reconciler flush.
///
/// # Arguments
///
/// * `written` - Records durably written this flush
/// * `failed` - Records that failed and were re-queued
/// * `duration_secs` - Wall-clock flush time in seconds
#[allow(clippy::cast_precision_loss)]
pub fn record_flush(written: usize, failed: usize, duration_secs: f64) {
    metrics::histogram!("gatecheck_flush_batch_size").record(written as f64);
    metrics::histogram!("gatecheck_flush_duration_seconds").record(duration_secs);
    metrics::gauge!("gatecheck_pending_writes").decrement(written as f64);
    if failed > 0 {
        metrics::counter!("gatecheck_flush_failures_total").increment(failed as u64);
    }
    tracing::debug!(written, failed, duration_secs, "Recorded flush metrics");
}
