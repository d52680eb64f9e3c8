//! Synthetic load harness for the validation hot path.
//!
//! Not part of the production request path: this exists to characterize
//! throughput and to catch performance regressions. It spawns a
//! configurable number of concurrent validator tasks against a freshly
//! generated pool and reports measured throughput, peak concurrency and
//! the exact success rate (distinct codes accepted / total calls).
//!
//! The binary wrapper lives in `gatecheck-loadtest`.

use crate::pool::CodePool;
use gatecheck_core::{EventId, ValidationOutcome, ValidatorId};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Load shape for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Concurrent validator tasks.
    pub validators: usize,
    /// Validation calls per task.
    pub validations_per_validator: usize,
    /// Pause between calls within one task (zero = full throttle).
    pub inter_call_delay: Duration,
    /// Codes generated into the pool before the run.
    pub pool_size: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            validators: 500,
            validations_per_validator: 10,
            inter_call_delay: Duration::ZERO,
            pool_size: 5_000,
        }
    }
}

impl HarnessConfig {
    /// Load the load shape from `GATECHECK_HARNESS_*` environment
    /// variables, falling back to the defaults (500 validators x 10
    /// calls against 5000 codes).
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            validators: env_parsed("GATECHECK_HARNESS_VALIDATORS", defaults.validators),
            validations_per_validator: env_parsed(
                "GATECHECK_HARNESS_VALIDATIONS",
                defaults.validations_per_validator,
            ),
            inter_call_delay: Duration::from_millis(env_parsed(
                "GATECHECK_HARNESS_DELAY_MS",
                0_u64,
            )),
            pool_size: env_parsed("GATECHECK_HARNESS_POOL_SIZE", defaults.pool_size),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Measured results of one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    /// Concurrent validator tasks.
    pub validators: usize,
    /// Total validation calls issued.
    pub total_calls: u64,
    /// Calls that returned `Accepted`.
    pub accepted: u64,
    /// Calls that returned `AlreadyUsed`.
    pub already_used: u64,
    /// Calls that returned `NotFound`.
    pub not_found: u64,
    /// Codes accepted at least once.
    pub distinct_codes_accepted: u64,
    /// Codes accepted more than once. Must always be zero.
    pub double_accepts: u64,
    /// Wall-clock time of the whole run.
    pub elapsed_ms: u64,
    /// `total_calls / elapsed`.
    pub throughput_per_sec: f64,
    /// `distinct_codes_accepted / total_calls`.
    pub success_rate: f64,
    /// Highest number of calls observed in flight at once.
    pub peak_concurrency: usize,
}

/// Run the harness against a pool.
///
/// Generates `pool_size` codes for a synthetic event, then spawns
/// `validators` tasks that walk the code list in disjoint strides so every
/// code is contended realistically. Per-code accept counters prove the
/// single-acceptance property for the run.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub async fn run_harness(pool: &Arc<CodePool>, config: &HarnessConfig) -> HarnessReport {
    let event_id = EventId::new();
    let codes: Arc<Vec<String>> = Arc::new(
        (0..config.pool_size)
            .map(|_| pool.generate_code(event_id))
            .collect(),
    );
    tracing::info!(
        validators = config.validators,
        per_validator = config.validations_per_validator,
        pool_size = codes.len(),
        "harness pool generated, starting load"
    );

    let accepted = Arc::new(AtomicU64::new(0));
    let already_used = Arc::new(AtomicU64::new(0));
    let not_found = Arc::new(AtomicU64::new(0));
    let accepts_per_code: Arc<Vec<AtomicU32>> =
        Arc::new((0..codes.len()).map(|_| AtomicU32::new(0)).collect());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(config.validators);
    for validator_index in 0..config.validators {
        let pool = Arc::clone(pool);
        let codes = Arc::clone(&codes);
        let accepted = Arc::clone(&accepted);
        let already_used = Arc::clone(&already_used);
        let not_found = Arc::clone(&not_found);
        let accepts_per_code = Arc::clone(&accepts_per_code);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        let calls = config.validations_per_validator;
        let delay = config.inter_call_delay;

        tasks.push(tokio::spawn(async move {
            let validator = ValidatorId::new(format!("harness-{validator_index}"));
            for call in 0..calls {
                let index = (validator_index * calls + call) % codes.len();

                let current = in_flight.fetch_add(1, Ordering::Relaxed) + 1;
                peak.fetch_max(current, Ordering::Relaxed);
                let outcome = pool.try_validate(event_id, &codes[index], &validator);
                in_flight.fetch_sub(1, Ordering::Relaxed);

                match outcome {
                    ValidationOutcome::Accepted => {
                        accepted.fetch_add(1, Ordering::Relaxed);
                        accepts_per_code[index].fetch_add(1, Ordering::Relaxed);
                    }
                    ValidationOutcome::AlreadyUsed => {
                        already_used.fetch_add(1, Ordering::Relaxed);
                    }
                    ValidationOutcome::NotFound => {
                        not_found.fetch_add(1, Ordering::Relaxed);
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }));
    }
    futures::future::join_all(tasks).await;
    let elapsed = started.elapsed();

    let total_calls = (config.validators * config.validations_per_validator) as u64;
    let distinct = accepts_per_code
        .iter()
        .filter(|count| count.load(Ordering::Relaxed) > 0)
        .count() as u64;
    let double_accepts = accepts_per_code
        .iter()
        .map(|count| u64::from(count.load(Ordering::Relaxed).saturating_sub(1)))
        .sum();

    let report = HarnessReport {
        validators: config.validators,
        total_calls,
        accepted: accepted.load(Ordering::Relaxed),
        already_used: already_used.load(Ordering::Relaxed),
        not_found: not_found.load(Ordering::Relaxed),
        distinct_codes_accepted: distinct,
        double_accepts,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        throughput_per_sec: total_calls as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        success_rate: if total_calls == 0 {
            0.0
        } else {
            distinct as f64 / total_calls as f64
        },
        peak_concurrency: peak.load(Ordering::Relaxed),
    };
    tracing::info!(
        accepted = report.accepted,
        throughput_per_sec = report.throughput_per_sec,
        peak_concurrency = report.peak_concurrency,
        "harness run complete"
    );
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatecheck_core::SystemClock;

    #[tokio::test(flavor = "multi_thread")]
    async fn small_run_accepts_each_code_exactly_once() {
        let (pool, _rx) = CodePool::new(Arc::new(SystemClock), 24);
        let config = HarnessConfig {
            validators: 8,
            validations_per_validator: 25,
            inter_call_delay: Duration::ZERO,
            pool_size: 100,
        };

        let report = run_harness(&pool, &config).await;

        assert_eq!(report.total_calls, 200);
        assert_eq!(report.double_accepts, 0);
        assert_eq!(report.accepted, report.distinct_codes_accepted);
        // 8 tasks x 25 calls cover indices 0..200 over a pool of 100, so
        // every code is hit twice: one accept, one already-used.
        assert_eq!(report.accepted, 100);
        assert_eq!(report.already_used, 100);
        assert_eq!(report.not_found, 0);
        assert!((report.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn config_defaults_match_the_throughput_scenario() {
        let config = HarnessConfig::default();
        assert_eq!(config.validators, 500);
        assert_eq!(config.validations_per_validator, 10);
        assert_eq!(config.pool_size, 5_000);
    }
}
