//! Concurrency tests for the validation hot path.
//!
//! These verify the single-acceptance property: under any number of
//! concurrent scanners racing on the same code, exactly one gets
//! `Accepted` and every other caller gets `AlreadyUsed` - never two
//! accepts, never a lost update.
//!
//! Run with: `cargo test --test concurrency_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use gatecheck_core::{EventId, SystemClock, ValidationOutcome, ValidatorId};
use gatecheck_runtime::pool::CodePool;
use gatecheck_runtime::{HarnessConfig, run_harness};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Test: 100 concurrent validation attempts for a single code.
///
/// Verifies that:
/// - Exactly 1 validation returns `Accepted`
/// - Exactly 99 return `AlreadyUsed`
/// - The pending queue holds exactly one record
#[tokio::test(flavor = "multi_thread")]
async fn test_single_code_100_concurrent_scanners() {
    let (pool, mut pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let event_id = EventId::new();
    pool.insert(event_id, "amber-falcon-x7k2".to_string())
        .unwrap();

    let mut handles = vec![];
    for i in 0..100 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let scanner = ValidatorId::new(format!("scanner-{i}"));
            pool.try_validate(event_id, "amber-falcon-x7k2", &scanner)
        }));
    }

    let outcomes: Vec<ValidationOutcome> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
    let already_used = outcomes
        .iter()
        .filter(|o| **o == ValidationOutcome::AlreadyUsed)
        .count();

    assert_eq!(accepted, 1, "exactly one scanner must win the race");
    assert_eq!(already_used, 99);

    // Exactly one write-behind record was produced.
    assert!(pending_rx.try_recv().is_ok());
    assert!(pending_rx.try_recv().is_err());
}

/// Test: the throughput scenario - 500 validators x 10 validations each
/// against a preloaded pool of 5000 codes.
///
/// Every code is targeted exactly once, so every call must be accepted
/// and the success rate is exactly 1.0 with zero double-accepts.
#[tokio::test(flavor = "multi_thread")]
async fn test_stress_500_validators_5000_codes() {
    let (pool, _pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let config = HarnessConfig {
        validators: 500,
        validations_per_validator: 10,
        inter_call_delay: Duration::ZERO,
        pool_size: 5_000,
    };

    let report = run_harness(&pool, &config).await;

    assert_eq!(report.total_calls, 5_000);
    assert_eq!(report.double_accepts, 0, "no code may be accepted twice");
    assert_eq!(report.accepted, 5_000);
    assert_eq!(report.distinct_codes_accepted, 5_000);
    assert_eq!(report.already_used, 0);
    assert_eq!(report.not_found, 0);
    assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
    assert!(report.peak_concurrency >= 1);
}

/// Test: heavy contention - more calls than codes, every code fought over.
///
/// 200 validators x 50 calls over 1000 codes means each code sees ~10
/// attempts; accepted must equal the number of distinct codes exactly.
#[tokio::test(flavor = "multi_thread")]
async fn test_contended_pool_accepts_each_code_once() {
    let (pool, _pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let config = HarnessConfig {
        validators: 200,
        validations_per_validator: 50,
        inter_call_delay: Duration::ZERO,
        pool_size: 1_000,
    };

    let report = run_harness(&pool, &config).await;

    assert_eq!(report.total_calls, 10_000);
    assert_eq!(report.double_accepts, 0);
    assert_eq!(report.accepted, 1_000);
    assert_eq!(report.distinct_codes_accepted, 1_000);
    assert_eq!(report.already_used, 9_000);
}

/// Test: generation racing validation on the same event never corrupts
/// counters.
#[tokio::test(flavor = "multi_thread")]
async fn test_generation_and_validation_interleave() {
    let (pool, _pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let event_id = EventId::new();
    let validated = Arc::new(AtomicU64::new(0));

    let mut handles = vec![];
    for i in 0..16 {
        let pool = Arc::clone(&pool);
        let validated = Arc::clone(&validated);
        handles.push(tokio::spawn(async move {
            let scanner = ValidatorId::new(format!("gate-{i}"));
            for _ in 0..250 {
                let code = pool.generate_code(event_id);
                if pool.try_validate(event_id, &code, &scanner).is_accepted() {
                    validated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    futures::future::join_all(handles).await;

    let stats = pool.stats(event_id);
    assert_eq!(stats.total, 16 * 250);
    assert_eq!(stats.used, validated.load(Ordering::Relaxed));
    assert_eq!(stats.used, 16 * 250, "every generated code was validated once");
    assert_eq!(stats.unused, 0);
}
