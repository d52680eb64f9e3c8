//! Microbenchmarks for the validation hot path.
//!
//! `try_validate` is synchronous and lock-bound, so these run without a
//! Tokio runtime. Run with: `cargo bench --bench validate_hot_path`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Bench code can use unwrap/expect

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use gatecheck_core::{EventId, SystemClock, ValidatorId};
use gatecheck_runtime::pool::CodePool;
use std::sync::Arc;

fn bench_validate(c: &mut Criterion) {
    let (pool, _pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let event_id = EventId::new();
    let scanner = ValidatorId::new("bench-gate");

    // A realistically sized pool so map lookups pay for real hashing.
    for _ in 0..10_000 {
        let _ = pool.generate_code(event_id);
    }
    let used_code = pool.generate_code(event_id);
    pool.try_validate(event_id, &used_code, &scanner);

    c.bench_function("validate_already_used", |b| {
        b.iter(|| pool.try_validate(event_id, &used_code, &scanner));
    });

    c.bench_function("validate_not_found", |b| {
        b.iter(|| pool.try_validate(event_id, "never-issued-0000", &scanner));
    });

    c.bench_function("validate_accept", |b| {
        b.iter_batched(
            || pool.generate_code(event_id),
            |code| pool.try_validate(event_id, &code, &scanner),
            BatchSize::SmallInput,
        );
    });
}

fn bench_generate(c: &mut Criterion) {
    let (pool, _pending_rx) = CodePool::new(Arc::new(SystemClock), 24);
    let event_id = EventId::new();

    c.bench_function("generate_code", |b| {
        b.iter(|| pool.generate_code(event_id));
    });
}

criterion_group!(benches, bench_validate, bench_generate);
criterion_main!(benches);
