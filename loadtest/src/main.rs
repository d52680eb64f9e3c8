//! Load-test binary for the validation code pool.
//!
//! Drives the synthetic load harness against a full runtime (pool plus
//! batch reconciler and retention sweeper) backed by in-memory storage,
//! then prints the measured report as JSON on stdout.
//!
//! The load shape comes from `GATECHECK_HARNESS_*` environment variables
//! and the runtime tuning from the `GATECHECK_*` pool variables; both
//! fall back to the defaults (500 validators x 10 validations against a
//! pool of 5000 codes).
//!
//! ```sh
//! GATECHECK_HARNESS_VALIDATORS=1000 cargo run --release -p gatecheck-loadtest
//! ```

use gatecheck_core::SystemClock;
use gatecheck_runtime::{HarnessConfig, PoolConfig, PoolRuntime, run_harness};
use gatecheck_testing::mocks::InMemoryCodeStorage;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let harness_config = HarnessConfig::from_env();
    let pool_config = PoolConfig::from_env();
    tracing::info!(
        validators = harness_config.validators,
        per_validator = harness_config.validations_per_validator,
        pool_size = harness_config.pool_size,
        "starting load test"
    );

    let storage = Arc::new(InMemoryCodeStorage::new());
    let runtime = PoolRuntime::start(
        Arc::clone(&storage) as Arc<dyn gatecheck_core::CodeStorage>,
        Arc::new(SystemClock),
        pool_config,
    );

    let report = run_harness(&runtime.pool(), &harness_config).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.double_accepts > 0 {
        tracing::error!(
            double_accepts = report.double_accepts,
            "single-acceptance violated"
        );
        runtime.shutdown(Duration::from_secs(30)).await?;
        return Err("load test observed a code accepted more than once".into());
    }

    // Drain the write-behind queue so the run exercises the full cycle.
    runtime.shutdown(Duration::from_secs(30)).await?;
    tracing::info!(
        durable_writes = storage.upsert_count(),
        "load test complete, all validations durably written"
    );
    Ok(())
}
