//! Configuration for the pool runtime.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::retry::RetryPolicy;
use std::env;
use std::time::Duration;

/// Tunables for the code pool, reconciler and sweeper.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How often the reconciler flushes, absent a full batch.
    pub reconcile_interval: Duration,
    /// Flush as soon as this many validations are buffered.
    pub max_batch: usize,
    /// Backoff policy for storage writes that fail mid-flush.
    pub flush_retry: RetryPolicy,
    /// Evict an event pool after this much inactivity.
    pub retention: Duration,
    /// How often the sweeper checks for idle pools.
    pub sweep_interval: Duration,
    /// Generation attempts before falling back to a time-derived suffix.
    pub max_generate_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(2),
            max_batch: 256,
            flush_retry: RetryPolicy::default(),
            retention: Duration::from_secs(6 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            max_generate_attempts: 24,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to the defaults:
    ///
    /// - `GATECHECK_RECONCILE_INTERVAL_MS` (default: 2000)
    /// - `GATECHECK_MAX_BATCH` (default: 256)
    /// - `GATECHECK_FLUSH_MAX_RETRIES` (default: 4)
    /// - `GATECHECK_RETENTION_SECS` (default: 21600, i.e. 6 hours)
    /// - `GATECHECK_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `GATECHECK_MAX_GENERATE_ATTEMPTS` (default: 24)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reconcile_interval: env_duration_ms(
                "GATECHECK_RECONCILE_INTERVAL_MS",
                defaults.reconcile_interval,
            ),
            max_batch: env_parsed("GATECHECK_MAX_BATCH", defaults.max_batch),
            flush_retry: RetryPolicy::builder()
                .max_retries(env_parsed(
                    "GATECHECK_FLUSH_MAX_RETRIES",
                    defaults.flush_retry.max_retries,
                ))
                .build(),
            retention: env_duration_secs("GATECHECK_RETENTION_SECS", defaults.retention),
            sweep_interval: env_duration_secs(
                "GATECHECK_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval,
            ),
            max_generate_attempts: env_parsed(
                "GATECHECK_MAX_GENERATE_ATTEMPTS",
                defaults.max_generate_attempts,
            ),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(default, Duration::from_millis)
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PoolConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(2));
        assert_eq!(config.max_batch, 256);
        assert_eq!(config.max_generate_attempts, 24);
        assert!(config.retention > config.sweep_interval);
    }

    #[test]
    fn from_env_without_vars_matches_defaults() {
        // Relies on the GATECHECK_* vars being unset in the test environment.
        let config = PoolConfig::from_env();
        assert_eq!(config.max_batch, PoolConfig::default().max_batch);
        assert_eq!(
            config.flush_retry.max_retries,
            PoolConfig::default().flush_retry.max_retries
        );
    }
}
