//! Tunable constants for the reconciliation engine.
//!
//! These are conventions, not hard requirements from either upstream
//! provider: the rate-limiter budget, retry backoff ladder, and fee
//! tolerance are all things an operator may need to adjust. Keeping them as
//! data on a single struct (rather than scattered literals) is what lets
//! `EnvVars` override each one independently.

use crate::utils::env::EnvVars;
use std::time::Duration;

/// Canonical job priorities. Lower value drains first (§4.2).
pub mod priority {
    pub const REVENUE: i32 = 10;
    pub const EXPENSE: i32 = 20;
    pub const SETTLEMENT: i32 = 30;
}

/// Default per-job retry ceiling before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// A `processing` claim older than this with no update is considered
/// abandoned and reset to `failed` at boot (§4.2 `reset-stale`).
pub const STALE_CLAIM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Exponential backoff ladder for transient-remote failures (§4.2).
pub const RETRYABLE_BACKOFF_SECS: [u64; 3] = [30, 120, 480];

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Token-bucket capacity for the global ERP rate limiter.
    pub erp_rate_limiter_capacity: u32,
    /// Token-bucket refill rate, tokens/sec.
    pub erp_rate_limiter_refill_per_sec: u32,
    /// Per-request HTTP timeout for all outbound calls.
    pub http_timeout: Duration,
    /// Bound on concurrent marketplace reads during batch operations.
    pub marketplace_concurrency: usize,
    /// Absolute-value tolerance (in account currency) before a fee
    /// discrepancy is considered worth a compensating entry (§4.8).
    pub fee_validation_tolerance: bigdecimal::BigDecimal,
    /// How many days back the settlement scheduler looks for open parcels.
    pub settlement_lookback_days: i64,
    /// Local hour at which the settlement scheduler runs daily (§4.4).
    pub settlement_daily_hour_local: u32,
    /// How long the worker waits for its in-flight job to finish on shutdown.
    pub worker_shutdown_grace: Duration,
    /// Fixed UTC offset for all sellers in this deployment (§6: UTC-3).
    pub seller_utc_offset_hours: i32,
}

impl ReconciliationConfig {
    pub fn from_env(env: &EnvVars) -> Self {
        use bigdecimal::BigDecimal;
        use std::str::FromStr;

        Self {
            erp_rate_limiter_capacity: env.erp_rate_limiter_capacity,
            erp_rate_limiter_refill_per_sec: env.erp_rate_limiter_refill_per_sec,
            http_timeout: Duration::from_secs(env.http_timeout_secs),
            marketplace_concurrency: env.marketplace_concurrency,
            fee_validation_tolerance: BigDecimal::from_str(&format!(
                "0.{:02}",
                env.fee_validation_tolerance_cents.max(0)
            ))
            .unwrap_or_else(|_| BigDecimal::from_str("0.01").unwrap()),
            settlement_lookback_days: env.settlement_lookback_days,
            settlement_daily_hour_local: env.settlement_daily_hour_local,
            worker_shutdown_grace: Duration::from_secs(env.worker_shutdown_grace_secs),
            seller_utc_offset_hours: -3,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        use bigdecimal::BigDecimal;
        use std::str::FromStr;

        Self {
            erp_rate_limiter_capacity: 9,
            erp_rate_limiter_refill_per_sec: 9,
            http_timeout: Duration::from_secs(30),
            marketplace_concurrency: 10,
            fee_validation_tolerance: BigDecimal::from_str("0.01").unwrap(),
            settlement_lookback_days: 90,
            settlement_daily_hour_local: 10,
            worker_shutdown_grace: Duration::from_secs(10),
            seller_utc_offset_hours: -3,
        }
    }
}
