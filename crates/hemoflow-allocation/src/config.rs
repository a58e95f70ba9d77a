//! Configuration types for the allocation engine and scheduler.

use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration for fulfillment and reconciliation.
#[derive(Clone, Debug, Deserialize)]
pub struct AllocationConfig {
    /// Seconds between reconciliation sweeps.
    pub sweep_interval_secs: u64,

    /// How many times a fulfillment attempt is retried after a commit
    /// conflict before the request is left for the next sweep.
    pub max_commit_retries: u32,

    /// Hours between creating a donor match and its scheduled visit.
    pub match_lead_time_hours: i64,

    /// Location recorded on inventory rows created by donation intake.
    pub default_stock_location: String,

    /// Unit recorded on inventory rows created by donation intake.
    pub default_stock_unit: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: crate::DEFAULT_SWEEP_INTERVAL_SECS,
            max_commit_retries: crate::DEFAULT_MAX_COMMIT_RETRIES,
            match_lead_time_hours: crate::DEFAULT_MATCH_LEAD_TIME_HOURS,
            default_stock_location: crate::DEFAULT_STOCK_LOCATION.to_string(),
            default_stock_unit: crate::DEFAULT_STOCK_UNIT.to_string(),
        }
    }
}

impl AllocationConfig {
    /// Creates a config with a short sweep interval for testing.
    pub fn for_testing() -> Self {
        Self {
            sweep_interval_secs: 1,
            ..Default::default()
        }
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Lead time applied to the scheduled date of new donor matches.
    pub fn match_lead_time(&self) -> chrono::Duration {
        chrono::Duration::hours(self.match_lead_time_hours)
    }
}
