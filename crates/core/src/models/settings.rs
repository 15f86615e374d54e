use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_HERMES_ENDPOINT: &str = "https://hermes.pyth.network";
pub const DEFAULT_REFERENCE_CURRENCY: &str = "fUSD";

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const DAY_MS: u64 = 24 * 60 * MINUTE_MS;

/// Tunable parameters for the price service and the snapshot tracker.
///
/// Every interval is stored in milliseconds so the struct stays plain
/// JSON; use the `Duration` accessors in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the Pyth Hermes service.
    pub hermes_endpoint: String,

    /// Symbol every rate is expressed against (e.g., "fUSD").
    pub reference_currency: String,

    /// How often the price service polls its feeds.
    pub refresh_interval_ms: u64,

    /// Cached data older than this is reported as stale.
    pub recency_threshold_ms: u64,

    /// Cached data older than this is no longer served; fallback rates are.
    pub stale_grace_ms: u64,

    /// HTTP timeout for a single feed request.
    pub request_timeout_ms: u64,

    /// Pause before reopening a price stream that closed or failed.
    pub stream_reconnect_ms: u64,

    /// Tracker backup timer, fires even when no price update arrives.
    pub snapshot_fallback_interval_ms: u64,

    /// Minimum change in basket value that justifies a new snapshot.
    pub snapshot_min_change: f64,

    /// A snapshot is always taken once the last one is older than this.
    pub snapshot_force_after_ms: u64,

    /// Snapshots older than this are dropped.
    pub snapshot_retention_ms: u64,

    /// Rates served when no usable cached data exists.
    /// Same convention as live rates: units of symbol per reference unit.
    pub fallback_rates: HashMap<String, f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hermes_endpoint: DEFAULT_HERMES_ENDPOINT.to_string(),
            reference_currency: DEFAULT_REFERENCE_CURRENCY.to_string(),
            refresh_interval_ms: 30 * SECOND_MS,
            recency_threshold_ms: MINUTE_MS,
            stale_grace_ms: 5 * MINUTE_MS,
            request_timeout_ms: 30 * SECOND_MS,
            stream_reconnect_ms: 5 * SECOND_MS,
            snapshot_fallback_interval_ms: MINUTE_MS,
            snapshot_min_change: 0.01,
            snapshot_force_after_ms: MINUTE_MS,
            snapshot_retention_ms: 7 * DAY_MS,
            fallback_rates: default_fallback_rates(),
        }
    }
}

/// Rough market rates used until the first successful fetch.
pub fn default_fallback_rates() -> HashMap<String, f64> {
    [
        ("fUSD", 1.0),
        ("fEUR", 0.85),
        ("fGBP", 0.73),
        ("fYEN", 110.0),
        ("fCHF", 0.9),
        ("fINR", 83.0),
    ]
    .into_iter()
    .map(|(symbol, rate)| (symbol.to_string(), rate))
    .collect()
}

impl Settings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hermes_endpoint.trim().is_empty() {
            return Err(CoreError::ConfigMissing("hermes_endpoint".into()));
        }
        if self.reference_currency.trim().is_empty() {
            return Err(CoreError::ConfigMissing("reference_currency".into()));
        }

        let intervals = [
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("recency_threshold_ms", self.recency_threshold_ms),
            ("stale_grace_ms", self.stale_grace_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("stream_reconnect_ms", self.stream_reconnect_ms),
            ("snapshot_fallback_interval_ms", self.snapshot_fallback_interval_ms),
            ("snapshot_force_after_ms", self.snapshot_force_after_ms),
            ("snapshot_retention_ms", self.snapshot_retention_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(CoreError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }

        if !self.snapshot_min_change.is_finite() || self.snapshot_min_change < 0.0 {
            return Err(CoreError::ValidationError(format!(
                "snapshot_min_change must be a non-negative number, got {}",
                self.snapshot_min_change
            )));
        }

        if let Some((symbol, rate)) = self
            .fallback_rates
            .iter()
            .find(|(_, rate)| !rate.is_finite() || **rate <= 0.0)
        {
            return Err(CoreError::ValidationError(format!(
                "Fallback rate for {symbol} must be positive, got {rate}"
            )));
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn recency_threshold(&self) -> Duration {
        Duration::from_millis(self.recency_threshold_ms)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_millis(self.stale_grace_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.stream_reconnect_ms)
    }

    pub fn snapshot_fallback_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_fallback_interval_ms)
    }

    pub fn snapshot_force_after(&self) -> Duration {
        Duration::from_millis(self.snapshot_force_after_ms)
    }

    pub fn snapshot_retention(&self) -> Duration {
        Duration::from_millis(self.snapshot_retention_ms)
    }
}
