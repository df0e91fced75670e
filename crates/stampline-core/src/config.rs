//! Walker run configuration
//!
//! Deserializes from the `[run]` table of `stampline.toml`; every field is
//! optional and CLI flags override individual values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pacer::BackoffPolicy;

/// Suffix of the companion column holding failure marks (`GEM:status`)
pub const STATUS_SUFFIX: &str = ":status";

/// Prefix of the marks written to status columns for given-up rows
pub const FAILED_PREFIX: &str = "failed:";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Column the annotator's text is written into
    pub target_column: String,
    /// First row index of the run window (inclusive)
    pub start_index: usize,
    /// End of the run window (exclusive); `None` = end of ledger
    pub end_index: Option<usize>,
    /// Maximum rows attempted in one run (quota guard)
    pub limit: Option<usize>,
    /// Minimum pause between consecutive calls, and backoff base
    pub base_delay_seconds: f64,
    /// Growth factor of the backoff delay per consecutive failure
    pub backoff_multiplier: f64,
    /// Total call attempts per row before it is marked failed
    pub max_retries_per_row: u32,
    /// Upper bound for a single backoff pause
    pub max_backoff_seconds: f64,
    /// Extra factor applied to backoff after quota failures
    pub quota_backoff_factor: f64,
    /// Stop the run after this many consecutive rows exhaust their budget
    /// on quota failures (0 = never)
    pub quota_halt_after: u32,
    /// Record `failed:<kind>` in `<target>:status` for skipped rows
    pub track_failures: bool,
    /// Column naming an alternate (pre-processed) source path
    pub source_column: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_column: "annotation".to_string(),
            start_index: 0,
            end_index: None,
            limit: None,
            base_delay_seconds: 5.0,
            backoff_multiplier: 2.0,
            max_retries_per_row: 3,
            max_backoff_seconds: 300.0,
            quota_backoff_factor: 4.0,
            quota_halt_after: 3,
            track_failures: true,
            source_column: None,
        }
    }
}

fn non_negative_seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("{value} is not a non-negative number of seconds"),
        ));
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

impl RunConfig {
    /// Reject settings the walker cannot run with.
    pub fn validate(&self, identity_column: &str) -> Result<(), ConfigError> {
        let target = self.target_column.trim();
        if target.is_empty() {
            return Err(ConfigError::invalid("target_column", "must not be empty"));
        }
        if target == identity_column {
            return Err(ConfigError::invalid(
                "target_column",
                format!("{target:?} is the identity column"),
            ));
        }
        if target.ends_with(STATUS_SUFFIX) {
            return Err(ConfigError::invalid(
                "target_column",
                format!("{target:?} collides with a failure-mark column"),
            ));
        }
        if self.source_column.as_deref() == Some(target) {
            return Err(ConfigError::invalid(
                "source_column",
                "must differ from target_column",
            ));
        }
        if let Some(end) = self.end_index {
            if end < self.start_index {
                return Err(ConfigError::invalid(
                    "end_index",
                    format!("{end} is before start_index {}", self.start_index),
                ));
            }
        }
        if self.max_retries_per_row == 0 {
            return Err(ConfigError::invalid(
                "max_retries_per_row",
                "at least one attempt is required",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier", "must be >= 1.0"));
        }
        if !self.quota_backoff_factor.is_finite() || self.quota_backoff_factor < 1.0 {
            return Err(ConfigError::invalid(
                "quota_backoff_factor",
                "must be >= 1.0",
            ));
        }
        non_negative_seconds("base_delay_seconds", self.base_delay_seconds)?;
        non_negative_seconds("max_backoff_seconds", self.max_backoff_seconds)?;
        Ok(())
    }

    /// Pacing parameters; call after [`validate`](Self::validate).
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::try_from_secs_f64(self.base_delay_seconds).unwrap_or_default(),
            multiplier: self.backoff_multiplier,
            max_retries_per_row: self.max_retries_per_row,
            max_backoff: Duration::try_from_secs_f64(self.max_backoff_seconds)
                .unwrap_or_default(),
            quota_factor: self.quota_backoff_factor,
        }
    }

    /// Companion failure-mark column, when tracking is on
    pub fn status_column(&self) -> Option<String> {
        self.track_failures
            .then(|| format!("{}{STATUS_SUFFIX}", self.target_column.trim()))
    }

    /// Target column name as written to the ledger
    pub fn target(&self) -> &str {
        self.target_column.trim()
    }
}
