// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration for the ODTE engine and the cross-run summary.
//!
//! Every field has a default, so a JSON file only needs the keys it wants
//! to change.

use crate::error::{OdteError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default availability / aggregation window (10 s).
pub const DEFAULT_WINDOW_MS: u64 = 10_000;

/// Default timeliness deadline (200 ms).
pub const DEFAULT_DEADLINE_S: f64 = 0.2;

/// Default noise floor for median-of-medians.
pub const DEFAULT_MIN_COUNT: u64 = 5;

/// Default number of points produced by ECDF reconstruction.
pub const DEFAULT_RECONSTRUCTION_POINTS: usize = 2000;

/// Default threshold for the `cdf_le_200` summary value.
pub const DEFAULT_CDF_THRESHOLD_MS: f64 = 200.0;

/// Measurement tag carried by telemetry rows in the export.
pub const DEFAULT_MEASUREMENT: &str = "device_data";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OdteConfig {
    /// Engine (per-run) parameters.
    pub engine: EngineConfig,
    /// Cross-run summary parameters.
    pub summary: SummaryConfig,
}

impl OdteConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OdteError::InputNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let config: OdteConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the metrics undefined.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.summary.validate()
    }
}

/// Per-run engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Measurement tag of the rows to keep; all others are discarded.
    pub measurement: String,
    /// Window length in milliseconds (availability and time series).
    pub window_ms: u64,
    /// Timeliness deadline in seconds.
    pub deadline_s: f64,
    /// Point count for ECDF reconstruction.
    pub reconstruction_points: usize,
    /// Worker threads for per-sensor processing. `None` = one per core.
    pub workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            measurement: DEFAULT_MEASUREMENT.to_string(),
            window_ms: DEFAULT_WINDOW_MS,
            deadline_s: DEFAULT_DEADLINE_S,
            reconstruction_points: DEFAULT_RECONSTRUCTION_POINTS,
            workers: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(OdteError::InvalidConfig(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if !self.deadline_s.is_finite() || self.deadline_s < 0.0 {
            return Err(OdteError::InvalidConfig(format!(
                "deadline_s must be a non-negative number, got {}",
                self.deadline_s
            )));
        }
        if self.workers == Some(0) {
            return Err(OdteError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.measurement.is_empty() {
            return Err(OdteError::InvalidConfig(
                "measurement tag must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Window length as a signed millisecond span, for timestamp arithmetic.
    pub fn window_span_ms(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }

    /// Whether a latency (ms) meets the deadline.
    pub fn is_on_time(&self, latency_ms: i64) -> bool {
        (latency_ms as f64 / 1000.0) <= self.deadline_s
    }
}

/// Cross-run summary parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Minimum per-sensor sample count to enter median-of-medians.
    pub min_count: u64,
    /// Threshold (ms) for the CDF-at-threshold summary value.
    pub cdf_threshold_ms: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            min_count: DEFAULT_MIN_COUNT,
            cdf_threshold_ms: DEFAULT_CDF_THRESHOLD_MS,
        }
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.cdf_threshold_ms.is_finite() {
            return Err(OdteError::InvalidConfig(
                "cdf_threshold_ms must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
