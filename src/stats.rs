// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Order statistics and per-sensor latency summaries.

use serde::{Deserialize, Serialize};

/// Percentile of an ascending slice, `p` in `[0, 100]`.
///
/// Linear interpolation between order statistics: with `k = (n - 1)·p/100`,
/// `f = floor(k)`, `c = ceil(k)` the result is
/// `x[f]·(c - k) + x[c]·(k - f)`, or `x[k]` when `f == c`.
/// Empty input yields `0.0`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let k = (sorted.len() - 1) as f64 * (p / 100.0);
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return sorted[k as usize];
    }
    sorted[f as usize] * (c - k) + sorted[c as usize] * (k - f)
}

/// Median of an unsorted slice (mean of the two middle values for even n).
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation; `0.0` for fewer than two values.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mu = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
    variance.max(0.0).sqrt()
}

/// Latency summary for one sensor and direction, all in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    /// Population standard deviation.
    pub jitter_ms: f64,
}

impl LatencyStats {
    /// Summarize a set of latencies. An empty set is all zeros.
    pub fn from_latencies(latencies_ms: &[i64]) -> Self {
        if latencies_ms.is_empty() {
            return Self::default();
        }

        let mut sorted = latencies_ms.to_vec();
        sorted.sort_unstable();
        let values: Vec<f64> = sorted.iter().map(|&v| v as f64).collect();

        Self {
            count: sorted.len(),
            mean_ms: mean(&values).unwrap_or(0.0),
            median_ms: median(&values).unwrap_or(0.0),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p95_ms: percentile(&values, 95.0),
            p99_ms: percentile(&values, 99.0),
            p999_ms: percentile(&values, 99.9),
            jitter_ms: population_std_dev(&values),
        }
    }
}
