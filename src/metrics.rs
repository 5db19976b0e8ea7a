// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Timeliness, reliability, availability and ODTE per sensor.
//!
//! | Metric | Definition | Degenerate case |
//! |--------|------------|-----------------|
//! | **T** | matched pairs within the deadline / matched pairs | no pairs → 0.0 |
//! | **R** | matched pairs / sends | no sends → 0.0 |
//! | **R_capped** | min(R, 1.0) | |
//! | **A** | windows with any activity / total windows | no activity → 0.0 |
//! | **ODTE** | T × R × A (and T × R_capped × A) | |
//!
//! Both directions and both capping states are kept; none of the four ODTE
//! values is authoritative over the others.

use crate::config::EngineConfig;
use crate::event::{Direction, RunSpan, SensorSeries};
use crate::matcher::{match_series, MatchedPair};
use serde::{Deserialize, Serialize};

/// Metrics for one sensor and direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionMetrics {
    pub sent_count: usize,
    /// Matched pairs (each receive counted at most once).
    pub received_count: usize,
    pub timeliness: f64,
    pub reliability: f64,
    pub reliability_capped: f64,
    pub odte: f64,
    pub odte_capped: f64,
}

impl DirectionMetrics {
    pub fn compute(
        sent_count: usize,
        pairs: &[MatchedPair],
        availability: f64,
        config: &EngineConfig,
    ) -> Self {
        let t = timeliness(pairs, config);
        let r = reliability(pairs.len(), sent_count);
        let r_capped = r.min(1.0);
        Self {
            sent_count,
            received_count: pairs.len(),
            timeliness: t,
            reliability: r,
            reliability_capped: r_capped,
            odte: t * r * availability,
            odte_capped: t * r_capped * availability,
        }
    }
}

/// One row of the per-sensor ODTE table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMetricRecord {
    pub sensor: String,
    pub m2s: DirectionMetrics,
    pub s2m: DirectionMetrics,
    pub availability: f64,
}

impl SensorMetricRecord {
    pub fn direction(&self, direction: Direction) -> &DirectionMetrics {
        match direction {
            Direction::MiddlewareToSimulator => &self.m2s,
            Direction::SimulatorToMiddleware => &self.s2m,
        }
    }
}

/// A sensor's metrics together with the pairs they were derived from.
#[derive(Debug, Clone)]
pub struct SensorAnalysis {
    pub record: SensorMetricRecord,
    pub pairs_m2s: Vec<MatchedPair>,
    pub pairs_s2m: Vec<MatchedPair>,
}

impl SensorAnalysis {
    /// Match both directions and derive the sensor's metrics.
    pub fn analyze(
        sensor: &str,
        series: &SensorSeries,
        span: Option<RunSpan>,
        config: &EngineConfig,
    ) -> Self {
        let pairs_m2s = match_series(&series.m2s);
        let pairs_s2m = match_series(&series.s2m);
        let a = availability(&series.activity, span, config.window_span_ms());

        let record = SensorMetricRecord {
            sensor: sensor.to_string(),
            m2s: DirectionMetrics::compute(series.m2s.sent.len(), &pairs_m2s, a, config),
            s2m: DirectionMetrics::compute(series.s2m.sent.len(), &pairs_s2m, a, config),
            availability: a,
        };

        Self {
            record,
            pairs_m2s,
            pairs_s2m,
        }
    }

    pub fn pairs(&self, direction: Direction) -> &[MatchedPair] {
        match direction {
            Direction::MiddlewareToSimulator => &self.pairs_m2s,
            Direction::SimulatorToMiddleware => &self.pairs_s2m,
        }
    }

    pub fn latencies(&self, direction: Direction) -> Vec<i64> {
        self.pairs(direction).iter().map(|p| p.latency_ms).collect()
    }
}

/// Fraction of pairs meeting the deadline; `0.0` without pairs.
pub fn timeliness(pairs: &[MatchedPair], config: &EngineConfig) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let on_time = pairs
        .iter()
        .filter(|p| config.is_on_time(p.latency_ms))
        .count();
    on_time as f64 / pairs.len() as f64
}

/// `matched / sent`; `0.0` without sends. Not capped.
pub fn reliability(matched: usize, sent: usize) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    matched as f64 / sent as f64
}

/// Fraction of the run's windows in which `activity` (sorted) has an event.
pub fn availability(activity: &[i64], span: Option<RunSpan>, window_ms: i64) -> f64 {
    let Some(span) = span else {
        return 0.0;
    };
    let total = span.total_windows(window_ms);
    if total == 0 {
        return 0.0;
    }

    let mut covered = 0usize;
    let mut last: Option<usize> = None;
    for idx in activity
        .iter()
        .filter_map(|&t| span.window_index(t, window_ms))
    {
        if last != Some(idx) {
            covered += 1;
            last = Some(idx);
        }
    }
    covered as f64 / total as f64
}

/// Run-wide ODTE per direction, weighted by each sensor's send count.
///
/// Sensors that never sent in a direction carry no weight there. A
/// direction with no senders at all has no value (`None`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalOdte {
    pub m2s: Option<f64>,
    pub s2m: Option<f64>,
    /// Both directions, weighted by their total send counts.
    pub combined: Option<f64>,
    pub m2s_sent_total: usize,
    pub s2m_sent_total: usize,
}

impl GlobalOdte {
    pub fn compute(records: &[SensorMetricRecord]) -> Self {
        let (m2s, m2s_sent_total) = weighted_odte(records, Direction::MiddlewareToSimulator);
        let (s2m, s2m_sent_total) = weighted_odte(records, Direction::SimulatorToMiddleware);

        let total = m2s_sent_total + s2m_sent_total;
        let combined = (total > 0).then(|| {
            (m2s.unwrap_or(0.0) * m2s_sent_total as f64
                + s2m.unwrap_or(0.0) * s2m_sent_total as f64)
                / total as f64
        });

        Self {
            m2s,
            s2m,
            combined,
            m2s_sent_total,
            s2m_sent_total,
        }
    }
}

fn weighted_odte(records: &[SensorMetricRecord], direction: Direction) -> (Option<f64>, usize) {
    let mut weighted = 0.0;
    let mut total = 0usize;
    for metrics in records
        .iter()
        .map(|r| r.direction(direction))
        .filter(|m| m.sent_count > 0)
    {
        weighted += metrics.odte * metrics.sent_count as f64;
        total += metrics.sent_count;
    }
    let value = (total > 0).then(|| weighted / total as f64);
    (value, total)
}
