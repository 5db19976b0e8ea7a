// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-window time series of T/R/A/ODTE.
//!
//! Each sensor is bucketed independently into [`SensorWindows`] (this is the
//! part that runs on the worker pool); [`aggregate_windows`] then merges the
//! buckets into one [`WindowRecord`] per window. Every sensor of the run
//! contributes to every window's means, possibly with zeros, so the series
//! keeps a constant population across windows.

use crate::config::EngineConfig;
use crate::event::{Direction, RunSpan, SensorSeries};
use crate::metrics::SensorAnalysis;
use serde::{Deserialize, Serialize};

/// One row of the window table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub window_index: usize,
    /// Window start (epoch ms).
    pub window_start_ms: i64,
    /// Sensors with at least one send in either direction.
    pub sensors_active: usize,
    pub total_sent: usize,
    pub total_received: usize,
    pub t_mean: f64,
    pub r_mean: f64,
    pub a_mean: f64,
    pub odte_mean: f64,
}

/// Per-direction tallies inside one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionCell {
    pub sent: usize,
    pub received: usize,
    pub on_time: usize,
}

impl DirectionCell {
    fn timeliness(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.on_time as f64 / self.received as f64
        }
    }

    fn reliability(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.received as f64 / self.sent as f64
        }
    }
}

/// One sensor's contribution to one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCell {
    pub m2s: DirectionCell,
    pub s2m: DirectionCell,
    pub active: bool,
}

impl WindowCell {
    fn direction_mut(&mut self, direction: Direction) -> &mut DirectionCell {
        match direction {
            Direction::MiddlewareToSimulator => &mut self.m2s,
            Direction::SimulatorToMiddleware => &mut self.s2m,
        }
    }

    fn availability(&self) -> f64 {
        if self.active {
            1.0
        } else {
            0.0
        }
    }

    /// (T, R, ODTE) averaged over both directions.
    fn local_metrics(&self) -> (f64, f64, f64) {
        let a = self.availability();
        let (t_m, r_m) = (self.m2s.timeliness(), self.m2s.reliability());
        let (t_s, r_s) = (self.s2m.timeliness(), self.s2m.reliability());
        (
            (t_m + t_s) / 2.0,
            (r_m + r_s) / 2.0,
            (t_m * r_m * a + t_s * r_s * a) / 2.0,
        )
    }
}

/// A sensor's window buckets, one cell per window of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorWindows {
    pub cells: Vec<WindowCell>,
}

impl SensorWindows {
    /// Bucket a sensor's sends, matched receives and activity.
    pub fn bucket(
        series: &SensorSeries,
        analysis: &SensorAnalysis,
        span: Option<RunSpan>,
        config: &EngineConfig,
    ) -> Self {
        let Some(span) = span else {
            return Self::default();
        };
        let window_ms = config.window_span_ms();
        let mut cells = vec![WindowCell::default(); span.total_windows(window_ms)];

        for direction in Direction::ALL {
            for &t in &series.direction(direction).sent {
                if let Some(idx) = span.window_index(t, window_ms) {
                    cells[idx].direction_mut(direction).sent += 1;
                }
            }
            for pair in analysis.pairs(direction) {
                if let Some(idx) = span.window_index(pair.recv_ms, window_ms) {
                    let cell = cells[idx].direction_mut(direction);
                    cell.received += 1;
                    if config.is_on_time(pair.latency_ms) {
                        cell.on_time += 1;
                    }
                }
            }
        }

        for &t in &series.activity {
            if let Some(idx) = span.window_index(t, window_ms) {
                cells[idx].active = true;
            }
        }

        Self { cells }
    }
}

/// Merge per-sensor buckets into the window table.
///
/// All entries of `sensors` must have been bucketed against the same span
/// and window size.
pub fn aggregate_windows(
    span: Option<RunSpan>,
    window_ms: i64,
    sensors: &[SensorWindows],
) -> Vec<WindowRecord> {
    let Some(span) = span else {
        return Vec::new();
    };
    let total = span.total_windows(window_ms);
    let population = sensors.len();

    (0..total)
        .map(|idx| {
            let mut record = WindowRecord {
                window_index: idx,
                window_start_ms: span.window_start(idx, window_ms),
                sensors_active: 0,
                total_sent: 0,
                total_received: 0,
                t_mean: 0.0,
                r_mean: 0.0,
                a_mean: 0.0,
                odte_mean: 0.0,
            };

            for cell in sensors.iter().filter_map(|s| s.cells.get(idx)) {
                let sent = cell.m2s.sent + cell.s2m.sent;
                if sent > 0 {
                    record.sensors_active += 1;
                }
                record.total_sent += sent;
                record.total_received += cell.m2s.received + cell.s2m.received;

                let (t, r, odte) = cell.local_metrics();
                record.t_mean += t;
                record.r_mean += r;
                record.a_mean += cell.availability();
                record.odte_mean += odte;
            }

            if population > 0 {
                let n = population as f64;
                record.t_mean /= n;
                record.r_mean /= n;
                record.a_mean /= n;
                record.odte_mean /= n;
            }
            record
        })
        .collect()
}
