// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Cross-run summary.
//!
//! Folds the per-sensor latency statistics, the ECDF table and the ODTE
//! table of a reports directory into a single [`RunSummary`]. Anything that
//! cannot be located or read is `None` and is left out of the output; an
//! unknown value is never written as zero.
//!
//! ## Median-of-medians fallback
//!
//! | Tier | Input |
//! |------|-------|
//! | `filtered` | per-sensor medians with `count >= min_count` |
//! | `unfiltered` | all per-sensor medians |
//! | `means` | per-sensor means |
//!
//! The first non-empty tier is used and reported next to the value.

use crate::config::SummaryConfig;
use crate::ecdf::Ecdf;
use crate::error::{OdteError, Result};
use crate::event::Direction;
use crate::schema::{Column, ColumnMap, LATENCY_STATS_SCHEMA_V1, ODTE_SCHEMA_V1};
use crate::stats::{mean, median};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One row of a latency statistics file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatRow {
    pub mean_ms: f64,
    pub count: u64,
    pub median_ms: Option<f64>,
}

/// Which input produced a median-of-medians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedianTier {
    Filtered,
    Unfiltered,
    Means,
}

impl MedianTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedianTier::Filtered => "filtered",
            MedianTier::Unfiltered => "unfiltered",
            MedianTier::Means => "means",
        }
    }
}

/// Latency summary of one direction across all its stats files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean_ms: Option<f64>,
    pub median_ms: Option<f64>,
    pub median_tier: Option<MedianTier>,
    pub total_count: u64,
}

impl LatencySummary {
    pub fn from_rows(rows: &[StatRow], min_count: u64) -> Self {
        let (mean_ms, total_count) = match weighted_mean(rows) {
            Some((m, c)) => (Some(m), c),
            None => (None, 0),
        };
        let (median_ms, median_tier) = match median_of_medians(rows, min_count) {
            Some((m, tier)) => (Some(m), Some(tier)),
            None => (None, None),
        };
        Self {
            mean_ms,
            median_ms,
            median_tier,
            total_count,
        }
    }
}

/// Mean and median of T, R and A over an ODTE table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdteComponents {
    pub mean_t: Option<f64>,
    pub median_t: Option<f64>,
    pub mean_r: Option<f64>,
    pub median_r: Option<f64>,
    pub mean_a: Option<f64>,
    pub median_a: Option<f64>,
}

/// Summary of one profile's reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub profile: String,
    pub s2m: Option<LatencySummary>,
    pub m2s: Option<LatencySummary>,
    pub p95_ms: Option<f64>,
    pub median_overall_ms: Option<f64>,
    pub cdf_threshold_ms: f64,
    pub cdf_le_threshold: Option<f64>,
    pub odte: OdteComponents,
}

/// Input files found in a reports directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFiles {
    pub stats_s2m: Vec<PathBuf>,
    pub stats_m2s: Vec<PathBuf>,
    /// ECDF candidates, latest first.
    pub ecdf: Vec<PathBuf>,
    pub odte: Option<PathBuf>,
}

const S2M_STATS_MARKERS: [&str; 2] = ["simulator_to_middleware", "simulator_to_middts"];
const M2S_STATS_MARKERS: [&str; 2] = ["middleware_to_simulator", "middts_to_simulator"];

impl ReportFiles {
    /// Scan `dir` for CSV artifacts. An explicit ODTE path takes precedence
    /// over the latest `_odte_` file in the directory.
    pub fn discover(dir: impl AsRef<Path>, odte: Option<PathBuf>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(OdteError::InputNotFound(dir.to_path_buf()));
        }

        let mut csvs: Vec<(String, PathBuf)> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "csv"))
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_string();
                Some((name, p))
            })
            .collect();
        csvs.sort();

        let with_marker = |markers: &[&str]| -> Vec<PathBuf> {
            csvs.iter()
                .filter(|(name, _)| markers.iter().any(|m| name.contains(m)))
                .map(|(_, p)| p.clone())
                .collect()
        };

        let stats_s2m = with_marker(&S2M_STATS_MARKERS);
        let stats_m2s = with_marker(&M2S_STATS_MARKERS);
        let mut ecdf = with_marker(&["ecdf_rtt"]);
        ecdf.reverse();
        let odte = odte.or_else(|| with_marker(&["_odte_"]).pop());

        Ok(Self {
            stats_s2m,
            stats_m2s,
            ecdf,
            odte,
        })
    }

    fn stats(&self, direction: Direction) -> &[PathBuf] {
        match direction {
            Direction::MiddlewareToSimulator => &self.stats_m2s,
            Direction::SimulatorToMiddleware => &self.stats_s2m,
        }
    }
}

impl RunSummary {
    /// Build a summary from discovered files. Unreadable files are logged
    /// and treated as absent.
    pub fn compute(profile: &str, files: &ReportFiles, config: &SummaryConfig) -> Self {
        let latency = |direction: Direction| -> Option<LatencySummary> {
            let paths = files.stats(direction);
            if paths.is_empty() {
                return None;
            }
            let rows = read_stat_files(paths);
            Some(LatencySummary::from_rows(&rows, config.min_count))
        };

        let ecdf = first_nonempty_ecdf(&files.ecdf);
        let odte = match files.odte.as_deref() {
            Some(path) => read_odte_components(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Unreadable ODTE table");
                OdteComponents::default()
            }),
            None => OdteComponents::default(),
        };

        let summary = Self {
            profile: profile.to_string(),
            s2m: latency(Direction::SimulatorToMiddleware),
            m2s: latency(Direction::MiddlewareToSimulator),
            p95_ms: ecdf.as_ref().map(|e| e.percentile(95.0)),
            median_overall_ms: ecdf.as_ref().map(|e| e.percentile(50.0)),
            cdf_threshold_ms: config.cdf_threshold_ms,
            cdf_le_threshold: ecdf.as_ref().map(|e| e.cdf_at(config.cdf_threshold_ms)),
            odte,
        };
        info!(profile, "Computed run summary");
        summary
    }

    /// `key: value` pairs in output order; unknown values are omitted.
    pub fn to_key_values(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut push = |key: String, value: Option<String>| {
            if let Some(v) = value {
                out.push((key, v));
            }
        };

        for (tag, family) in [("S2M", &self.s2m), ("M2S", &self.m2s)] {
            let Some(f) = family else { continue };
            push(format!("mean_{tag}_ms"), f.mean_ms.map(|v| format!("{v:.3}")));
            push(format!("median_{tag}_ms"), f.median_ms.map(|v| format!("{v:.3}")));
            push(
                format!("median_{tag}_source"),
                f.median_tier.map(|t| t.as_str().to_string()),
            );
            push(format!("{tag}_total_count"), Some(f.total_count.to_string()));
        }

        push("P95_ms".into(), self.p95_ms.map(|v| format!("{}", v.round() as i64)));
        push(
            format!("cdf_le_{}", self.cdf_threshold_ms),
            self.cdf_le_threshold.map(|v| format!("{v:.6}")),
        );
        push(
            "median_overall_ms".into(),
            self.median_overall_ms.map(|v| format!("{v:.3}")),
        );

        let o = &self.odte;
        for (key, value) in [
            ("mean_T", o.mean_t),
            ("median_T", o.median_t),
            ("mean_R", o.mean_r),
            ("median_R", o.median_r),
            ("mean_A", o.mean_a),
            ("median_A", o.median_a),
        ] {
            push(key.to_string(), value.map(|v| format!("{v:.6}")));
        }

        out
    }

    /// Append the `key: value` lines to a summary file.
    pub fn append_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        for (key, value) in self.to_key_values() {
            writeln!(file, "{key}: {value}")?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `Σ(mean·count) / Σ(count)` over rows with a positive count, plus the
/// total count. `None` when no row has samples.
pub fn weighted_mean(rows: &[StatRow]) -> Option<(f64, u64)> {
    let (sum, total) = rows
        .iter()
        .filter(|r| r.count > 0)
        .fold((0.0, 0u64), |(sum, total), r| {
            (sum + r.mean_ms * r.count as f64, total + r.count)
        });
    (total > 0).then(|| (sum / total as f64, total))
}

/// Median of per-sensor medians with the three-tier fallback.
pub fn median_of_medians(rows: &[StatRow], min_count: u64) -> Option<(f64, MedianTier)> {
    let with_median: Vec<(f64, u64)> = rows
        .iter()
        .filter(|r| r.count > 0)
        .filter_map(|r| r.median_ms.map(|m| (m, r.count)))
        .collect();

    let filtered: Vec<f64> = with_median
        .iter()
        .filter(|(_, c)| *c >= min_count)
        .map(|(m, _)| *m)
        .collect();
    if let Some(m) = median(&filtered) {
        return Some((m, MedianTier::Filtered));
    }

    let unfiltered: Vec<f64> = with_median.iter().map(|(m, _)| *m).collect();
    if let Some(m) = median(&unfiltered) {
        return Some((m, MedianTier::Unfiltered));
    }

    let means: Vec<f64> = rows
        .iter()
        .filter(|r| r.count > 0)
        .map(|r| r.mean_ms)
        .collect();
    median(&means).map(|m| (m, MedianTier::Means))
}

/// Read one latency statistics file. Rows without a parseable mean are
/// skipped; a missing, blank or unparseable count reads as 1.
pub fn read_stat_file(path: &Path) -> Result<Vec<StatRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let map = LATENCY_STATS_SCHEMA_V1.resolve(reader.headers()?.iter());

    let mut rows = Vec::new();
    for record in reader.records().filter_map(|r| r.ok()) {
        let Some(mean_ms) = parse_f64(&map, &record, Column::Mean) else {
            continue;
        };
        let count = match map.cell(&record, Column::Count) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(c) if c.is_finite() && c >= 0.0 => c.trunc() as u64,
                _ => 1,
            },
            None => 1,
        };
        rows.push(StatRow {
            mean_ms,
            count,
            median_ms: parse_f64(&map, &record, Column::Median),
        });
    }
    Ok(rows)
}

fn read_stat_files(paths: &[PathBuf]) -> Vec<StatRow> {
    let mut rows = Vec::new();
    for path in paths {
        match read_stat_file(path) {
            Ok(mut r) => {
                debug!(path = %path.display(), rows = r.len(), "Read latency stats");
                rows.append(&mut r);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Unreadable latency stats"),
        }
    }
    rows
}

fn first_nonempty_ecdf(candidates: &[PathBuf]) -> Option<Ecdf> {
    candidates.iter().find_map(|path| match Ecdf::read_csv(path) {
        Ok(ecdf) if !ecdf.is_empty() => Some(ecdf),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable ECDF table");
            None
        }
    })
}

/// T and R pool both directions, each gated on that direction's send
/// count; A uses every row. Columns that cannot be resolved stay `None`.
pub fn read_odte_components(path: &Path) -> Result<OdteComponents> {
    if !path.exists() {
        return Err(OdteError::InputNotFound(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let map = ODTE_SCHEMA_V1.resolve(reader.headers()?.iter());

    let mut t = Vec::new();
    let mut r = Vec::new();
    let mut a = Vec::new();

    for record in reader.records().filter_map(|r| r.ok()) {
        let sent_m2s = parse_f64(&map, &record, Column::SentM2s).unwrap_or(0.0);
        let sent_s2m = parse_f64(&map, &record, Column::SentS2m).unwrap_or(0.0);

        for (sent, t_col, r_col) in [
            (sent_m2s, Column::TimelinessM2s, Column::ReliabilityM2s),
            (sent_s2m, Column::TimelinessS2m, Column::ReliabilityS2m),
        ] {
            if sent < 1.0 {
                continue;
            }
            t.extend(parse_f64(&map, &record, t_col));
            r.extend(parse_f64(&map, &record, r_col));
        }
        a.extend(parse_f64(&map, &record, Column::Availability));
    }

    Ok(OdteComponents {
        mean_t: mean(&t),
        median_t: median(&t),
        mean_r: mean(&r),
        median_r: median(&r),
        mean_a: mean(&a),
        median_a: median(&a),
    })
}

fn parse_f64(map: &ColumnMap, record: &csv::StringRecord, column: Column) -> Option<f64> {
    map.cell(record, column)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
