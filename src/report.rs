// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! CSV report writers and output file naming.
//!
//! Floats are written with fixed precision so that two runs over the same
//! input produce byte-identical tables.

use crate::error::Result;
use crate::event::Direction;
use crate::metrics::SensorMetricRecord;
use crate::stats::LatencyStats;
use crate::window::WindowRecord;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// Column order of the per-sensor ODTE table.
pub const ODTE_HEADER: [&str; 16] = [
    "sensor",
    "m2s_sent_count",
    "m2s_received_count",
    "T_m2s",
    "R_m2s",
    "R_m2s_capped",
    "s2m_sent_count",
    "s2m_received_count",
    "T_s2m",
    "R_s2m",
    "R_s2m_capped",
    "A",
    "ODTE_m2s",
    "ODTE_m2s_capped",
    "ODTE_s2m",
    "ODTE_s2m_capped",
];

/// Column order of the window table.
pub const WINDOW_HEADER: [&str; 9] = [
    "window_start",
    "window_index",
    "sensors_active",
    "total_sent",
    "total_received",
    "T_mean",
    "R_mean",
    "A_mean",
    "ODTE_mean",
];

/// Column order of the latency statistics tables.
pub const LATENCY_HEADER: [&str; 10] = [
    "sensor",
    "count",
    "mean_ms",
    "median_ms",
    "min_ms",
    "max_ms",
    "p95_ms",
    "p99_ms",
    "p999_ms",
    "jitter_ms",
];

/// Tag format used when none is supplied.
pub const TAG_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Tag for output names derived from a UTC instant.
pub fn default_tag(now: DateTime<Utc>) -> String {
    now.format(TAG_FORMAT).to_string()
}

/// Output paths for one run: `<dir>/<profile>_<kind>_<tag>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    dir: PathBuf,
    profile: String,
    tag: String,
}

impl OutputNames {
    pub fn new(dir: impl Into<PathBuf>, profile: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            profile: profile.into(),
            tag: tag.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn file(&self, kind: &str, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.{}", self.profile, kind, self.tag, ext))
    }

    pub fn odte(&self) -> PathBuf {
        self.file("odte", "csv")
    }

    pub fn windows(&self) -> PathBuf {
        self.file("windows", "csv")
    }

    pub fn ecdf(&self) -> PathBuf {
        self.file("ecdf_rtt", "csv")
    }

    pub fn latency_stats(&self, direction: Direction) -> PathBuf {
        self.file(&format!("latency_stats_{}", direction.label()), "csv")
    }

    pub fn manifest(&self) -> PathBuf {
        self.file("run", "json")
    }
}

/// RFC 3339 UTC with milliseconds; out-of-range instants fall back to the
/// raw millisecond count.
pub fn format_instant_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

/// Write the per-sensor ODTE table.
pub fn write_odte_table(path: impl AsRef<Path>, records: &[SensorMetricRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(ODTE_HEADER)?;
    for r in records {
        writer.write_record([
            r.sensor.clone(),
            r.m2s.sent_count.to_string(),
            r.m2s.received_count.to_string(),
            format!("{:.6}", r.m2s.timeliness),
            format!("{:.6}", r.m2s.reliability),
            format!("{:.6}", r.m2s.reliability_capped),
            r.s2m.sent_count.to_string(),
            r.s2m.received_count.to_string(),
            format!("{:.6}", r.s2m.timeliness),
            format!("{:.6}", r.s2m.reliability),
            format!("{:.6}", r.s2m.reliability_capped),
            format!("{:.6}", r.availability),
            format!("{:.9}", r.m2s.odte),
            format!("{:.9}", r.m2s.odte_capped),
            format!("{:.9}", r.s2m.odte),
            format!("{:.9}", r.s2m.odte_capped),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the window table.
pub fn write_window_table(path: impl AsRef<Path>, windows: &[WindowRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(WINDOW_HEADER)?;
    for w in windows {
        writer.write_record([
            format_instant_ms(w.window_start_ms),
            w.window_index.to_string(),
            w.sensors_active.to_string(),
            w.total_sent.to_string(),
            w.total_received.to_string(),
            format!("{:.6}", w.t_mean),
            format!("{:.6}", w.r_mean),
            format!("{:.6}", w.a_mean),
            format!("{:.6}", w.odte_mean),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write one direction's latency statistics, one row per sensor.
pub fn write_latency_stats(
    path: impl AsRef<Path>,
    rows: &[(String, LatencyStats)],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(LATENCY_HEADER)?;
    for (sensor, s) in rows {
        writer.write_record([
            sensor.clone(),
            s.count.to_string(),
            format!("{:.3}", s.mean_ms),
            format!("{:.3}", s.median_ms),
            s.min_ms.to_string(),
            s.max_ms.to_string(),
            format!("{:.3}", s.p95_ms),
            format!("{:.3}", s.p99_ms),
            format!("{:.3}", s.p999_ms),
            format!("{:.3}", s.jitter_ms),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DirectionMetrics;
    use tempfile::tempdir;

    #[test]
    fn test_output_names() {
        let names = OutputNames::new("/out", "urllc", "20250101T000000Z");
        assert_eq!(names.odte(), PathBuf::from("/out/urllc_odte_20250101T000000Z.csv"));
        assert_eq!(
            names.latency_stats(Direction::SimulatorToMiddleware),
            PathBuf::from("/out/urllc_latency_stats_simulator_to_middleware_20250101T000000Z.csv")
        );
        assert_eq!(names.manifest(), PathBuf::from("/out/urllc_run_20250101T000000Z.json"));
    }

    #[test]
    fn test_default_tag_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(default_tag(now), "20250304T050607Z");
    }

    #[test]
    fn test_format_instant_ms() {
        assert_eq!(format_instant_ms(1_250), "1970-01-01T00:00:01.250Z");
    }

    #[test]
    fn test_odte_table_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("odte.csv");
        let record = SensorMetricRecord {
            sensor: "s1".into(),
            m2s: DirectionMetrics {
                sent_count: 3,
                received_count: 2,
                timeliness: 0.5,
                reliability: 2.0 / 3.0,
                reliability_capped: 2.0 / 3.0,
                odte: 1.0 / 3.0,
                odte_capped: 1.0 / 3.0,
            },
            s2m: DirectionMetrics::default(),
            availability: 1.0,
        };
        write_odte_table(&path, &[record]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), ODTE_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "s1,3,2,0.500000,0.666667,0.666667,0,0,0.000000,0.000000,0.000000,\
             1.000000,0.333333333,0.333333333,0.000000000,0.000000000"
        );
    }
}
