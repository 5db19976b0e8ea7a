// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Empirical CDF tables.
//!
//! An [`Ecdf`] is a right-continuous step function stored as
//! `(value, cumulative_fraction)` rows, non-decreasing in both columns with
//! a final fraction of exactly `1.0` when built from samples.
//!
//! ## Reconstruction is lossy
//!
//! [`Ecdf::reconstruct_samples`] inverts the table to produce a synthetic
//! sample set for consumers that want raw samples. It preserves the shape of
//! the marginal distribution only. The points carry no temporal order and no
//! correlation with the original measurements, which is why they come back
//! wrapped in [`ReconstructedSamples`] rather than as a plain vector.

use crate::error::{OdteError, Result};
use crate::stats::percentile;
use std::path::Path;

/// Lowest probability used for reconstruction.
pub const RECONSTRUCTION_P_MIN: f64 = 0.0005;
/// Highest probability used for reconstruction.
pub const RECONSTRUCTION_P_MAX: f64 = 0.9995;

/// One step of the ECDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcdfPoint {
    pub value: f64,
    pub fraction: f64,
}

/// Empirical CDF table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ecdf {
    points: Vec<EcdfPoint>,
}

/// Synthetic samples drawn from an ECDF by inverse interpolation.
///
/// Approximates the distribution shape only; never use these as
/// time-ordered measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedSamples {
    values: Vec<f64>,
}

impl ReconstructedSamples {
    /// Column header used when the samples are written out.
    pub const HEADER: &'static str = "reconstructed_rtt_ms";

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write as a single-column CSV labelled as reconstructed.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([Self::HEADER])?;
        for v in &self.values {
            writer.write_record([v.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Ecdf {
    /// Build from ascending samples: row `i` is `(x[i], (i + 1) / n)`.
    pub fn build(sorted: &[f64]) -> Self {
        let n = sorted.len() as f64;
        let points = sorted
            .iter()
            .enumerate()
            .map(|(i, &value)| EcdfPoint {
                value,
                fraction: (i + 1) as f64 / n,
            })
            .collect();
        Self { points }
    }

    /// Build from unsorted integer latencies.
    pub fn from_latencies(latencies_ms: &[i64]) -> Self {
        let mut sorted = latencies_ms.to_vec();
        sorted.sort_unstable();
        let values: Vec<f64> = sorted.into_iter().map(|v| v as f64).collect();
        Self::build(&values)
    }

    /// Build from stored rows; rows are put in (value, fraction) order.
    pub fn from_points(mut points: Vec<EcdfPoint>) -> Self {
        points.retain(|p| p.value.is_finite() && p.fraction.is_finite());
        points.sort_by(|a, b| {
            a.value
                .total_cmp(&b.value)
                .then(a.fraction.total_cmp(&b.fraction))
        });
        Self { points }
    }

    pub fn points(&self) -> &[EcdfPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fraction at the largest value `<= threshold`, `0.0` if none.
    pub fn cdf_at(&self, threshold: f64) -> f64 {
        let idx = self.points.partition_point(|p| p.value <= threshold);
        if idx == 0 {
            0.0
        } else {
            self.points[idx - 1].fraction
        }
    }

    /// Percentile over the value column (see [`percentile`]).
    pub fn percentile(&self, p: f64) -> f64 {
        let values: Vec<f64> = self.points.iter().map(|pt| pt.value).collect();
        percentile(&values, p)
    }

    /// Draw `n_points` synthetic samples by inverse-CDF interpolation.
    ///
    /// Probabilities are evenly spaced over
    /// `[RECONSTRUCTION_P_MIN, RECONSTRUCTION_P_MAX]`; probabilities outside
    /// the table's range clamp to its first/last value.
    pub fn reconstruct_samples(&self, n_points: usize) -> ReconstructedSamples {
        if self.points.is_empty() || n_points == 0 {
            return ReconstructedSamples { values: Vec::new() };
        }

        let mut by_fraction = self.points.clone();
        by_fraction.sort_by(|a, b| {
            a.fraction
                .total_cmp(&b.fraction)
                .then(a.value.total_cmp(&b.value))
        });

        let step = if n_points > 1 {
            (RECONSTRUCTION_P_MAX - RECONSTRUCTION_P_MIN) / (n_points - 1) as f64
        } else {
            0.0
        };

        let values = (0..n_points)
            .map(|i| inverse_at(&by_fraction, RECONSTRUCTION_P_MIN + step * i as f64))
            .collect();

        ReconstructedSamples { values }
    }

    /// Read an ECDF table (`value,fraction` after one header row).
    /// Unparseable rows are skipped.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OdteError::InputNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let mut points = Vec::new();
        for result in reader.records() {
            let Ok(record) = result else { continue };
            let parsed = (
                record.get(0).and_then(|s| s.trim().parse::<f64>().ok()),
                record.get(1).and_then(|s| s.trim().parse::<f64>().ok()),
            );
            if let (Some(value), Some(fraction)) = parsed {
                points.push(EcdfPoint { value, fraction });
            }
        }

        Ok(Self::from_points(points))
    }

    /// Write as `rtt_ms,cdf`.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["rtt_ms", "cdf"])?;
        for p in &self.points {
            writer.write_record([p.value.to_string(), p.fraction.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Linear interpolation of probability -> value over rows sorted by fraction.
fn inverse_at(by_fraction: &[EcdfPoint], prob: f64) -> f64 {
    let first = by_fraction[0];
    let last = by_fraction[by_fraction.len() - 1];
    if prob <= first.fraction {
        return first.value;
    }
    if prob >= last.fraction {
        return last.value;
    }

    let hi = by_fraction.partition_point(|p| p.fraction < prob);
    let upper = by_fraction[hi];
    let lower = by_fraction[hi - 1];
    let span = upper.fraction - lower.fraction;
    if span <= 0.0 {
        return upper.value;
    }
    lower.value + (upper.value - lower.value) * (prob - lower.fraction) / span
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_build_is_monotonic_and_ends_at_one() {
        let ecdf = Ecdf::from_latencies(&[30, 10, 20, 20, 50]);
        let pts = ecdf.points();
        assert_eq!(pts.len(), 5);
        assert!(pts.windows(2).all(|w| w[0].value <= w[1].value));
        assert!(pts.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        assert_eq!(pts[pts.len() - 1].fraction, 1.0);
        assert_relative_eq!(pts[0].fraction, 0.2);
    }

    #[test]
    fn test_cdf_at_step_lookup() {
        let ecdf = Ecdf::from_latencies(&[100, 200, 200, 300]);
        assert_eq!(ecdf.cdf_at(50.0), 0.0);
        assert_eq!(ecdf.cdf_at(100.0), 0.25);
        assert_eq!(ecdf.cdf_at(150.0), 0.25);
        // Right-continuous: duplicates resolve to the highest fraction.
        assert_eq!(ecdf.cdf_at(200.0), 0.75);
        assert_eq!(ecdf.cdf_at(1_000.0), 1.0);
        assert_eq!(Ecdf::default().cdf_at(10.0), 0.0);
    }

    #[test]
    fn test_percentile_on_table() {
        let ecdf = Ecdf::from_latencies(&[10, 20, 30, 40, 50]);
        assert_eq!(ecdf.percentile(0.0), 10.0);
        assert_eq!(ecdf.percentile(100.0), 50.0);
        assert_relative_eq!(ecdf.percentile(95.0), 48.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reconstruction_shape() {
        let ecdf = Ecdf::from_latencies(&(1..=100).collect::<Vec<i64>>());
        let samples = ecdf.reconstruct_samples(2000);
        assert_eq!(samples.len(), 2000);

        let v = samples.values();
        assert!(v.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(v[0], 1.0);
        assert_relative_eq!(v[v.len() - 1], 99.95, epsilon = 1e-6);
    }

    #[test]
    fn test_reconstruction_degenerate() {
        assert!(Ecdf::default().reconstruct_samples(10).is_empty());
        let ecdf = Ecdf::from_latencies(&[42]);
        let samples = ecdf.reconstruct_samples(3);
        assert_eq!(samples.values(), &[42.0, 42.0, 42.0]);
        assert!(ecdf.reconstruct_samples(0).is_empty());
    }

    #[test]
    fn test_csv_round_trip_skips_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ecdf.csv");
        std::fs::write(&path, "rtt_ms,cdf\n30,1.0\n10,0.5\nbad,row\n\n").unwrap();

        let ecdf = Ecdf::read_csv(&path).unwrap();
        assert_eq!(
            ecdf.points(),
            &[
                EcdfPoint {
                    value: 10.0,
                    fraction: 0.5
                },
                EcdfPoint {
                    value: 30.0,
                    fraction: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_reconstructed_csv_is_labelled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recon.csv");
        Ecdf::from_latencies(&[1, 2, 3])
            .reconstruct_samples(4)
            .write_csv(&path)
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("reconstructed_rtt_ms\n"));
        assert_eq!(text.lines().count(), 5);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(header, vec!["reconstructed_rtt_ms"]);
        let values: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[0].parse().unwrap())
            .collect();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| (1.0..=3.0).contains(v)));
    }
}
