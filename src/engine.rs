// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch engine: normalize → match → metrics + windows → reports.
//!
//! Per-sensor work runs on a rayon pool. Sensors are independent once the
//! export is normalized; they share only the read-only
//! [`RunSpan`](crate::event::RunSpan) and the
//! configuration. Results are merged in sensor order, so the tables are
//! byte-identical across runs over the same input.

use crate::config::EngineConfig;
use crate::ecdf::Ecdf;
use crate::error::{OdteError, Result};
use crate::event::{Direction, EventNormalizer, NormalizedRun};
use crate::manifest::{OutputFiles, RunManifest};
use crate::metrics::{GlobalOdte, SensorAnalysis, SensorMetricRecord};
use crate::report::{self, OutputNames};
use crate::stats::LatencyStats;
use crate::window::{aggregate_windows, SensorWindows, WindowRecord};
use chrono::Utc;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Everything computed for one run, before anything is written.
#[derive(Debug, Clone)]
pub struct RunAnalysis {
    pub records: Vec<SensorMetricRecord>,
    pub windows: Vec<WindowRecord>,
    pub latency_m2s: Vec<(String, LatencyStats)>,
    pub latency_s2m: Vec<(String, LatencyStats)>,
    /// ECDF over all middleware → simulator latencies.
    pub ecdf: Ecdf,
    pub global: GlobalOdte,
    pub total_windows: usize,
}

impl RunAnalysis {
    pub fn latency_stats(&self, direction: Direction) -> &[(String, LatencyStats)] {
        match direction {
            Direction::MiddlewareToSimulator => &self.latency_m2s,
            Direction::SimulatorToMiddleware => &self.latency_s2m,
        }
    }
}

/// Result of [`Engine::run_file`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub analysis: RunAnalysis,
    pub manifest: RunManifest,
    pub manifest_path: std::path::PathBuf,
}

/// The ODTE engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalize an export file with this engine's measurement tag.
    pub fn normalize(&self, input: impl AsRef<Path>) -> Result<NormalizedRun> {
        EventNormalizer::new(self.config.measurement.clone()).from_path(input)
    }

    /// Compute every table for a normalized run.
    pub fn analyze(&self, run: &NormalizedRun) -> Result<RunAnalysis> {
        let config = &self.config;
        let span = run.span;
        let sensors: Vec<_> = run.sensors.iter().collect();

        let work = || -> Vec<(SensorAnalysis, SensorWindows)> {
            sensors
                .par_iter()
                .map(|(name, series)| {
                    let analysis = SensorAnalysis::analyze(name, series, span, config);
                    let windows = SensorWindows::bucket(series, &analysis, span, config);
                    debug!(
                        sensor = %name,
                        m2s_pairs = analysis.pairs_m2s.len(),
                        s2m_pairs = analysis.pairs_s2m.len(),
                        "Sensor analyzed"
                    );
                    (analysis, windows)
                })
                .collect()
        };

        let per_sensor = match config.workers {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| OdteError::WorkerPool(e.to_string()))?
                .install(work),
            None => work(),
        };

        let window_ms = config.window_span_ms();
        let total_windows = span.map_or(0, |s| s.total_windows(window_ms));

        let (analyses, bucketed): (Vec<SensorAnalysis>, Vec<SensorWindows>) =
            per_sensor.into_iter().unzip();
        let windows = aggregate_windows(span, window_ms, &bucketed);

        let mut all_m2s = Vec::new();
        let mut latency_m2s = Vec::with_capacity(analyses.len());
        let mut latency_s2m = Vec::with_capacity(analyses.len());
        let mut records = Vec::with_capacity(analyses.len());

        for analysis in analyses {
            let sensor = analysis.record.sensor.clone();
            let m2s = analysis.latencies(Direction::MiddlewareToSimulator);
            let s2m = analysis.latencies(Direction::SimulatorToMiddleware);
            latency_m2s.push((sensor.clone(), LatencyStats::from_latencies(&m2s)));
            latency_s2m.push((sensor, LatencyStats::from_latencies(&s2m)));
            all_m2s.extend(m2s);
            records.push(analysis.record);
        }

        let global = GlobalOdte::compute(&records);
        info!(
            sensors = records.len(),
            windows = total_windows,
            odte_m2s = ?global.m2s,
            odte_s2m = ?global.s2m,
            "Run analyzed"
        );

        Ok(RunAnalysis {
            records,
            windows,
            latency_m2s,
            latency_s2m,
            ecdf: Ecdf::from_latencies(&all_m2s),
            global,
            total_windows,
        })
    }

    /// Write every table of an analysis under `names`.
    pub fn write_reports(&self, analysis: &RunAnalysis, names: &OutputNames) -> Result<OutputFiles> {
        fs::create_dir_all(names.dir())?;

        let outputs = OutputFiles {
            odte: names.odte(),
            windows: names.windows(),
            ecdf: names.ecdf(),
            latency_stats_m2s: names.latency_stats(Direction::MiddlewareToSimulator),
            latency_stats_s2m: names.latency_stats(Direction::SimulatorToMiddleware),
        };

        report::write_odte_table(&outputs.odte, &analysis.records)?;
        report::write_window_table(&outputs.windows, &analysis.windows)?;
        analysis.ecdf.write_csv(&outputs.ecdf)?;
        report::write_latency_stats(&outputs.latency_stats_m2s, &analysis.latency_m2s)?;
        report::write_latency_stats(&outputs.latency_stats_s2m, &analysis.latency_s2m)?;

        info!(dir = %names.dir().display(), tag = names.tag(), "Reports written");
        Ok(outputs)
    }

    /// Full run over one export file.
    pub fn run_file(
        &self,
        input: impl AsRef<Path>,
        profile: &str,
        out_dir: impl AsRef<Path>,
        tag: Option<String>,
    ) -> Result<RunReport> {
        let input = input.as_ref();
        let now = Utc::now();
        let names = OutputNames::new(
            out_dir.as_ref(),
            profile,
            tag.unwrap_or_else(|| report::default_tag(now)),
        );

        info!(input = %input.display(), profile, "Starting run");
        let run = self.normalize(input)?;
        let analysis = self.analyze(&run)?;
        let outputs = self.write_reports(&analysis, &names)?;

        let manifest = RunManifest {
            profile: profile.to_string(),
            generated_at: now,
            input: input.to_path_buf(),
            span: run.span,
            window_ms: self.config.window_ms,
            deadline_s: self.config.deadline_s,
            total_windows: analysis.total_windows,
            sensor_count: run.sensor_count(),
            rows: run.stats.clone(),
            global_odte: analysis.global,
            outputs,
        };
        let manifest_path = names.manifest();
        manifest.write_json(&manifest_path)?;

        Ok(RunReport {
            analysis,
            manifest,
            manifest_path,
        })
    }
}
