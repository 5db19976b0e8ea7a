// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON manifest describing one engine run.

use crate::error::Result;
use crate::event::{NormalizeStats, RunSpan};
use crate::metrics::GlobalOdte;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Files written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub odte: PathBuf,
    pub windows: PathBuf,
    pub ecdf: PathBuf,
    pub latency_stats_m2s: PathBuf,
    pub latency_stats_s2m: PathBuf,
}

/// Run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub profile: String,
    pub generated_at: DateTime<Utc>,
    pub input: PathBuf,
    pub span: Option<RunSpan>,
    pub window_ms: u64,
    pub deadline_s: f64,
    pub total_windows: usize,
    pub sensor_count: usize,
    pub rows: NormalizeStats,
    pub global_odte: GlobalOdte,
    pub outputs: OutputFiles,
}

impl RunManifest {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
