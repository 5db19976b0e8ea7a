// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Event normalization.
//!
//! Turns a raw telemetry export into per-sensor, per-direction sorted
//! timestamp sequences. Ingestion is best-effort: a malformed row is
//! counted and dropped, it never aborts the run. Only a missing file or an
//! export without any recognizable header is fatal.
//!
//! The run span (`start_ms`/`stop_ms`) is folded from the accepted rows
//! and returned as an immutable [`RunSpan`]; callers thread it explicitly
//! into availability and window computations.

use crate::error::{OdteError, Result};
use crate::schema::{Column, ColumnMap, EXPORT_SCHEMA_V1};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Which side produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Simulator,
    Middleware,
}

impl Source {
    /// Parse a `source` tag value.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "simulator" | "sim" => Some(Source::Simulator),
            "middts" | "middleware" => Some(Source::Middleware),
            _ => None,
        }
    }
}

/// Which timestamp an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    SentTimestamp,
    ReceivedTimestamp,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "sent_timestamp" => Some(Field::SentTimestamp),
            "received_timestamp" => Some(Field::ReceivedTimestamp),
            _ => None,
        }
    }
}

/// One leg of the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    MiddlewareToSimulator,
    SimulatorToMiddleware,
}

impl Direction {
    pub const ALL: [Direction; 2] = [
        Direction::MiddlewareToSimulator,
        Direction::SimulatorToMiddleware,
    ];

    /// Column suffix used in the ODTE table.
    pub fn short(&self) -> &'static str {
        match self {
            Direction::MiddlewareToSimulator => "m2s",
            Direction::SimulatorToMiddleware => "s2m",
        }
    }

    /// Long form used in file names.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::MiddlewareToSimulator => "middleware_to_simulator",
            Direction::SimulatorToMiddleware => "simulator_to_middleware",
        }
    }
}

/// Whether a timestamp marks the send or the receive side of a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Sent,
    Received,
}

/// (source, field) pair of a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub source: Source,
    pub field: Field,
}

impl Role {
    /// Map a role onto its direction and leg. Every role lands in exactly
    /// one of the four buckets.
    pub fn classify(&self) -> (Direction, Leg) {
        match (self.field, self.source) {
            (Field::SentTimestamp, Source::Middleware) => {
                (Direction::MiddlewareToSimulator, Leg::Sent)
            }
            (Field::ReceivedTimestamp, Source::Simulator) => {
                (Direction::MiddlewareToSimulator, Leg::Received)
            }
            (Field::SentTimestamp, Source::Simulator) => {
                (Direction::SimulatorToMiddleware, Leg::Sent)
            }
            (Field::ReceivedTimestamp, Source::Middleware) => {
                (Direction::SimulatorToMiddleware, Leg::Received)
            }
        }
    }
}

/// A single accepted export row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub sensor: String,
    pub role: Role,
    /// Carried timestamp (epoch ms).
    pub value_ms: i64,
    /// Row time (epoch ms).
    pub time_ms: i64,
}

/// Sorted `sent`/`received` timestamps for one sensor and direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionalSeries {
    pub sent: Vec<i64>,
    pub received: Vec<i64>,
}

/// Everything the engine needs to know about one sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSeries {
    pub m2s: DirectionalSeries,
    pub s2m: DirectionalSeries,
    /// Sorted row times of every accepted event (availability input).
    pub activity: Vec<i64>,
}

impl SensorSeries {
    pub fn direction(&self, direction: Direction) -> &DirectionalSeries {
        match direction {
            Direction::MiddlewareToSimulator => &self.m2s,
            Direction::SimulatorToMiddleware => &self.s2m,
        }
    }

    fn direction_mut(&mut self, direction: Direction) -> &mut DirectionalSeries {
        match direction {
            Direction::MiddlewareToSimulator => &mut self.m2s,
            Direction::SimulatorToMiddleware => &mut self.s2m,
        }
    }

    fn push(&mut self, event: &RawEvent) {
        let (direction, leg) = event.role.classify();
        let series = self.direction_mut(direction);
        match leg {
            Leg::Sent => series.sent.push(event.value_ms),
            Leg::Received => series.received.push(event.value_ms),
        }
        self.activity.push(event.time_ms);
    }

    fn sort(&mut self) {
        self.m2s.sent.sort_unstable();
        self.m2s.received.sort_unstable();
        self.s2m.sent.sort_unstable();
        self.s2m.received.sort_unstable();
        self.activity.sort_unstable();
    }
}

/// First and last event time of a run (epoch ms, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpan {
    pub start_ms: i64,
    pub stop_ms: i64,
}

impl RunSpan {
    fn widen(span: Option<RunSpan>, time_ms: i64) -> RunSpan {
        match span {
            None => RunSpan {
                start_ms: time_ms,
                stop_ms: time_ms,
            },
            Some(s) => RunSpan {
                start_ms: s.start_ms.min(time_ms),
                stop_ms: s.stop_ms.max(time_ms),
            },
        }
    }

    /// `floor((stop - start) / window) + 1`.
    pub fn total_windows(&self, window_ms: i64) -> usize {
        if window_ms <= 0 {
            return 0;
        }
        ((self.stop_ms - self.start_ms) / window_ms) as usize + 1
    }

    /// Window holding `t`, or `None` if `t` lies outside the covered range.
    pub fn window_index(&self, t: i64, window_ms: i64) -> Option<usize> {
        if t < self.start_ms || window_ms <= 0 {
            return None;
        }
        let idx = ((t - self.start_ms) / window_ms) as usize;
        (idx < self.total_windows(window_ms)).then_some(idx)
    }

    /// Start of window `idx` (epoch ms).
    pub fn window_start(&self, idx: usize, window_ms: i64) -> i64 {
        self.start_ms + idx as i64 * window_ms
    }
}

/// Row tallies from one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub header_rows: usize,
    pub data_rows: usize,
    pub accepted: usize,
    pub foreign_measurement: usize,
    pub malformed: usize,
}

/// Output of the normalizer. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRun {
    pub sensors: BTreeMap<String, SensorSeries>,
    pub span: Option<RunSpan>,
    pub stats: NormalizeStats,
}

impl NormalizedRun {
    /// Build a run directly from events (no CSV involved).
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut builder = RunBuilder::default();
        for event in events {
            builder.accept(&event);
        }
        builder.finish()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

#[derive(Default)]
struct RunBuilder {
    sensors: BTreeMap<String, SensorSeries>,
    span: Option<RunSpan>,
    stats: NormalizeStats,
}

impl RunBuilder {
    fn accept(&mut self, event: &RawEvent) {
        self.sensors
            .entry(event.sensor.clone())
            .or_default()
            .push(event);
        self.span = Some(RunSpan::widen(self.span, event.time_ms));
        self.stats.accepted += 1;
    }

    fn finish(mut self) -> NormalizedRun {
        for series in self.sensors.values_mut() {
            series.sort();
        }
        NormalizedRun {
            sensors: self.sensors,
            span: self.span,
            stats: self.stats,
        }
    }
}

/// Result of classifying one data row.
enum RowOutcome {
    Accepted(RawEvent),
    ForeignMeasurement,
    Malformed,
}

/// Parses telemetry exports into a [`NormalizedRun`].
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    measurement: String,
}

impl EventNormalizer {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
        }
    }

    /// Normalize an export file.
    pub fn from_path(&self, path: impl AsRef<Path>) -> Result<NormalizedRun> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OdteError::InputNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        self.from_reader(file, path)
    }

    /// Normalize an export read from `reader`. `origin` is only used for
    /// error reporting.
    pub fn from_reader<R: Read>(&self, reader: R, origin: &Path) -> Result<NormalizedRun> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut builder = RunBuilder::default();
        let mut columns: Option<ColumnMap> = None;

        for result in csv_reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(_) => {
                    builder.stats.malformed += 1;
                    continue;
                }
            };

            if is_header(&record) {
                columns = Some(EXPORT_SCHEMA_V1.resolve(record.iter()));
                builder.stats.header_rows += 1;
                continue;
            }

            // Rows before the first header carry no meaning.
            let Some(map) = columns.as_ref() else {
                continue;
            };

            builder.stats.data_rows += 1;
            match self.classify_row(map, &record) {
                RowOutcome::Accepted(event) => builder.accept(&event),
                RowOutcome::ForeignMeasurement => builder.stats.foreign_measurement += 1,
                RowOutcome::Malformed => builder.stats.malformed += 1,
            }
        }

        if columns.is_none() {
            return Err(OdteError::MissingHeader(origin.to_path_buf()));
        }

        let run = builder.finish();
        debug!(
            accepted = run.stats.accepted,
            malformed = run.stats.malformed,
            foreign = run.stats.foreign_measurement,
            sensors = run.sensors.len(),
            "Normalized export"
        );
        Ok(run)
    }

    fn classify_row(&self, map: &ColumnMap, record: &csv::StringRecord) -> RowOutcome {
        if map.cell(record, Column::Measurement) != Some(self.measurement.as_str()) {
            return RowOutcome::ForeignMeasurement;
        }

        match parse_event(map, record) {
            Some(event) => RowOutcome::Accepted(event),
            None => RowOutcome::Malformed,
        }
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MEASUREMENT)
    }
}

fn parse_event(map: &ColumnMap, record: &csv::StringRecord) -> Option<RawEvent> {
    let sensor = map.cell(record, Column::Sensor)?;
    let source = Source::parse(map.cell(record, Column::Source)?)?;
    let field = Field::parse(map.cell(record, Column::Field)?)?;
    let value_ms = parse_value(map.cell(record, Column::Value)?)?;
    let time_ms = parse_timestamp_ms(map.cell(record, Column::Time)?)?;
    Some(RawEvent {
        sensor: sensor.to_string(),
        role: Role { source, field },
        value_ms,
        time_ms,
    })
}

fn is_header(record: &csv::StringRecord) -> bool {
    record
        .iter()
        .any(|cell| EXPORT_SCHEMA_V1.matches(Column::Measurement, cell))
}

/// Integer value, falling back to a float truncated toward zero.
pub fn parse_value(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
            .map(|v| v.trunc() as i64)
    })
}

/// ISO-8601 / RFC 3339 timestamp to epoch milliseconds. Naive timestamps
/// are taken as UTC.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}
