// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Column schemas for the tables ODTE reads.
//!
//! Each schema is a versioned lookup table of accepted header aliases per
//! logical column. Aliases are tried in order and the first one present in
//! the header wins, so ambiguity is resolved here and nowhere else.

use csv::StringRecord;
use std::collections::HashMap;
use tracing::debug;

/// Logical columns known to ODTE, independent of their header spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    // Raw telemetry export
    Measurement,
    Sensor,
    Source,
    Field,
    Value,
    Time,
    // Per-sensor latency statistics
    Mean,
    Median,
    Count,
    // Per-sensor ODTE table
    TimelinessM2s,
    TimelinessS2m,
    ReliabilityM2s,
    ReliabilityS2m,
    Availability,
    SentM2s,
    SentS2m,
}

/// A versioned alias table.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub version: u32,
    entries: &'static [(Column, &'static [&'static str])],
}

/// Raw InfluxDB export (`_measurement`, `_field`, `_value`, `_time`, tags).
pub static EXPORT_SCHEMA_V1: Schema = Schema {
    name: "export",
    version: 1,
    entries: &[
        (Column::Measurement, &["_measurement", "measurement"]),
        (Column::Sensor, &["sensor", "device", "sensor_id"]),
        (Column::Source, &["source"]),
        (Column::Field, &["_field", "field"]),
        (Column::Value, &["_value", "value"]),
        (Column::Time, &["_time", "time"]),
    ],
};

/// Per-sensor latency statistics, including legacy spellings.
pub static LATENCY_STATS_SCHEMA_V1: Schema = Schema {
    name: "latency_stats",
    version: 1,
    entries: &[
        (Column::Sensor, &["sensor", "device", "sensor_id"]),
        (
            Column::Mean,
            &["mean_ms", "mean", "media_ms", "mean_latency_ms"],
        ),
        (Column::Count, &["count", "n", "samples"]),
        (Column::Median, &["median_ms", "median", "mediana"]),
    ],
};

/// Per-sensor ODTE table, current and legacy column names.
pub static ODTE_SCHEMA_V1: Schema = Schema {
    name: "odte",
    version: 1,
    entries: &[
        (Column::Sensor, &["sensor", "device", "sensor_id"]),
        (Column::TimelinessM2s, &["T_m2s", "t_m2s"]),
        (Column::TimelinessS2m, &["T_s2m", "t_s2m"]),
        (Column::ReliabilityM2s, &["R_m2s", "r_m2s"]),
        (Column::ReliabilityS2m, &["R_s2m", "r_s2m"]),
        (Column::Availability, &["A", "a", "availability"]),
        (Column::SentM2s, &["m2s_sent_count", "middts_sent_count"]),
        (Column::SentS2m, &["s2m_sent_count", "sim_sent_count"]),
    ],
};

impl Schema {
    /// Accepted header names for a logical column, in priority order.
    pub fn aliases(&self, column: Column) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    /// Whether `header` names `column` under this schema.
    pub fn matches(&self, column: Column, header: &str) -> bool {
        let header = normalize_header(header);
        self.aliases(column).iter().any(|a| *a == header)
    }

    /// Resolve a header row into column positions.
    pub fn resolve<'a, I>(&self, headers: I) -> ColumnMap
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<&str> = headers.into_iter().map(normalize_header).collect();
        let mut indices = HashMap::new();

        for (column, aliases) in self.entries {
            let position = aliases
                .iter()
                .find_map(|alias| headers.iter().position(|h| h == alias));
            if let Some(idx) = position {
                indices.insert(*column, idx);
            }
        }

        debug!(
            schema = self.name,
            version = self.version,
            resolved = indices.len(),
            expected = self.entries.len(),
            "Header resolved"
        );
        ColumnMap { indices }
    }
}

/// Header cells are trimmed; a UTF-8 BOM on the first cell is dropped.
fn normalize_header(header: &str) -> &str {
    header.trim().trim_start_matches('\u{feff}')
}

/// Resolved column positions for one header row.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    indices: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn index(&self, column: Column) -> Option<usize> {
        self.indices.get(&column).copied()
    }

    pub fn contains(&self, column: Column) -> bool {
        self.indices.contains_key(&column)
    }

    /// Trimmed, non-empty cell for a column. Short rows read as empty.
    pub fn cell<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        self.index(column)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_schema_resolves_influx_header() {
        let header = ["", "result", "table", "_start", "_stop", "_time", "_value", "_field",
            "_measurement", "sensor", "source"];
        let map = EXPORT_SCHEMA_V1.resolve(header.iter().copied());

        assert_eq!(map.index(Column::Time), Some(5));
        assert_eq!(map.index(Column::Value), Some(6));
        assert_eq!(map.index(Column::Field), Some(7));
        assert_eq!(map.index(Column::Measurement), Some(8));
        assert_eq!(map.index(Column::Sensor), Some(9));
        assert_eq!(map.index(Column::Source), Some(10));
    }

    #[test]
    fn test_schemas_are_named_and_versioned() {
        let names: Vec<(&str, u32)> = [&EXPORT_SCHEMA_V1, &LATENCY_STATS_SCHEMA_V1, &ODTE_SCHEMA_V1]
            .iter()
            .map(|s| (s.name, s.version))
            .collect();
        assert_eq!(names, vec![("export", 1), ("latency_stats", 1), ("odte", 1)]);
    }

    #[test]
    fn test_first_alias_wins() {
        // Both "mean" and "mean_ms" present: "mean_ms" is listed first.
        let map = LATENCY_STATS_SCHEMA_V1.resolve(["sensor", "mean", "mean_ms"]);
        assert_eq!(map.index(Column::Mean), Some(2));
    }

    #[test]
    fn test_legacy_odte_columns() {
        let map = ODTE_SCHEMA_V1.resolve(["sensor", "middts_sent_count", "sim_sent_count", "A"]);
        assert_eq!(map.index(Column::SentM2s), Some(1));
        assert_eq!(map.index(Column::SentS2m), Some(2));
        assert_eq!(map.index(Column::Availability), Some(3));
        assert!(!map.contains(Column::TimelinessM2s));
    }

    #[test]
    fn test_capped_reliability_is_not_an_alias() {
        let map = ODTE_SCHEMA_V1.resolve(["sensor", "R_m2s_capped"]);
        assert!(!map.contains(Column::ReliabilityM2s));
    }

    #[test]
    fn test_header_whitespace_and_bom() {
        let map = EXPORT_SCHEMA_V1.resolve(["\u{feff}_measurement", " sensor "]);
        assert_eq!(map.index(Column::Measurement), Some(0));
        assert_eq!(map.index(Column::Sensor), Some(1));
        assert!(EXPORT_SCHEMA_V1.matches(Column::Measurement, " _measurement"));
    }

    #[test]
    fn test_cell_short_row_is_empty() {
        let map = LATENCY_STATS_SCHEMA_V1.resolve(["sensor", "count", "mean_ms"]);
        let record = StringRecord::from(vec!["s1", " 4 "]);
        assert_eq!(map.cell(&record, Column::Count), Some("4"));
        assert_eq!(map.cell(&record, Column::Mean), None);
    }
}
