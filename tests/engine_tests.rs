//! End-to-end tests for the ODTE engine
//!
//! These drive the public API from an export file on disk to the written
//! tables, the way the `odte compute` command does.

use approx::assert_relative_eq;
use odte::report::format_instant_ms;
use odte::*;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const BASE_MS: i64 = 1_700_000_000_000;
const HEADER: &str = ",result,table,_start,_stop,_time,_value,_field,_measurement,sensor,source";

// ============================================================================
// Helpers
// ============================================================================

/// (sensor, source tag, field, timestamp offset from BASE_MS)
type Row<'a> = (&'a str, &'a str, &'a str, i64);

fn export(rows: &[Row]) -> String {
    let mut out = String::new();
    out.push_str("#group,false,false,true,true,false,false,true,true,true,true\n");
    out.push_str(HEADER);
    out.push('\n');
    for (sensor, source, field, offset) in rows {
        let ms = BASE_MS + offset;
        out.push_str(&format!(
            ",_result,0,,,{},{},{},device_data,{},{}\n",
            format_instant_ms(ms),
            ms,
            field,
            sensor,
            source
        ));
    }
    out
}

fn write_export(dir: &Path, rows: &[Row]) -> PathBuf {
    let path = dir.join("export.csv");
    fs::write(&path, export(rows)).unwrap();
    path
}

fn csv_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn reference_rows() -> Vec<Row<'static>> {
    vec![
        ("s1", "middts", "sent_timestamp", 1_000),
        ("s1", "middts", "sent_timestamp", 2_000),
        ("s1", "middts", "sent_timestamp", 3_000),
        ("s1", "simulator", "received_timestamp", 1_050),
        ("s1", "simulator", "received_timestamp", 1_990),
        ("s1", "simulator", "received_timestamp", 5_000),
    ]
}

// ============================================================================
// Metric scenarios
// ============================================================================

#[test]
fn test_reference_scenario_end_to_end() {
    let dir = tempdir().unwrap();
    let input = write_export(dir.path(), &reference_rows());
    let out = dir.path().join("out");

    let engine = Engine::new(EngineConfig::default()).unwrap();
    let report = engine.run_file(&input, "ref", &out, Some("t0".into())).unwrap();

    let m2s = &report.analysis.records[0].m2s;
    assert_eq!(m2s.sent_count, 3);
    assert_eq!(m2s.received_count, 2);
    assert_relative_eq!(m2s.reliability, 2.0 / 3.0);
    assert_relative_eq!(m2s.timeliness, 0.5);

    let rows = csv_rows(&out.join("ref_odte_t0.csv"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "s1");
    assert_eq!(rows[0][1], "3");
    assert_eq!(rows[0][2], "2");
    assert_eq!(rows[0][3], "0.500000");
    assert_eq!(rows[0][4], "0.666667");

    // Latencies 50 and 3000 ms feed the ECDF.
    let ecdf = Ecdf::read_csv(out.join("ref_ecdf_rtt_t0.csv")).unwrap();
    assert_eq!(ecdf.len(), 2);
    assert_eq!(ecdf.cdf_at(200.0), 0.5);
}

#[test]
fn test_full_uptime_over_twelve_windows() {
    let dir = tempdir().unwrap();
    // One send every 10 s, answered after 2.5 s (always late).
    let mut rows = Vec::new();
    for k in 0..12 {
        rows.push(("s1", "middts", "sent_timestamp", k * 10_000));
        rows.push(("s1", "simulator", "received_timestamp", k * 10_000 + 2_500));
    }
    let input = write_export(dir.path(), &rows);

    let engine = Engine::new(EngineConfig::default()).unwrap();
    let run = engine.normalize(&input).unwrap();
    let analysis = engine.analyze(&run).unwrap();

    assert_eq!(analysis.total_windows, 12);
    let record = &analysis.records[0];
    assert_eq!(record.availability, 1.0);
    assert_eq!(record.m2s.timeliness, 0.0);
    assert_eq!(record.m2s.odte, 0.0);
    assert!(analysis.windows.iter().all(|w| w.a_mean == 1.0));
}

#[test]
fn test_sensor_without_sends_is_zero() {
    let dir = tempdir().unwrap();
    let mut rows = reference_rows();
    rows.push(("listener", "simulator", "received_timestamp", 1_500));
    rows.push(("listener", "middts", "received_timestamp", 1_600));
    let input = write_export(dir.path(), &rows);

    let engine = Engine::new(EngineConfig::default()).unwrap();
    let analysis = engine.analyze(&engine.normalize(&input).unwrap()).unwrap();

    let listener = analysis
        .records
        .iter()
        .find(|r| r.sensor == "listener")
        .unwrap();
    for direction in Direction::ALL {
        let m = listener.direction(direction);
        assert_eq!(m.sent_count, 0);
        assert_eq!(m.reliability, 0.0);
        assert_eq!(m.timeliness, 0.0);
        assert_eq!(m.odte, 0.0);
        assert_eq!(m.odte_capped, 0.0);
    }
    // Only s1 sent m2s, so the global value is s1's alone.
    assert_relative_eq!(
        analysis.global.m2s.unwrap(),
        analysis.records.iter().find(|r| r.sensor == "s1").unwrap().m2s.odte
    );
    assert_eq!(analysis.global.s2m, None);
}

#[test]
fn test_random_runs_hold_invariants() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let sensors = ["a", "b", "c", "d"];
    let roles = [
        ("middts", "sent_timestamp"),
        ("simulator", "received_timestamp"),
        ("simulator", "sent_timestamp"),
        ("middts", "received_timestamp"),
    ];

    for _ in 0..10 {
        let events: Vec<RawEvent> = (0..rng.gen_range(1..300))
            .map(|_| {
                let (source, field) = roles[rng.gen_range(0..roles.len())];
                let t = rng.gen_range(0..120_000);
                RawEvent {
                    sensor: sensors[rng.gen_range(0..sensors.len())].to_string(),
                    role: Role {
                        source: Source::parse(source).unwrap(),
                        field: Field::parse(field).unwrap(),
                    },
                    value_ms: t,
                    time_ms: t,
                }
            })
            .collect();
        let run = NormalizedRun::from_events(events);
        let total_sent: usize = run
            .sensors
            .values()
            .map(|s| s.m2s.sent.len() + s.s2m.sent.len())
            .sum();

        let engine = Engine::new(EngineConfig::default()).unwrap();
        let analysis = engine.analyze(&run).unwrap();

        // No sends lost or double counted across windows.
        let windowed: usize = analysis.windows.iter().map(|w| w.total_sent).sum();
        assert_eq!(windowed, total_sent);

        for record in &analysis.records {
            for direction in Direction::ALL {
                let m = record.direction(direction);
                assert!(m.reliability_capped >= 0.0 && m.reliability_capped <= 1.0);
                assert!(m.reliability_capped <= m.reliability);
                assert!(m.received_count <= m.sent_count);
            }
            assert!(record.availability > 0.0 && record.availability <= 1.0);
        }

        let pts = analysis.ecdf.points();
        if let Some(last) = pts.last() {
            assert_eq!(last.fraction, 1.0);
            assert!(pts.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        }
    }
}

// ============================================================================
// Output determinism
// ============================================================================

#[test]
fn test_rerun_is_byte_identical() {
    let dir = tempdir().unwrap();
    let mut rows = reference_rows();
    for k in 0..50 {
        rows.push(("s2", "simulator", "sent_timestamp", k * 997));
        rows.push(("s2", "middts", "received_timestamp", k * 997 + (k % 9) * 40));
    }
    let input = write_export(dir.path(), &rows);
    let engine = Engine::new(EngineConfig::default()).unwrap();

    let first = engine
        .run_file(&input, "det", dir.path().join("a"), Some("t".into()))
        .unwrap();
    let second = engine
        .run_file(&input, "det", dir.path().join("b"), Some("t".into()))
        .unwrap();

    let a = &first.manifest.outputs;
    let b = &second.manifest.outputs;
    for (x, y) in [
        (&a.odte, &b.odte),
        (&a.windows, &b.windows),
        (&a.ecdf, &b.ecdf),
        (&a.latency_stats_m2s, &b.latency_stats_m2s),
        (&a.latency_stats_s2m, &b.latency_stats_s2m),
    ] {
        assert_eq!(fs::read(x).unwrap(), fs::read(y).unwrap(), "{}", x.display());
    }
    assert_eq!(first.manifest.global_odte, second.manifest.global_odte);
}

#[test]
fn test_written_tables_and_manifest() {
    let dir = tempdir().unwrap();
    let input = write_export(dir.path(), &reference_rows());
    let out = dir.path().join("out");
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let report = engine.run_file(&input, "p", &out, Some("t".into())).unwrap();

    let windows = fs::read_to_string(out.join("p_windows_t.csv")).unwrap();
    let mut lines = windows.lines();
    assert_eq!(
        lines.next().unwrap(),
        "window_start,window_index,sensors_active,total_sent,total_received,T_mean,R_mean,A_mean,ODTE_mean"
    );
    assert!(lines.next().unwrap().starts_with("2023-11-14T22:13:21.000Z,0,1,3,2,"));

    let stats = csv_rows(&out.join("p_latency_stats_middleware_to_simulator_t.csv"));
    assert_eq!(stats[0][0], "s1");
    assert_eq!(stats[0][1], "2");
    assert_eq!(stats[0][4], "50");
    assert_eq!(stats[0][5], "3000");

    let manifest = RunManifest::read_json(&report.manifest_path).unwrap();
    assert_eq!(manifest.profile, "p");
    assert_eq!(manifest.total_windows, 1);
    assert_eq!(manifest.rows.accepted, 6);
    assert_eq!(manifest, report.manifest);
}

// ============================================================================
// Fatal conditions
// ============================================================================

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let err = engine
        .run_file(dir.path().join("nope.csv"), "p", dir.path(), None)
        .unwrap_err();
    assert!(matches!(err, OdteError::InputNotFound(_)));
}

#[test]
fn test_headerless_input_is_fatal() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("export.csv");
    fs::write(&input, "x,y,z\n1,2,3\n").unwrap();
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let err = engine.run_file(&input, "p", dir.path(), None).unwrap_err();
    assert!(matches!(err, OdteError::MissingHeader(_)));
}

#[test]
fn test_noise_rows_are_skipped() {
    let dir = tempdir().unwrap();
    let mut body = export(&reference_rows());
    body.push_str(",_result,0,,,not-a-time,1,sent_timestamp,device_data,s1,middts\n");
    body.push_str(",_result,0,,,2023-11-14T22:13:20Z,xyz,sent_timestamp,device_data,s1,middts\n");
    body.push_str(",_result,0,,,2023-11-14T22:13:20Z,1,sent_timestamp,cpu_load,s1,middts\n");
    let input = dir.path().join("export.csv");
    fs::write(&input, body).unwrap();

    let engine = Engine::new(EngineConfig::default()).unwrap();
    let run = engine.normalize(&input).unwrap();
    assert_eq!(run.stats.accepted, 6);
    assert_eq!(run.stats.malformed, 2);
    assert_eq!(run.stats.foreign_measurement, 1);
}
