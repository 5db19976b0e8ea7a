// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # ODTE - On-time Data Transmission Efficiency
//!
//! Quality-of-service metrics for bidirectional sensor/middleware telemetry.
//!
//! ## Metrics
//!
//! - **T** (Timeliness): matched messages delivered within the deadline
//! - **R** (Reliability): sends matched to a receive
//! - **A** (Availability): windows in which a sensor showed any activity
//! - **ODTE** = T × R × A, per sensor and direction
//!
//! ## Quick Start
//!
//! ```rust
//! use odte::{Engine, EngineConfig, NormalizedRun, RawEvent, Role, Source, Field};
//!
//! let sent = |v| RawEvent {
//!     sensor: "s1".into(),
//!     role: Role { source: Source::Middleware, field: Field::SentTimestamp },
//!     value_ms: v,
//!     time_ms: v,
//! };
//! let received = |v| RawEvent {
//!     sensor: "s1".into(),
//!     role: Role { source: Source::Simulator, field: Field::ReceivedTimestamp },
//!     value_ms: v,
//!     time_ms: v,
//! };
//!
//! let run = NormalizedRun::from_events(vec![
//!     sent(1000), sent(2000), sent(3000),
//!     received(1050), received(1990), received(5000),
//! ]);
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let analysis = engine.analyze(&run).unwrap();
//! let m2s = &analysis.records[0].m2s;
//!
//! assert_eq!(m2s.received_count, 2);
//! assert!((m2s.reliability - 2.0 / 3.0).abs() < 1e-9);
//! assert_eq!(m2s.timeliness, 0.5);
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Export parsing and per-sensor timestamp series
//! - [`matcher`]: Sent → received pairing
//! - [`metrics`]: T, R, A and ODTE per sensor
//! - [`window`]: Fixed-window time series
//! - [`stats`] / [`ecdf`]: Percentiles, latency summaries, ECDF tables
//! - [`summary`]: Cross-run summary of a reports directory
//! - [`engine`]: Parallel batch run and report output

// Modules
pub mod config;
pub mod ecdf;
pub mod engine;
pub mod error;
pub mod event;
pub mod manifest;
pub mod matcher;
pub mod metrics;
pub mod report;
pub mod schema;
pub mod stats;
pub mod summary;
pub mod window;

// Re-exports for convenient access
pub use config::{EngineConfig, OdteConfig, SummaryConfig};
pub use ecdf::{Ecdf, EcdfPoint, ReconstructedSamples};
pub use engine::{Engine, RunAnalysis, RunReport};
pub use error::{OdteError, Result};
pub use event::{
    Direction, DirectionalSeries, EventNormalizer, Field, NormalizeStats, NormalizedRun, RawEvent,
    Role, RunSpan, SensorSeries, Source,
};
pub use manifest::{OutputFiles, RunManifest};
pub use matcher::{match_pairs, MatchedPair};
pub use metrics::{DirectionMetrics, GlobalOdte, SensorAnalysis, SensorMetricRecord};
pub use report::OutputNames;
pub use stats::{percentile, LatencyStats};
pub use summary::{LatencySummary, MedianTier, OdteComponents, ReportFiles, RunSummary};
pub use window::{aggregate_windows, SensorWindows, WindowRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
