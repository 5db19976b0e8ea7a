// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # ODTE CLI
//!
//! Command-line front-end for the ODTE metrics engine.
//!
//! ## Usage
//!
//! ```bash
//! # Compute the per-run tables from an InfluxDB export
//! odte compute export.csv --profile urllc --out-dir results
//!
//! # Summarize a reports directory into a summary file
//! odte summarize --reports-dir results --profile urllc --summary summary.txt
//!
//! # Reconstruct samples from an ECDF table
//! odte reconstruct --ecdf results/urllc_ecdf_rtt_20250101T000000Z.csv
//! ```

use clap::{Parser, Subcommand};
use odte::{Ecdf, Engine, OdteConfig, ReportFiles, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// ODTE metrics engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute ODTE, window, ECDF and latency tables for one export
    Compute {
        /// Exported telemetry CSV
        input: PathBuf,

        /// Profile name used as output file prefix
        #[arg(short, long)]
        profile: String,

        /// Output directory
        #[arg(short, long, default_value = "results")]
        out_dir: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Window length in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,

        /// Timeliness deadline in seconds
        #[arg(long)]
        deadline_s: Option<f64>,

        /// Worker threads (default: one per core)
        #[arg(long)]
        workers: Option<usize>,

        /// Tag for output file names (default: current UTC time)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Summarize a reports directory
    Summarize {
        /// Directory holding the per-run tables
        #[arg(long)]
        reports_dir: PathBuf,

        /// Profile name
        #[arg(long)]
        profile: String,

        /// Summary file to append to
        #[arg(long)]
        summary: PathBuf,

        /// ODTE table (default: latest in the reports directory)
        #[arg(long)]
        odte: Option<PathBuf>,

        /// Minimum samples per sensor for median-of-medians
        #[arg(long)]
        min_count: Option<u64>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the summary as JSON instead of key: value lines
        #[arg(long)]
        json: bool,
    },

    /// Reconstruct synthetic samples from an ECDF table
    Reconstruct {
        /// ECDF table (`rtt_ms,cdf`)
        #[arg(long)]
        ecdf: PathBuf,

        /// Number of samples
        #[arg(long)]
        points: Option<usize>,

        /// Output CSV (default: `<ecdf>.reconstructed.csv`)
        #[arg(long)]
        out: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_default_env().add_directive(parse_level(&args.log_level).into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn load_config(path: Option<&PathBuf>) -> odte::Result<OdteConfig> {
    match path {
        Some(p) => OdteConfig::from_json_file(p),
        None => Ok(OdteConfig::default()),
    }
}

fn run(command: Command) -> odte::Result<()> {
    info!("ODTE v{}", odte::VERSION);

    match command {
        Command::Compute {
            input,
            profile,
            out_dir,
            config,
            window_ms,
            deadline_s,
            workers,
            tag,
        } => {
            let mut config = load_config(config.as_ref())?.engine;
            if let Some(w) = window_ms {
                config.window_ms = w;
            }
            if let Some(d) = deadline_s {
                config.deadline_s = d;
            }
            if workers.is_some() {
                config.workers = workers;
            }

            let engine = Engine::new(config)?;
            let report = engine.run_file(&input, &profile, &out_dir, tag)?;
            let outputs = &report.manifest.outputs;

            for path in [
                &outputs.odte,
                &outputs.windows,
                &outputs.ecdf,
                &outputs.latency_stats_m2s,
                &outputs.latency_stats_s2m,
                &report.manifest_path,
            ] {
                println!("wrote {}", path.display());
            }
            let global = report.manifest.global_odte;
            println!("ODTE_m2s: {}", format_optional(global.m2s));
            println!("ODTE_s2m: {}", format_optional(global.s2m));
            println!("ODTE_combined: {}", format_optional(global.combined));
            Ok(())
        }

        Command::Summarize {
            reports_dir,
            profile,
            summary,
            odte,
            min_count,
            config,
            json,
        } => {
            let mut config = load_config(config.as_ref())?.summary;
            if let Some(m) = min_count {
                config.min_count = m;
            }
            config.validate()?;

            let files = ReportFiles::discover(&reports_dir, odte)?;
            let run_summary = RunSummary::compute(&profile, &files, &config);

            if json {
                println!("{}", run_summary.to_json()?);
            } else {
                println!("# Computed run metrics ({profile})");
                for (key, value) in run_summary.to_key_values() {
                    println!("{key}: {value}");
                }
            }
            run_summary.append_to(&summary)?;
            Ok(())
        }

        Command::Reconstruct {
            ecdf,
            points,
            out,
            config,
        } => {
            let config = load_config(config.as_ref())?.engine;
            let n = points.unwrap_or(config.reconstruction_points);

            let table = Ecdf::read_csv(&ecdf)?;
            let samples = table.reconstruct_samples(n);
            let out = out.unwrap_or_else(|| ecdf.with_extension("reconstructed.csv"));
            samples.write_csv(&out)?;

            info!(samples = samples.len(), "ECDF reconstructed");
            println!("wrote {} ({} reconstructed samples)", out.display(), samples.len());
            Ok(())
        }
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.6}"))
}
