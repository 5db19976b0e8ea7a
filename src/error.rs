// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for ODTE
//!
//! Only fatal conditions are errors. Malformed rows, degenerate metrics and
//! missing optional artifacts are handled in-band (skip counters, `0.0`,
//! `None`) and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ODTE operations
pub type Result<T> = std::result::Result<T, OdteError>;

/// Main error type for ODTE operations
#[derive(Error, Debug)]
pub enum OdteError {
    /// Input file does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// No row in the export carries a recognizable header
    #[error("No recognizable header in {}", .0.display())]
    MissingHeader(PathBuf),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (config or manifest) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Worker pool could not be built
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OdteError::MissingHeader(PathBuf::from("/tmp/export.csv"));
        let msg = format!("{}", err);
        assert!(msg.contains("header"));
        assert!(msg.contains("/tmp/export.csv"));
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: OdteError = io.into();
        assert!(matches!(err, OdteError::Io(_)));
    }
}
