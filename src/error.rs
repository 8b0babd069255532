//! Error types for vigil

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for vigil operations
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The report could not be written; the previous report stays in place
    #[error("Failed to publish report to {path}: {reason}")]
    PersistError { path: PathBuf, reason: String },

    #[error("No report has been published at {0}")]
    ReportNotFound(PathBuf),

    #[error("Stored report at {path} is corrupt: {reason}")]
    ReportCorrupt { path: PathBuf, reason: String },

    /// Subscriber transport failure; never escapes the gateway or dispatcher
    #[error("Subscriber connection error: {0}")]
    ConnectionError(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;
