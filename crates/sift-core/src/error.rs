//! Error types for sift-core
//!
//! The matcher stack never raises: the scorer, cache and engine report
//! presence/absence, and invariant violations are hard assertions. Errors
//! exist only at the edges — input I/O during ingest and configuration
//! loading.

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sift-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (ingest source)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime errors (channel failures, worker panics)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
