//! Error types for farewatch
//!
//! Messages name the column, field, path or status that failed so an operator
//! can act on the log line alone.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// farewatch error types
///
/// Every failure in the loop surfaces as one of these variants. No path
/// substitutes a plausible default value for a failed computation.
#[derive(Error, Debug)]
pub enum Error {
    /// Dataset column missing, empty after cleaning, or too short for a test
    #[error("Data error: {0}")]
    DataError(String),

    /// Required configuration (e.g. the dispatch token) is absent or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Webhook dispatch did not succeed (timeout, transport failure, non-204)
    #[error("Dispatch failed: {0}")]
    DispatchError(String),

    /// No model artifact has been loaded yet
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Artifact feature list does not match the serving schema
    #[error("Schema mismatch: expected features {expected:?}, artifact declares {actual:?}\nPrevious model remains active")]
    SchemaMismatch {
        /// Feature names the server requires, in order
        expected: Vec<String>,
        /// Feature names the rejected artifact declares
        actual: Vec<String>,
    },

    /// Prediction failed on the active model
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Model fitting failed
    #[error("Training failed: {0}")]
    TrainingError(String),

    /// Artifact file is unreadable or its model blob cannot be decoded
    #[error("Corrupt model artifact: {0}")]
    CorruptArtifact(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
