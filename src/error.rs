//! Error types for microyield
//!
//! Every variant tells the caller what went wrong and what to do next.
//! Anything touching model correctness or artifact integrity is surfaced,
//! never guessed around. Unknown seed varieties are not errors: see
//! [`crate::features::UnknownCategory`].

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// microyield error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing required seed/log fields; prediction is not attempted
    #[error("Invalid cultivation data: {0}")]
    Data(String),

    /// Feature vector does not match the schema of the model scoring it
    #[error(
        "Feature schema mismatch: model expects v{expected_version} with {expected_len} features, \
         got v{found_version} with {found_len}\nRetrain under the current schema before serving."
    )]
    SchemaMismatch {
        /// Schema version the model was trained on
        expected_version: u32,
        /// Schema version of the offending input
        found_version: u32,
        /// Feature count the model was trained on
        expected_len: usize,
        /// Feature count of the offending input
        found_len: usize,
    },

    /// Training could not produce a promotable model; the active version is untouched
    #[error("Training failed: {0}\nThe active model was left unchanged.")]
    TrainingFailure(String),

    /// A harvest sample could not be durably appended; the caller must retry
    #[error("Corpus write failed: {0}\nThe sample was NOT recorded. Retry the append.")]
    CorpusWrite(String),

    /// Artifact set could not be read or written
    #[error("Artifact store error: {0}")]
    Artifact(String),

    /// Requested artifact version does not exist
    #[error("Model version {0} not found in artifact store")]
    ArtifactNotFound(String),

    /// No model has been promoted yet
    #[error("No active model version. Import a synthetic corpus and run `microyield train`.")]
    NoActiveModel,

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

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
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that signal a bad request rather than a broken engine.
    ///
    /// Data errors surface to the caller; everything else degrades prediction.
    #[must_use]
    pub const fn is_data_error(&self) -> bool {
        matches!(self, Self::Data(_) | Self::InvalidInput(_))
    }
}
