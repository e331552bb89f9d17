//! Error types for qtfit

use thiserror::Error;

/// qtfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (malformed input caught at construction time)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The model function does not match what the engine requires
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Dataset or function index outside its valid range
    #[error("Index out of range: {what} index {index} not in [0, {len})")]
    IndexOutOfRange {
        /// What was indexed (e.g. "dataset", "function").
        what: &'static str,
        /// Offending index.
        index: i64,
        /// Size of the valid range.
        len: usize,
    },

    /// Two sequences that must agree in length do not
    #[error("Size mismatch: {context} (expected {expected}, got {got})")]
    SizeMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// A linear system (or a normalisation) has no solution
    #[error("Singular system: {0}")]
    SingularSystem(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an [`Error::IndexOutOfRange`].
    pub fn index_out_of_range(what: &'static str, index: i64, len: usize) -> Self {
        Error::IndexOutOfRange { what, index, len }
    }

    /// Shorthand for an [`Error::SizeMismatch`].
    pub fn size_mismatch(context: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::SizeMismatch { context: context.into(), expected, got }
    }
}
