//! Error types for Timetravel-DB

use thiserror::Error;

/// Result type alias for Timetravel-DB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Timetravel-DB
///
/// Lookup misses (unknown names, missing scopes, out-of-range indices) are
/// never errors; they surface as `None` values in results.
#[derive(Error, Debug)]
pub enum Error {
    /// Query or expression text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operators were combined in a way that cannot be evaluated
    #[error("Composition error: {0}")]
    Composition(String),

    /// Wrong number of operator arguments
    #[error("Arity error: {operator} takes {expected} argument(s), got {found}")]
    Arity {
        operator: String,
        expected: String,
        found: usize,
    },

    /// Evaluation failed outside of a per-instant expression
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Invalid logical time or time window
    #[error("Temporal error: {0}")]
    Temporal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Query ran past its deadline
    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Error::Configuration(e.to_string())
    }
}
