//! Error types for dpp

use thiserror::Error;

/// dpp error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("'{0}' not found.")]
    NotFound(String),

    #[error("'{0}' cannot be redefined.")]
    NoRedefine(String),

    #[error("Included file not found: {0}")]
    IncludeNotFound(String),

    #[error("Include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("Output of '{0}' is not valid UTF-8")]
    InvalidUtf8(String),

    #[error("Unbalanced conditional: #{directive} without matching #if")]
    Unbalanced { directive: String },

    #[error("{depth} unterminated conditional block(s) (#endif expected)")]
    Unterminated { depth: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Result type alias for dpp
pub type Result<T> = std::result::Result<T, Error>;
