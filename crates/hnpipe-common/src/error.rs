//! Error types shared across hnpipe crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode { key: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
