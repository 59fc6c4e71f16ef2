//! Error type shared by the Top Tracks crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that occur before or outside a backend request
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad config file, environment variable or base URL
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Session or payload (de)serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rejected locally before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
