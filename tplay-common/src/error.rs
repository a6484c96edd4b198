//! Common error types for tplay

use thiserror::Error;

/// Common result type for tplay-common operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by shared helpers
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
