//! Error types for tplay
//!
//! Startup failures (open, render device) are fatal; decode read failures
//! never leave the refill path (they end the stream instead).

use std::path::PathBuf;
use thiserror::Error;
use tplay_common::TransportState;

/// Main error type for the tplay engine
#[derive(Error, Debug)]
pub enum Error {
    /// Bad path or unsupported format
    #[error("Failed to open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    /// Decoder could not read packets at the requested position
    #[error("Decode read failed at packet {packet}: {reason}")]
    DecodeRead { packet: u64, reason: String },

    /// Output device, buffer allocation or render thread failure
    #[error("Render service error: {0}")]
    RenderService(String),

    /// Transport command not valid in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: TransportState,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tplay_common::Error> for Error {
    fn from(err: tplay_common::Error) -> Self {
        match err {
            tplay_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using tplay Error
pub type Result<T> = std::result::Result<T, Error>;
