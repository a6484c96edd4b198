//! # tplay common library
//!
//! Shared vocabulary for the tplay crates:
//! - Transport state and player events (observer notifications)
//! - Clock-style time formatting for status displays
//! - Configuration file discovery
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{PlayerEvent, TransportState};
