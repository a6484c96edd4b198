//! # tplay
//!
//! Streaming playback engine for a terminal audio player.
//!
//! **Purpose:** Keep a small fixed set of buffers continuously full from a
//! decoded stream while control surfaces play, pause, seek and quit
//! concurrently with the render thread.
//!
//! **Architecture:** symphonia decode into memory, packet-addressed refill
//! of three buffers, cpal (or a wall-clock null output) on a dedicated
//! render thread.

pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod playback;
pub mod render;
pub mod state;
pub mod ui;

pub use error::{Error, Result};
pub use playback::PlaybackEngine;
pub use state::PlayerContext;
