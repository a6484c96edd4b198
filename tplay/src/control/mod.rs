//! Control surface commands
//!
//! Everything a keyboard handler, remote-command handler or script may ask
//! of the engine. See [`crate::PlaybackEngine::apply`].

pub mod keys;

pub use keys::{command_for_key, KeyAction};

/// A transport command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    TogglePlayPause,
    /// Relative seek in seconds; negative seeks backwards
    Seek(f64),
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::TogglePlayPause => "toggle",
            Command::Seek(_) => "seek",
            Command::Quit => "quit",
        }
    }
}
