//! Event types published by the playback engine to its observers
//!
//! Observers (status line, now-playing publishers, event logs) receive
//! these over a broadcast channel; they never reach into engine internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport (playback lifecycle) state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Playing,
    Paused,
    /// Quit was requested; output stopped immediately
    Stopped,
    /// End of stream reached; already-queued audio drains
    Finished,
}

impl TransportState {
    /// Stopped and Finished accept no further refills
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Finished)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Finished => write!(f, "finished"),
        }
    }
}

/// Notifications sent from the engine to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged {
        from: TransportState,
        to: TransportState,
        timestamp: DateTime<Utc>,
    },

    /// A seek completed; `elapsed_secs` is the new playhead
    Seeked {
        requested_delta_secs: f64,
        elapsed_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Decoder ran out of packets (or failed) and playback is draining
    Finished {
        cursor_packets: u64,
        timestamp: DateTime<Utc>,
    },

    /// A decode read failed; treated as end of stream
    DecodeFailed {
        packet: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The render service refused a buffer; its audio was skipped
    BufferDropped {
        start_packet: u64,
        packet_count: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Periodic position report from the UI timer
    Position {
        elapsed_secs: f64,
        duration_secs: f64,
        state: TransportState,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Event type as string for filtering and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::Seeked { .. } => "Seeked",
            PlayerEvent::Finished { .. } => "Finished",
            PlayerEvent::DecodeFailed { .. } => "DecodeFailed",
            PlayerEvent::BufferDropped { .. } => "BufferDropped",
            PlayerEvent::Position { .. } => "Position",
        }
    }

    pub fn state_changed(from: TransportState, to: TransportState) -> Self {
        PlayerEvent::StateChanged {
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
