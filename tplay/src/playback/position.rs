//! Position tracking in packets
//!
//! Two counters, each a single atomic word so readers on any thread see
//! either the old or the new value, never a torn one:
//! - `cursor`: next packet the refill engine will read (read head)
//! - `playhead`: end of the last buffer the render service finished
//!
//! Elapsed time is derived from the playhead, so audio queued ahead of
//! the output is not reported as played.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::StreamFormat;

/// Packet/second conversions for one stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timebase {
    sample_rate: u32,
    frames_per_packet: u32,
    total_packets: u64,
    duration_seconds: f64,
}

impl Timebase {
    pub fn new(format: &StreamFormat, total_packets: u64, duration_seconds: f64) -> Self {
        let duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            0.0
        };
        Self {
            sample_rate: format.sample_rate.max(1),
            frames_per_packet: format.geometry.frames_per_packet,
            total_packets,
            duration_seconds,
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Seconds spanned by `packets` packets from the stream start
    pub fn packets_to_seconds(&self, packets: u64) -> f64 {
        if self.frames_per_packet > 0 {
            packets as f64 * self.frames_per_packet as f64 / self.sample_rate as f64
        } else if self.total_packets > 0 {
            packets as f64 / self.total_packets as f64 * self.duration_seconds
        } else {
            0.0
        }
    }

    /// Packet index for a time, clamped to `[0, total_packets]`
    pub fn seconds_to_packets(&self, seconds: f64) -> u64 {
        let seconds = clamp_seconds(seconds, self.duration_seconds);
        let packets = if self.frames_per_packet > 0 {
            seconds * self.sample_rate as f64 / self.frames_per_packet as f64
        } else if self.duration_seconds > 0.0 {
            seconds / self.duration_seconds * self.total_packets as f64
        } else {
            0.0
        };
        (packets.round() as u64).min(self.total_packets)
    }
}

/// Clamp to `[0, max]`; non-finite input clamps to 0
pub fn clamp_seconds(seconds: f64, max: f64) -> f64 {
    if seconds.is_nan() {
        return 0.0;
    }
    seconds.clamp(0.0, max.max(0.0))
}

/// Read cursor and playhead of the open stream
#[derive(Debug)]
pub struct PositionTracker {
    timebase: Timebase,
    cursor: AtomicU64,
    playhead: AtomicU64,
}

impl PositionTracker {
    pub fn new(timebase: Timebase) -> Self {
        Self {
            timebase,
            cursor: AtomicU64::new(0),
            playhead: AtomicU64::new(0),
        }
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    /// Move the read cursor forward. No-op for zero.
    ///
    /// Saturates at the stream length.
    pub fn advance(&self, packets: u32) {
        if packets == 0 {
            return;
        }
        let total = self.timebase.total_packets;
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some(cursor.saturating_add(packets as u64).min(total))
            });
    }

    /// Record that the render service finished audio up to `end_packet`.
    pub fn mark_consumed(&self, end_packet: u64) {
        self.playhead
            .store(end_packet.min(self.timebase.total_packets), Ordering::Release);
    }

    /// Jump both counters to `target_seconds` (clamped to the stream).
    ///
    /// Each counter is assigned in a single store. Returns the new packet.
    pub fn seek_to(&self, target_seconds: f64) -> u64 {
        let packet = self.timebase.seconds_to_packets(target_seconds);
        self.cursor.store(packet, Ordering::Release);
        self.playhead.store(packet, Ordering::Release);
        packet
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn playhead(&self) -> u64 {
        self.playhead.load(Ordering::Acquire)
    }

    /// Seconds of audio played, clamped to the stream duration
    pub fn elapsed_seconds(&self) -> f64 {
        let secs = self.timebase.packets_to_seconds(self.playhead());
        clamp_seconds(secs, self.timebase.duration_seconds)
    }

    /// Position of the read head in seconds
    pub fn cursor_seconds(&self) -> f64 {
        let secs = self.timebase.packets_to_seconds(self.cursor());
        clamp_seconds(secs, self.timebase.duration_seconds)
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor() >= self.timebase.total_packets
    }
}
