//! Refill engine
//!
//! Runs on the render thread every time a buffer has been played out, and
//! on the controller's thread while priming. It reads the next chunk at the
//! tracker's cursor into the buffer and submits it again, or declares the
//! end of the stream. It never takes the controller's transition lock and
//! reports problems as events rather than console output.

use std::sync::Arc;

use chrono::Utc;
use tplay_common::{PlayerEvent, TransportState};
use tracing::trace;

use crate::audio::AudioBuffer;
use crate::playback::buffer_pool::SlotState;
use crate::render::RenderOutput;
use crate::state::PlayerContext;

/// What happened to a buffer handed to [`RefillEngine::fill`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Filled and owned by the render service now
    Enqueued { packets: u32 },
    /// Filled but refused by the render service; its audio was skipped
    Dropped,
    /// Nothing left to read (or the read failed); buffer parked
    EndOfStream,
}

/// Chunks one slot may carry to a refusing render service before it is parked
pub const MAX_ENQUEUE_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct RefillEngine {
    ctx: Arc<PlayerContext>,
}

impl RefillEngine {
    pub fn new(ctx: Arc<PlayerContext>) -> Self {
        Self { ctx }
    }

    /// Consumed-buffer callback body.
    pub fn on_buffer_consumed(&self, output: &dyn RenderOutput, buffer: AudioBuffer) {
        let state = self.ctx.transport.load();
        if state == TransportState::Stopped {
            self.ctx.pool.park(buffer);
            return;
        }

        self.ctx.tracker.mark_consumed(buffer.end_packet());

        if state == TransportState::Finished {
            self.ctx.pool.park(buffer);
            return;
        }

        self.fill(output, buffer);
    }

    /// Read the next chunk at the cursor into `buffer` and submit it.
    ///
    /// A refused buffer skips its chunk and carries the next one, up to
    /// [`MAX_ENQUEUE_ATTEMPTS`] times. When the slot is finally given up
    /// and no other buffer is in flight, the stream finishes.
    pub fn fill(&self, output: &dyn RenderOutput, mut buffer: AudioBuffer) -> FillOutcome {
        let ctx = &self.ctx;
        let slot = buffer.slot();
        let mut attempts = 0;

        loop {
            ctx.pool.set_state(slot, SlotState::Filling);

            let start = ctx.tracker.cursor();
            let read = {
                let mut source = ctx.source();
                let (storage, descriptions) = buffer.storage_mut();
                source.read_packets(start, ctx.pool.packets_per_buffer(), storage, descriptions)
            };

            let read = match read {
                Ok(read) if read.packets > 0 => read,
                Ok(_) => {
                    trace!(slot, packet = start, "end of stream");
                    self.end_of_stream(output, buffer);
                    return FillOutcome::EndOfStream;
                }
                Err(e) => {
                    trace!(slot, packet = start, "decode read failed: {}", e);
                    ctx.broadcast_event(PlayerEvent::DecodeFailed {
                        packet: start,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.end_of_stream(output, buffer);
                    return FillOutcome::EndOfStream;
                }
            };

            buffer.commit(start, &read);
            ctx.tracker.advance(read.packets);
            ctx.pool.set_state(slot, SlotState::Enqueued);

            match output.enqueue(buffer) {
                Ok(()) => {
                    trace!(slot, start, packets = read.packets, "enqueued");
                    return FillOutcome::Enqueued {
                        packets: read.packets,
                    };
                }
                Err(rejected) => {
                    ctx.broadcast_event(PlayerEvent::BufferDropped {
                        start_packet: rejected.buffer.start_packet(),
                        packet_count: rejected.buffer.packet_count(),
                        reason: rejected.reason,
                        timestamp: Utc::now(),
                    });
                    buffer = rejected.buffer;
                    attempts += 1;
                    if attempts >= MAX_ENQUEUE_ATTEMPTS || ctx.transport.is_terminal() {
                        break;
                    }
                    trace!(slot, attempts, "enqueue refused, carrying next chunk");
                }
            }
        }

        ctx.pool.park(buffer);
        if ctx.pool.all_parked() {
            trace!(slot, "no buffer left in flight");
            self.end_of_stream_parked(output);
        }
        FillOutcome::Dropped
    }

    fn end_of_stream(&self, output: &dyn RenderOutput, buffer: AudioBuffer) {
        self.ctx.pool.park(buffer);
        self.end_of_stream_parked(output);
    }

    fn end_of_stream_parked(&self, output: &dyn RenderOutput) {
        let ctx = &self.ctx;

        // Never overrides a quit that got here first
        let Some(from) = ctx.transport.finish() else {
            return;
        };
        let _ = output.stop(false);

        ctx.broadcast_event(PlayerEvent::state_changed(from, TransportState::Finished));
        ctx.broadcast_event(PlayerEvent::Finished {
            cursor_packets: ctx.tracker.cursor(),
            timestamp: Utc::now(),
        });
    }
}
