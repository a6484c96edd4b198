//! Render service interface and implementations
//!
//! A [`RenderService`] creates one [`RenderOutput`] per stream. The output
//! owns a render thread which hands every consumed buffer, by value, to the
//! [`ConsumedCallback`] together with a reference to the output so the
//! callback can re-enqueue it.

use std::sync::Arc;

use crate::audio::{AudioBuffer, StreamFormat};
use crate::error::Result;

pub mod device;
pub mod null;
mod output;
pub mod playout;

pub use device::DeviceRenderService;
pub use null::NullRenderService;

/// Invoked on the render thread whenever a buffer has been played out
pub type ConsumedCallback = Arc<dyn Fn(&dyn RenderOutput, AudioBuffer) + Send + Sync>;

/// A buffer the render service refused, handed back to its owner
#[derive(Debug)]
pub struct Rejected {
    pub buffer: AudioBuffer,
    pub reason: String,
}

/// One open output stream
pub trait RenderOutput: Send + Sync {
    fn format(&self) -> StreamFormat;

    /// Allocate storage for one buffer slot.
    fn allocate_buffer(
        &self,
        slot: usize,
        capacity_bytes: usize,
        max_descriptions: usize,
    ) -> Result<AudioBuffer> {
        AudioBuffer::allocate(slot, capacity_bytes, max_descriptions)
    }

    /// Queue a filled buffer for playback.
    fn enqueue(&self, buffer: AudioBuffer) -> std::result::Result<(), Rejected>;

    fn start(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Stop the output.
    ///
    /// `immediate == true` discards queued audio, blocks until the render
    /// thread has acknowledged and returns the discarded buffers; after it
    /// returns no consumed callback is in flight. `immediate == false`
    /// returns at once and lets queued audio play out. It is the only stop
    /// that may be called from the consumed callback.
    fn stop(&self, immediate: bool) -> Result<Vec<AudioBuffer>>;

    /// Halt and flush every in-flight buffer, returning them.
    ///
    /// Same guarantees as an immediate stop; also rewinds
    /// [`RenderOutput::current_position`].
    fn reset(&self) -> Result<Vec<AudioBuffer>>;

    /// Frames rendered since the last reset
    fn current_position(&self) -> u64;

    /// Nothing queued and not running
    fn is_idle(&self) -> bool;

    /// Shut the render thread down. Idempotent.
    fn dispose(&self);
}

/// Factory for outputs
pub trait RenderService: Send + Sync {
    fn create_output(
        &self,
        format: StreamFormat,
        on_consumed: ConsumedCallback,
    ) -> Result<Box<dyn RenderOutput>>;
}
