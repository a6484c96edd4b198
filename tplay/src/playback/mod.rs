//! Playback engine: position tracking, buffer cycling, refill and transport

pub mod buffer_pool;
pub mod engine;
pub mod position;
pub mod refill;
pub mod transport;

pub use buffer_pool::{BufferPool, SlotState};
pub use engine::{EngineOptions, PlaybackEngine};
pub use position::{PositionTracker, Timebase};
pub use refill::{FillOutcome, RefillEngine, MAX_ENQUEUE_ATTEMPTS};
pub use transport::TransportCell;
