//! Player context
//!
//! Everything the refill engine and the transport controller share for one
//! open stream, owned explicitly and passed by `Arc` rather than held in
//! globals. The transport state and the position counters are atomics so
//! the render thread never waits on the controller's transition lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tplay_common::{PlayerEvent, TransportState};

use crate::audio::{AudioSource, StreamFormat};
use crate::playback::buffer_pool::BufferPool;
use crate::playback::position::{PositionTracker, Timebase};
use crate::playback::transport::TransportCell;

/// Events buffered per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 100;

pub struct PlayerContext {
    pub tracker: PositionTracker,
    pub transport: TransportCell,
    pub pool: BufferPool,
    source: Mutex<Box<dyn AudioSource>>,
    format: StreamFormat,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerContext {
    pub fn new(source: Box<dyn AudioSource>, pool: BufferPool, initial: TransportState) -> Self {
        let format = source.format();
        let timebase = Timebase::new(&format, source.total_packets(), source.duration_seconds());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            tracker: PositionTracker::new(timebase),
            transport: TransportCell::new(initial),
            pool,
            source: Mutex::new(source),
            format,
            event_tx,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn duration_seconds(&self) -> f64 {
        self.tracker.timebase().duration_seconds()
    }

    /// Decoder access. Only the refill engine reads, one buffer at a time.
    pub fn source(&self) -> MutexGuard<'_, Box<dyn AudioSource>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast an event; having no subscribers is fine.
    pub fn broadcast_event(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    /// Store a new transport state and announce it if it changed.
    pub fn set_transport_state(&self, to: TransportState) -> TransportState {
        let from = self.transport.swap(to);
        if from != to {
            self.broadcast_event(PlayerEvent::state_changed(from, to));
        }
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmSource;

    fn context() -> PlayerContext {
        let source = PcmSource::new(vec![0.0; 44100 * 2], 44100, 2).unwrap();
        let pool = BufferPool::allocate(3, 4410 * 8, 4410, false).unwrap();
        PlayerContext::new(Box::new(source), pool, TransportState::Playing)
    }

    #[test]
    fn test_timebase_from_source() {
        let ctx = context();
        assert_eq!(ctx.tracker.timebase().total_packets(), 44100);
        assert!((ctx.duration_seconds() - 1.0).abs() < 1e-9);
        assert_eq!(ctx.format().channels, 2);
    }

    #[test]
    fn test_state_change_broadcasts_once() {
        let ctx = context();
        let mut rx = ctx.subscribe_events();

        assert_eq!(ctx.set_transport_state(TransportState::Paused), TransportState::Playing);
        ctx.set_transport_state(TransportState::Paused);

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            PlayerEvent::StateChanged {
                from: TransportState::Playing,
                to: TransportState::Paused,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let ctx = context();
        ctx.broadcast_event(PlayerEvent::state_changed(
            TransportState::Playing,
            TransportState::Stopped,
        ));
    }
}
