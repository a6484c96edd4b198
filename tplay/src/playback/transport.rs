//! Lock-free transport state cell
//!
//! The render thread reads the state at the top of every refill without
//! taking the controller's transition lock. Writers:
//! - the controller, under its transition lock (compare-and-swap from the
//!   state it observed, or an unconditional store to `Stopped`)
//! - the refill engine, only `Playing`/`Paused` -> `Finished` via CAS, so it
//!   can never overwrite `Stopped`

use std::sync::atomic::{AtomicU8, Ordering};
use tplay_common::TransportState;

const PLAYING: u8 = 0;
const PAUSED: u8 = 1;
const STOPPED: u8 = 2;
const FINISHED: u8 = 3;

fn encode(state: TransportState) -> u8 {
    match state {
        TransportState::Playing => PLAYING,
        TransportState::Paused => PAUSED,
        TransportState::Stopped => STOPPED,
        TransportState::Finished => FINISHED,
    }
}

fn decode(raw: u8) -> TransportState {
    match raw {
        PLAYING => TransportState::Playing,
        PAUSED => TransportState::Paused,
        FINISHED => TransportState::Finished,
        _ => TransportState::Stopped,
    }
}

#[derive(Debug)]
pub struct TransportCell {
    raw: AtomicU8,
}

impl TransportCell {
    pub fn new(initial: TransportState) -> Self {
        Self {
            raw: AtomicU8::new(encode(initial)),
        }
    }

    pub fn load(&self) -> TransportState {
        decode(self.raw.load(Ordering::Acquire))
    }

    /// Unconditional store; returns the previous state.
    pub fn swap(&self, state: TransportState) -> TransportState {
        decode(self.raw.swap(encode(state), Ordering::AcqRel))
    }

    /// Store `new` only if the state is still `current`.
    ///
    /// On failure returns the state actually found.
    pub fn compare_exchange(
        &self,
        current: TransportState,
        new: TransportState,
    ) -> Result<(), TransportState> {
        self.raw
            .compare_exchange(encode(current), encode(new), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(decode)
    }

    /// Move a non-terminal state to `Finished`.
    ///
    /// Returns the state it replaced, or `None` if the state was already
    /// terminal and was left untouched.
    pub fn finish(&self) -> Option<TransportState> {
        self.raw
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| match raw {
                PLAYING | PAUSED => Some(FINISHED),
                _ => None,
            })
            .ok()
            .map(decode)
    }

    pub fn is_terminal(&self) -> bool {
        self.load().is_terminal()
    }
}
