//! Fixed set of buffer slots and their lifecycle bookkeeping
//!
//! Slots cycle Empty -> Filling -> Enqueued -> (consumed) -> Empty for the
//! whole session. The pool only keeps the books; idle buffers are parked
//! here until the next prime.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio::AudioBuffer;
use crate::error::{Error, Result};

/// Buffer slot lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Idle, parked in the pool (or just handed back by the render service)
    Empty,
    /// Refill engine is reading packets into it
    Filling,
    /// Owned by the render service, waiting to be played
    Enqueued,
}

impl SlotState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SlotState::Filling,
            2 => SlotState::Enqueued,
            _ => SlotState::Empty,
        }
    }

    fn raw(self) -> u8 {
        match self {
            SlotState::Empty => 0,
            SlotState::Filling => 1,
            SlotState::Enqueued => 2,
        }
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotState::Empty => write!(f, "Empty"),
            SlotState::Filling => write!(f, "Filling"),
            SlotState::Enqueued => write!(f, "Enqueued"),
        }
    }
}

pub struct BufferPool {
    states: Vec<AtomicU8>,
    parked: Mutex<Vec<AudioBuffer>>,
    capacity_bytes: usize,
    packets_per_buffer: u32,
}

impl BufferPool {
    /// Reserve `count` slots of `capacity_bytes` each.
    ///
    /// `with_descriptions` reserves one packet descriptor per packet for
    /// variable-geometry streams.
    ///
    /// # Errors
    /// [`Error::RenderService`] if storage cannot be allocated; the player
    /// cannot proceed without its buffers.
    pub fn allocate(
        count: usize,
        capacity_bytes: usize,
        packets_per_buffer: u32,
        with_descriptions: bool,
    ) -> Result<Self> {
        Self::allocate_with(
            count,
            capacity_bytes,
            packets_per_buffer,
            with_descriptions,
            AudioBuffer::allocate,
        )
    }

    /// Like [`BufferPool::allocate`], with storage from `alloc(slot,
    /// capacity_bytes, max_descriptions)` (typically the render output).
    pub fn allocate_with<A>(
        count: usize,
        capacity_bytes: usize,
        packets_per_buffer: u32,
        with_descriptions: bool,
        mut alloc: A,
    ) -> Result<Self>
    where
        A: FnMut(usize, usize, usize) -> Result<AudioBuffer>,
    {
        if count == 0 {
            return Err(Error::Config("Buffer count must be at least 1".to_string()));
        }
        if capacity_bytes == 0 {
            return Err(Error::RenderService("Buffer capacity is zero".to_string()));
        }

        let max_descriptions = if with_descriptions {
            packets_per_buffer as usize
        } else {
            0
        };

        let parked = (0..count)
            .map(|slot| alloc(slot, capacity_bytes, max_descriptions))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            states: (0..count).map(|_| AtomicU8::new(SlotState::Empty.raw())).collect(),
            parked: Mutex::new(parked),
            capacity_bytes,
            packets_per_buffer,
        })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn packets_per_buffer(&self) -> u32 {
        self.packets_per_buffer
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.states
            .get(slot)
            .map(|s| SlotState::from_raw(s.load(Ordering::Acquire)))
            .unwrap_or(SlotState::Empty)
    }

    pub fn set_state(&self, slot: usize, state: SlotState) {
        if let Some(s) = self.states.get(slot) {
            s.store(state.raw(), Ordering::Release);
        }
    }

    pub fn count(&self, state: SlotState) -> usize {
        (0..self.len()).filter(|&slot| self.state(slot) == state).count()
    }

    pub fn states(&self) -> Vec<SlotState> {
        (0..self.len()).map(|slot| self.state(slot)).collect()
    }

    /// Return a buffer to the pool as Empty.
    pub fn park(&self, mut buffer: AudioBuffer) {
        buffer.clear();
        self.set_state(buffer.slot(), SlotState::Empty);
        self.lock_parked().push(buffer);
    }

    pub fn park_all(&self, buffers: impl IntoIterator<Item = AudioBuffer>) {
        for buffer in buffers {
            self.park(buffer);
        }
    }

    pub fn parked_count(&self) -> usize {
        self.lock_parked().len()
    }

    /// True when every slot is back in the pool
    pub fn all_parked(&self) -> bool {
        self.parked_count() == self.len()
    }

    /// Hand every parked buffer to `fill`, lowest slot first.
    ///
    /// Returns how many buffers were handed out. The parked lock is not
    /// held while `fill` runs, so `fill` may park buffers back.
    pub fn prime<F>(&self, mut fill: F) -> usize
    where
        F: FnMut(AudioBuffer),
    {
        let mut buffers = std::mem::take(&mut *self.lock_parked());
        buffers.sort_by_key(AudioBuffer::slot);
        let count = buffers.len();
        for buffer in buffers {
            fill(buffer);
        }
        count
    }

    fn lock_parked(&self) -> MutexGuard<'_, Vec<AudioBuffer>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_all_empty_and_parked() {
        let pool = BufferPool::allocate(3, 1024, 256, false).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.count(SlotState::Empty), 3);
        assert!(pool.all_parked());
        assert_eq!(pool.capacity_bytes(), 1024);
    }

    #[test]
    fn test_allocate_rejects_zero_slots() {
        assert!(matches!(
            BufferPool::allocate(0, 1024, 1, false),
            Err(Error::Config(_))
        ));
        assert!(BufferPool::allocate(2, 0, 1, false).is_err());
    }

    #[test]
    fn test_allocate_with_propagates_failure() {
        let result = BufferPool::allocate_with(3, 64, 8, true, |slot, cap, desc| {
            assert_eq!(desc, 8);
            if slot == 2 {
                Err(Error::RenderService("device gone".to_string()))
            } else {
                AudioBuffer::allocate(slot, cap, desc)
            }
        });
        assert!(matches!(result, Err(Error::RenderService(_))));
    }

    #[test]
    fn test_prime_hands_out_in_slot_order() {
        let pool = BufferPool::allocate(3, 16, 4, false).unwrap();
        let mut seen = Vec::new();
        let handed = pool.prime(|buffer| {
            pool.set_state(buffer.slot(), SlotState::Enqueued);
            seen.push(buffer.slot());
        });
        assert_eq!(handed, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(pool.parked_count(), 0);
        assert_eq!(pool.count(SlotState::Enqueued), 3);
    }

    #[test]
    fn test_prime_allows_parking_back() {
        let pool = BufferPool::allocate(2, 16, 4, false).unwrap();
        pool.prime(|buffer| pool.park(buffer));
        assert!(pool.all_parked());
        assert_eq!(pool.count(SlotState::Empty), 2);
    }

    #[test]
    fn test_park_resets_state() {
        let pool = BufferPool::allocate(2, 16, 4, false).unwrap();
        let mut taken = Vec::new();
        pool.prime(|buffer| {
            pool.set_state(buffer.slot(), SlotState::Filling);
            taken.push(buffer);
        });
        assert_eq!(pool.states(), vec![SlotState::Filling, SlotState::Filling]);

        pool.park_all(taken);
        assert_eq!(pool.states(), vec![SlotState::Empty, SlotState::Empty]);
    }

    #[test]
    fn test_slot_state_display() {
        assert_eq!(SlotState::Enqueued.to_string(), "Enqueued");
    }
}
