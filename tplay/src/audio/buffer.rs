//! Fixed-capacity audio buffer (one buffer slot's storage)
//!
//! A buffer is owned by exactly one party at a time: the refill engine
//! while filling, the render service while enqueued, the pool while idle.
//! Ownership moves with the value.

use crate::audio::format::PacketDescription;
use crate::audio::source::PacketRead;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct AudioBuffer {
    /// Pool slot index this storage belongs to
    slot: usize,
    /// Backing storage; length is the fixed capacity
    data: Vec<u8>,
    /// Bytes of `data` holding valid audio
    byte_size: usize,
    start_packet: u64,
    packet_count: u32,
    frame_count: u64,
    /// Per-packet descriptors, populated only for variable geometry
    descriptions: Vec<PacketDescription>,
}

impl AudioBuffer {
    /// Allocate zeroed storage of `capacity` bytes.
    ///
    /// `max_descriptions` reserves room for packet descriptors up front so
    /// the refill path never allocates (0 for constant geometry).
    pub fn allocate(slot: usize, capacity: usize, max_descriptions: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            Error::RenderService(format!(
                "Failed to allocate {} byte buffer for slot {}: {}",
                capacity, slot, e
            ))
        })?;
        data.resize(capacity, 0);

        let mut descriptions = Vec::new();
        descriptions.try_reserve_exact(max_descriptions).map_err(|e| {
            Error::RenderService(format!(
                "Failed to allocate packet descriptions for slot {}: {}",
                slot, e
            ))
        })?;

        Ok(Self {
            slot,
            data,
            byte_size: 0,
            start_packet: 0,
            packet_count: 0,
            frame_count: 0,
            descriptions,
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Storage and descriptor list for a decoder to write into.
    ///
    /// Clears any previous contents first.
    pub fn storage_mut(&mut self) -> (&mut [u8], &mut Vec<PacketDescription>) {
        self.clear();
        (&mut self.data, &mut self.descriptions)
    }

    /// Record what a decoder read wrote into this buffer.
    pub fn commit(&mut self, start_packet: u64, read: &PacketRead) {
        self.byte_size = read.bytes.min(self.data.len());
        self.start_packet = start_packet;
        self.packet_count = read.packets;
        self.frame_count = read.frames;
    }

    pub fn clear(&mut self) {
        self.byte_size = 0;
        self.start_packet = 0;
        self.packet_count = 0;
        self.frame_count = 0;
        self.descriptions.clear();
    }

    /// Valid audio bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.byte_size]
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn start_packet(&self) -> u64 {
        self.start_packet
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    /// One past the last packet held
    pub fn end_packet(&self) -> u64 {
        self.start_packet + self.packet_count as u64
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }

    /// Packet descriptors, present only for variable geometry
    pub fn descriptions(&self) -> Option<&[PacketDescription]> {
        if self.descriptions.is_empty() {
            None
        } else {
            Some(&self.descriptions)
        }
    }
}
