//! Decode service interface
//!
//! An [`AudioSource`] is an open, decodable stream addressed by packet
//! index. Closing is dropping.

use crate::audio::format::{PacketDescription, StreamFormat};
use crate::error::{Error, Result};

/// Outcome of one packet read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketRead {
    /// Packets consumed; 0 means end of stream
    pub packets: u32,
    /// Bytes written into the storage
    pub bytes: usize,
    /// Frames represented by the packets read
    pub frames: u64,
}

impl PacketRead {
    pub fn end_of_stream() -> Self {
        Self::default()
    }
}

/// Packet-addressed decoded audio stream
pub trait AudioSource: Send {
    fn format(&self) -> StreamFormat;

    /// Total packets in the stream
    fn total_packets(&self) -> u64;

    /// Total (or estimated) duration in seconds
    fn duration_seconds(&self) -> f64;

    /// Read up to `max_packets` packets starting at `start_packet`.
    ///
    /// Writes payload into `storage` (never more than it holds) and, for
    /// variable geometry, one entry per packet into `descriptions`.
    /// Returns zero packets at or past the end of the stream.
    fn read_packets(
        &mut self,
        start_packet: u64,
        max_packets: u32,
        storage: &mut [u8],
        descriptions: &mut Vec<PacketDescription>,
    ) -> Result<PacketRead>;
}

/// Fully decoded interleaved f32 PCM held in memory.
///
/// One packet is one frame.
pub struct PcmSource {
    format: StreamFormat,
    samples: Vec<f32>,
    frames: u64,
}

impl PcmSource {
    /// Wrap interleaved samples. Trailing samples that do not form a whole
    /// frame are discarded.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(Error::Open {
                path: Default::default(),
                reason: format!(
                    "Invalid PCM format: {} Hz, {} channels",
                    sample_rate, channels
                ),
            });
        }
        let mut samples = samples;
        let frames = (samples.len() / channels as usize) as u64;
        samples.truncate(frames as usize * channels as usize);

        Ok(Self {
            format: StreamFormat::pcm_f32(sample_rate, channels),
            samples,
            frames,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl AudioSource for PcmSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn total_packets(&self) -> u64 {
        self.frames
    }

    fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.format.sample_rate as f64
    }

    fn read_packets(
        &mut self,
        start_packet: u64,
        max_packets: u32,
        storage: &mut [u8],
        _descriptions: &mut Vec<PacketDescription>,
    ) -> Result<PacketRead> {
        if start_packet >= self.frames {
            return Ok(PacketRead::end_of_stream());
        }

        let channels = self.format.channels as usize;
        let bytes_per_frame = self.format.geometry.bytes_per_packet as usize;
        let fits = (storage.len() / bytes_per_frame) as u64;
        let frames = (self.frames - start_packet)
            .min(max_packets as u64)
            .min(fits);
        if frames == 0 {
            return Err(Error::DecodeRead {
                packet: start_packet,
                reason: format!("Buffer of {} bytes cannot hold one frame", storage.len()),
            });
        }

        let first = start_packet as usize * channels;
        let count = frames as usize * channels;
        let src = &self.samples[first..first + count];
        for (dst, sample) in storage.chunks_exact_mut(4).zip(src) {
            dst.copy_from_slice(&sample.to_ne_bytes());
        }

        Ok(PacketRead {
            packets: frames as u32,
            bytes: count * 4,
            frames,
        })
    }
}
