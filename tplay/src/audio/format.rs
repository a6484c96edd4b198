//! Stream format and packet geometry
//!
//! The engine never interprets payload bytes. It only needs to know how
//! many bytes and frames a packet spans so it can size buffers and convert
//! between packet indices and seconds.

/// Bytes and frames carried by one packet.
///
/// `bytes_per_packet == 0` means packet sizes vary and every read must
/// produce one [`PacketDescription`] per packet. `frames_per_packet == 0`
/// means the frame count per packet varies as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketGeometry {
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
}

impl PacketGeometry {
    /// Interleaved f32 PCM: one frame per packet
    pub fn pcm_f32(channels: u16) -> Self {
        Self {
            bytes_per_packet: channels as u32 * std::mem::size_of::<f32>() as u32,
            frames_per_packet: 1,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.bytes_per_packet == 0
    }
}

/// Format of an open stream. Immutable for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Frames per second
    pub sample_rate: u32,
    pub channels: u16,
    pub geometry: PacketGeometry,
    /// Upper bound on the size of any single packet in bytes
    pub max_packet_size: u32,
}

impl StreamFormat {
    /// Constant-geometry f32 PCM format
    pub fn pcm_f32(sample_rate: u32, channels: u16) -> Self {
        let geometry = PacketGeometry::pcm_f32(channels);
        Self {
            sample_rate,
            channels,
            geometry,
            max_packet_size: geometry.bytes_per_packet,
        }
    }

    /// Number of packets one buffer holds for the requested buffer duration.
    ///
    /// Never less than one. When frames-per-packet varies, a buffer holds
    /// a tenth of `sample_rate` packets.
    pub fn packets_per_buffer(&self, buffer_ms: u32) -> u32 {
        let fpp = self.geometry.frames_per_packet as u64;
        let packets = if fpp == 0 {
            self.sample_rate as u64 / 10
        } else {
            (buffer_ms as u64 * self.sample_rate as u64).div_ceil(1000 * fpp)
        };
        packets.clamp(1, u32::MAX as u64) as u32
    }

    /// Byte capacity needed to hold `packets` packets of worst-case size
    pub fn buffer_capacity(&self, packets: u32) -> usize {
        packets as usize * self.max_packet_size.max(1) as usize
    }

    /// Bytes per frame, when the geometry is constant
    pub fn bytes_per_frame(&self) -> Option<u32> {
        let g = self.geometry;
        if g.is_variable() || g.frames_per_packet == 0 {
            None
        } else {
            Some(g.bytes_per_packet / g.frames_per_packet)
        }
    }
}

/// Location of one packet inside a buffer (variable geometry only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketDescription {
    /// Byte offset of the packet within the buffer
    pub start_offset: u64,
    /// Frames in the packet (0 when the format's frames-per-packet applies)
    pub variable_frames: u32,
    pub data_byte_size: u32,
}
