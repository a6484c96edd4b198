//! Decode-side types: stream format, buffer storage, sources

pub mod buffer;
pub mod decoder;
pub mod format;
pub mod source;

pub use buffer::AudioBuffer;
pub use decoder::SymphoniaDecoder;
pub use format::{PacketDescription, PacketGeometry, StreamFormat};
pub use source::{AudioSource, PacketRead, PcmSource};
