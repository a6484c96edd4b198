//! Audio decoder using symphonia
//!
//! Decodes lazily: each packet read pulls just enough compressed packets
//! through the codec to cover the requested frames. Reads that do not
//! continue where the last one stopped seek the container first.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::{debug, info, trace, warn};

use crate::audio::format::{PacketDescription, StreamFormat};
use crate::audio::source::{AudioSource, PacketRead};
use crate::error::{Error, Result};

/// Consecutive undecodable packets tolerated before a read fails
const MAX_DECODE_RETRIES: u32 = 8;

/// Streaming decoder for one audio file.
///
/// Serves interleaved f32 PCM, one packet per frame, like
/// [`PcmSource`](crate::audio::PcmSource).
pub struct SymphoniaDecoder {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: TimeBase,
    format: StreamFormat,
    total_frames: u64,
    /// Decoded samples not yet handed out
    pending: Vec<f32>,
    /// Frame index of the first sample in `pending`
    pending_start: u64,
    sample_buf: Option<SampleBuffer<f32>>,
    end_of_stream: bool,
    skipped_packets: u64,
}

struct Probed {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

impl SymphoniaDecoder {
    /// Open `path` and prepare to decode from its start.
    ///
    /// # Errors
    /// [`Error::Open`] when the file cannot be read, the container or codec
    /// is unsupported, or it holds no audio.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| Error::Open {
            path: path.to_path_buf(),
            reason,
        };

        debug!("Opening file: {}", path.display());

        let Probed {
            reader,
            track_id,
            params,
        } = probe(path)?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| open_err(format!("Unsupported codec: {}", e)))?;

        let mut source = Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            time_base: TimeBase::new(1, 1),
            format: StreamFormat::pcm_f32(1, 1),
            total_frames: 0,
            pending: Vec::new(),
            pending_start: 0,
            sample_buf: None,
            end_of_stream: false,
            skipped_packets: 0,
        };

        // Some containers only reveal the signal spec once a packet decodes
        let (sample_rate, channels) = match (params.sample_rate, params.channels) {
            (Some(rate), Some(channels)) => (rate, channels.count() as u16),
            _ => {
                let spec = source
                    .decode_next()
                    .map_err(|e| open_err(e.to_string()))?
                    .ok_or_else(|| open_err("No audio decoded".to_string()))?;
                (
                    params.sample_rate.unwrap_or(spec.0),
                    params.channels.map_or(spec.1, |c| c.count() as u16),
                )
            }
        };
        if sample_rate == 0 || channels == 0 {
            return Err(open_err(format!(
                "Invalid PCM format: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        source.format = StreamFormat::pcm_f32(sample_rate, channels);
        source.time_base = params
            .time_base
            .unwrap_or_else(|| TimeBase::new(1, sample_rate));

        source.total_frames = match params.n_frames {
            Some(frames) => frames,
            None => count_frames(path, &source)?,
        };
        if source.total_frames == 0 {
            return Err(open_err("No audio decoded".to_string()));
        }

        info!(
            "Opened {}: {} Hz, {} channels, {} frames",
            path.display(),
            sample_rate,
            channels,
            source.total_frames
        );

        Ok(source)
    }

    fn channels(&self) -> usize {
        self.format.channels as usize
    }

    fn pending_frames(&self) -> u64 {
        (self.pending.len() / self.channels()) as u64
    }

    fn frames_to_ts(&self, frames: u64) -> u64 {
        let tb = self.time_base;
        let ts = frames as u128 * tb.denom as u128
            / (self.format.sample_rate as u128 * tb.numer.max(1) as u128);
        ts as u64
    }

    fn ts_to_frames(&self, ts: u64) -> u64 {
        let tb = self.time_base;
        let frames = ts as u128 * tb.numer as u128 * self.format.sample_rate as u128
            / tb.denom.max(1) as u128;
        frames as u64
    }

    /// Decode one packet of our track into `pending`.
    ///
    /// Returns the decoded signal's rate and channel count, or `None` at
    /// the end of the stream.
    fn decode_next(&mut self) -> Result<Option<(u32, u16)>> {
        let mut failures = 0;
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.end_of_stream = true;
                    return Ok(None);
                }
                Err(e) => return Err(self.read_error(format!("Error reading packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) if failures < MAX_DECODE_RETRIES => {
                    failures += 1;
                    self.skipped_packets += 1;
                    debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(self.read_error(format!("Decode error: {}", e))),
            };

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                self.pending.extend_from_slice(buf.samples());
            }
            return Ok(Some((spec.rate, spec.channels.count() as u16)));
        }
    }

    fn read_error(&self, reason: String) -> Error {
        Error::DecodeRead {
            packet: self.pending_start + self.pending_frames(),
            reason,
        }
    }

    /// Make `pending` start at `frame`, seeking the container if needed.
    fn position_at(&mut self, frame: u64) -> Result<()> {
        let buffered_end = self.pending_start + self.pending_frames();
        if (self.pending_start..=buffered_end).contains(&frame) {
            let skip = (frame - self.pending_start) as usize * self.channels();
            self.pending.drain(..skip);
            self.pending_start = frame;
            return Ok(());
        }

        trace!(frame, "seeking {}", self.path.display());
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: self.frames_to_ts(frame),
                    track_id: self.track_id,
                },
            )
            .map_err(|e| Error::DecodeRead {
                packet: frame,
                reason: format!("Seek failed: {}", e),
            })?;
        self.decoder.reset();
        self.pending.clear();
        self.end_of_stream = false;
        self.pending_start = self.ts_to_frames(seeked.actual_ts).min(frame);

        // Decode forward from the preceding sync point up to `frame`
        while self.pending_start + self.pending_frames() < frame {
            if self.decode_next()?.is_none() {
                break;
            }
        }
        let skip = ((frame - self.pending_start).min(self.pending_frames()) as usize) * self.channels();
        self.pending.drain(..skip);
        self.pending_start = frame;
        Ok(())
    }
}

impl Drop for SymphoniaDecoder {
    fn drop(&mut self) {
        if self.skipped_packets > 0 {
            warn!(
                "Skipped {} undecodable packets in {}",
                self.skipped_packets,
                self.path.display()
            );
        }
    }
}

impl AudioSource for SymphoniaDecoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn total_packets(&self) -> u64 {
        self.total_frames
    }

    fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / self.format.sample_rate as f64
    }

    fn read_packets(
        &mut self,
        start_packet: u64,
        max_packets: u32,
        storage: &mut [u8],
        _descriptions: &mut Vec<PacketDescription>,
    ) -> Result<PacketRead> {
        if start_packet >= self.total_frames {
            return Ok(PacketRead::end_of_stream());
        }

        let bytes_per_frame = self.format.geometry.bytes_per_packet as usize;
        let fits = (storage.len() / bytes_per_frame) as u64;
        let wanted = (self.total_frames - start_packet)
            .min(max_packets as u64)
            .min(fits);
        if wanted == 0 {
            return Err(Error::DecodeRead {
                packet: start_packet,
                reason: format!("Buffer of {} bytes cannot hold one frame", storage.len()),
            });
        }

        self.position_at(start_packet)?;
        while self.pending_frames() < wanted && !self.end_of_stream {
            self.decode_next()?;
        }

        let frames = wanted.min(self.pending_frames());
        let count = frames as usize * self.channels();
        for (dst, sample) in storage.chunks_exact_mut(4).zip(self.pending.drain(..count)) {
            dst.copy_from_slice(&sample.to_ne_bytes());
        }
        self.pending_start += frames;

        Ok(PacketRead {
            packets: frames as u32,
            bytes: count * 4,
            frames,
        })
    }
}

/// Probe the container and pick its first real audio track.
fn probe(path: &Path) -> Result<Probed> {
    let open_err = |reason: String| Error::Open {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Extension hint helps the probe pick a container reader
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| open_err(format!("Unsupported format: {}", e)))?;

    let reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| open_err("No audio track found".to_string()))?;

    Ok(Probed {
        track_id: track.id,
        params: track.codec_params.clone(),
        reader,
    })
}

/// Length of a stream whose header does not say, from packet durations.
///
/// Demuxes a second reader over the file; nothing is decoded.
fn count_frames(path: &Path, source: &SymphoniaDecoder) -> Result<u64> {
    let Probed {
        mut reader,
        track_id,
        ..
    } = probe(path)?;

    let mut ts = 0u64;
    loop {
        match reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => ts += packet.dur(),
            Ok(_) => {}
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => {
                warn!("Stopped counting frames in {}: {}", path.display(), e);
                break;
            }
        }
    }

    debug!("Counted {} timestamp units in {}", ts, path.display());
    Ok(source.ts_to_frames(ts))
}
