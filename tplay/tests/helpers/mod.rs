//! Test helpers for tplay integration tests
//!
//! Provides reusable test infrastructure components:
//! - SyntheticSource: packet source of arbitrary geometry with scripted
//!   end-of-stream and read failures
//! - ScriptedRenderer: render service whose buffers are consumed only when
//!   a test says so, on the test's own thread
//! - WAV file generation with hound

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tplay::audio::{
    AudioBuffer, AudioSource, PacketDescription, PacketGeometry, PacketRead, StreamFormat,
};
use tplay::error::{Error, Result};
use tplay::render::{ConsumedCallback, Rejected, RenderOutput, RenderService};

// ========================================
// SyntheticSource
// ========================================

/// Packet source that writes the packet index into every packet's bytes
pub struct SyntheticSource {
    format: StreamFormat,
    total_packets: u64,
    duration_seconds: f64,
    /// Read call (1-based) that reports end of stream
    eos_on_call: Option<usize>,
    /// Read call (1-based) that fails
    error_on_call: Option<usize>,
    calls: usize,
    reads: Arc<Mutex<Vec<u64>>>,
}

impl SyntheticSource {
    /// Constant geometry, one frame per packet
    pub fn pcm(sample_rate: u32, seconds: u64) -> Self {
        let geometry = PacketGeometry {
            bytes_per_packet: 4,
            frames_per_packet: 1,
        };
        let format = StreamFormat {
            sample_rate,
            channels: 1,
            geometry,
            max_packet_size: 4,
        };
        Self::new(format, sample_rate as u64 * seconds, seconds as f64)
    }

    /// Variable-size packets of `frames_per_packet` frames (MP3-like)
    pub fn variable(sample_rate: u32, frames_per_packet: u32, seconds: u64) -> Self {
        let format = StreamFormat {
            sample_rate,
            channels: 2,
            geometry: PacketGeometry {
                bytes_per_packet: 0,
                frames_per_packet,
            },
            max_packet_size: 16,
        };
        let total = sample_rate as u64 * seconds / frames_per_packet as u64;
        Self::new(format, total, seconds as f64)
    }

    pub fn new(format: StreamFormat, total_packets: u64, duration_seconds: f64) -> Self {
        Self {
            format,
            total_packets,
            duration_seconds,
            eos_on_call: None,
            error_on_call: None,
            calls: 0,
            reads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn eos_on_call(mut self, call: usize) -> Self {
        self.eos_on_call = Some(call);
        self
    }

    pub fn error_on_call(mut self, call: usize) -> Self {
        self.error_on_call = Some(call);
        self
    }

    /// Start packet of every read call, shared with the test
    pub fn reads(&self) -> Arc<Mutex<Vec<u64>>> {
        self.reads.clone()
    }

    fn packet_size(&self, packet: u64) -> usize {
        if self.format.geometry.is_variable() {
            // 8..=16 bytes
            8 + (packet % 9) as usize
        } else {
            self.format.geometry.bytes_per_packet as usize
        }
    }
}

impl AudioSource for SyntheticSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn total_packets(&self) -> u64 {
        self.total_packets
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn read_packets(
        &mut self,
        start_packet: u64,
        max_packets: u32,
        storage: &mut [u8],
        descriptions: &mut Vec<PacketDescription>,
    ) -> Result<PacketRead> {
        self.calls += 1;
        self.reads.lock().unwrap().push(start_packet);

        if self.error_on_call == Some(self.calls) {
            return Err(Error::DecodeRead {
                packet: start_packet,
                reason: "scripted failure".to_string(),
            });
        }
        if self.eos_on_call == Some(self.calls) || start_packet >= self.total_packets {
            return Ok(PacketRead::end_of_stream());
        }

        let mut offset = 0usize;
        let mut packets = 0u32;
        let mut packet = start_packet;
        while packets < max_packets && packet < self.total_packets {
            let size = self.packet_size(packet);
            if offset + size > storage.len() {
                break;
            }
            storage[offset..offset + size].fill(packet as u8);
            if self.format.geometry.is_variable() {
                descriptions.push(PacketDescription {
                    start_offset: offset as u64,
                    variable_frames: 0,
                    data_byte_size: size as u32,
                });
            }
            offset += size;
            packets += 1;
            packet += 1;
        }

        let frames = packets as u64 * self.format.geometry.frames_per_packet.max(1) as u64;
        Ok(PacketRead {
            packets,
            bytes: offset,
            frames,
        })
    }
}

// ========================================
// ScriptedRenderer
// ========================================

/// One enqueue as seen by the render service
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub slot: usize,
    pub start_packet: u64,
    pub packet_count: u32,
    pub descriptions: usize,
}

#[derive(Default)]
struct ScriptedState {
    queue: VecDeque<AudioBuffer>,
    submissions: Vec<Submission>,
    calls: Vec<String>,
    running: bool,
    draining: bool,
    refuse_enqueue: bool,
    refusals_left: u32,
    disposed: bool,
    frames: u64,
}

struct Shared {
    format: StreamFormat,
    state: Mutex<ScriptedState>,
    callback: ConsumedCallback,
}

/// Output handle; every clone refers to the same output
#[derive(Clone)]
pub struct ScriptedOutput {
    shared: Arc<Shared>,
}

impl ScriptedOutput {
    /// Play out the head buffer and run the consumed callback on this
    /// thread. Returns false if nothing could be consumed.
    pub fn consume_next(&self) -> bool {
        let buffer = {
            let mut state = self.shared.state.lock().unwrap();
            if !state.running {
                return false;
            }
            let Some(buffer) = state.queue.pop_front() else {
                return false;
            };
            state.frames += buffer.frame_count();
            if state.draining && state.queue.is_empty() {
                state.running = false;
                state.draining = false;
            }
            buffer
        };
        let callback = self.shared.callback.clone();
        callback(self, buffer);
        true
    }

    /// Consume until nothing is left (or `limit` buffers)
    pub fn consume_all(&self, limit: usize) -> usize {
        let mut consumed = 0;
        while consumed < limit && self.consume_next() {
            consumed += 1;
        }
        consumed
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.shared.state.lock().unwrap().submissions.clone()
    }

    pub fn clear_submissions(&self) {
        self.shared.state.lock().unwrap().submissions.clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().calls.clone()
    }

    pub fn queued_starts(&self) -> Vec<u64> {
        self.shared
            .state
            .lock()
            .unwrap()
            .queue
            .iter()
            .map(AudioBuffer::start_packet)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().unwrap().running
    }

    pub fn set_refuse_enqueue(&self, refuse: bool) {
        self.shared.state.lock().unwrap().refuse_enqueue = refuse;
    }

    /// Refuse only the next `count` enqueues
    pub fn refuse_next_enqueues(&self, count: u32) {
        self.shared.state.lock().unwrap().refusals_left = count;
    }

    fn record(&self, call: &str) {
        self.shared.state.lock().unwrap().calls.push(call.to_string());
    }

    fn flush(&self) -> Vec<AudioBuffer> {
        let mut state = self.shared.state.lock().unwrap();
        state.running = false;
        state.draining = false;
        state.queue.drain(..).collect()
    }
}

impl RenderOutput for ScriptedOutput {
    fn format(&self) -> StreamFormat {
        self.shared.format
    }

    fn enqueue(&self, buffer: AudioBuffer) -> std::result::Result<(), Rejected> {
        let mut state = self.shared.state.lock().unwrap();
        let refuse_once = state.refusals_left > 0;
        if refuse_once {
            state.refusals_left -= 1;
        }
        if refuse_once || state.refuse_enqueue || state.disposed {
            return Err(Rejected {
                buffer,
                reason: "scripted refusal".to_string(),
            });
        }
        state.submissions.push(Submission {
            slot: buffer.slot(),
            start_packet: buffer.start_packet(),
            packet_count: buffer.packet_count(),
            descriptions: buffer.descriptions().map_or(0, |d| d.len()),
        });
        state.queue.push_back(buffer);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.record("start");
        let mut state = self.shared.state.lock().unwrap();
        state.running = true;
        state.draining = false;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.record("pause");
        self.shared.state.lock().unwrap().running = false;
        Ok(())
    }

    fn stop(&self, immediate: bool) -> Result<Vec<AudioBuffer>> {
        if immediate {
            self.record("stop(immediate)");
            Ok(self.flush())
        } else {
            self.record("stop(drain)");
            let mut state = self.shared.state.lock().unwrap();
            state.draining = true;
            if state.queue.is_empty() {
                state.running = false;
            }
            Ok(Vec::new())
        }
    }

    fn reset(&self) -> Result<Vec<AudioBuffer>> {
        self.record("reset");
        self.shared.state.lock().unwrap().frames = 0;
        Ok(self.flush())
    }

    fn current_position(&self) -> u64 {
        self.shared.state.lock().unwrap().frames
    }

    fn is_idle(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        !state.running && state.queue.is_empty()
    }

    fn dispose(&self) {
        self.record("dispose");
        self.shared.state.lock().unwrap().disposed = true;
    }
}

/// Render service handing out [`ScriptedOutput`]s
#[derive(Default)]
pub struct ScriptedRenderer {
    outputs: Mutex<Vec<ScriptedOutput>>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently created output
    pub fn output(&self) -> ScriptedOutput {
        self.outputs
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no output created")
    }
}

impl RenderService for ScriptedRenderer {
    fn create_output(
        &self,
        format: StreamFormat,
        on_consumed: ConsumedCallback,
    ) -> Result<Box<dyn RenderOutput>> {
        let output = ScriptedOutput {
            shared: Arc::new(Shared {
                format,
                state: Mutex::new(ScriptedState::default()),
                callback: on_consumed,
            }),
        };
        self.outputs.lock().unwrap().push(output.clone());
        Ok(Box::new(output))
    }
}

// ========================================
// Misc
// ========================================

/// Write a 16-bit WAV of a 440 Hz tone
pub fn write_tone_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as u32;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * i16::MAX as f32 * 0.5) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Poll `cond` until it holds or five seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
