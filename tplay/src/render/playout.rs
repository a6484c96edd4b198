//! Queue of enqueued buffers being played out
//!
//! Shared between the consumer (cpal data callback or the null pacer) and
//! the render thread. Holders keep the lock only for queue bookkeeping and
//! sample copying, never while invoking the consumed callback.

use std::collections::VecDeque;

use crate::audio::AudioBuffer;

#[derive(Debug)]
pub struct Playout {
    queue: VecDeque<AudioBuffer>,
    /// Buffer currently being read and the byte offset into it
    current: Option<(AudioBuffer, usize)>,
    running: bool,
    /// Set by a non-immediate stop: keep playing until the queue is empty
    draining: bool,
    /// Set on dispose; enqueues are refused afterwards
    closed: bool,
    channels: usize,
    samples_rendered: u64,
}

impl Playout {
    pub fn new(channels: u16) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            running: false,
            draining: false,
            closed: false,
            channels: channels.max(1) as usize,
            samples_rendered: 0,
        }
    }

    /// Append a buffer; hands it back when the output is closed.
    pub fn push(&mut self, buffer: AudioBuffer) -> Result<(), AudioBuffer> {
        if self.closed {
            return Err(buffer);
        }
        self.queue.push_back(buffer);
        Ok(())
    }

    pub fn start(&mut self) {
        self.running = true;
        self.draining = false;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Keep rendering what is queued, then stop.
    pub fn drain(&mut self) {
        self.draining = true;
        self.settle();
    }

    /// Stop immediately and hand back every buffer not yet consumed.
    pub fn halt(&mut self, reset_position: bool) -> Vec<AudioBuffer> {
        self.running = false;
        self.draining = false;
        if reset_position {
            self.samples_rendered = 0;
        }
        let mut flushed: Vec<AudioBuffer> = self.current.take().map(|(b, _)| b).into_iter().collect();
        flushed.extend(self.queue.drain(..));
        flushed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn queued(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Nothing queued and not running
    pub fn is_idle(&self) -> bool {
        !self.running && self.queued() == 0
    }

    pub fn frames_rendered(&self) -> u64 {
        self.samples_rendered / self.channels as u64
    }

    /// Frames in the buffer at the head of the queue, if playing
    pub fn head_frames(&self) -> Option<u64> {
        if !self.running {
            return None;
        }
        self.queue.front().map(AudioBuffer::frame_count)
    }

    /// Consume the whole head buffer at once.
    ///
    /// Used by outputs that pace playback by buffer duration instead of
    /// copying samples.
    pub fn take_head(&mut self) -> Option<AudioBuffer> {
        if !self.running {
            return None;
        }
        let buffer = self.queue.pop_front()?;
        self.samples_rendered += buffer.frame_count() * self.channels as u64;
        self.settle();
        Some(buffer)
    }

    /// Next interleaved f32 sample, or `None` when there is nothing to play.
    ///
    /// Buffers hold native-endian f32 bytes. Exhausted buffers are handed
    /// to `on_exhausted`.
    pub fn next_sample<F>(&mut self, on_exhausted: &mut F) -> Option<f32>
    where
        F: FnMut(AudioBuffer),
    {
        if !self.running {
            return None;
        }
        loop {
            if self.current.is_none() {
                let next = self.queue.pop_front()?;
                self.current = Some((next, 0));
            }
            let (buffer, offset) = self.current.as_mut()?;
            let bytes = buffer.bytes();
            if *offset + 4 <= bytes.len() {
                let raw = [
                    bytes[*offset],
                    bytes[*offset + 1],
                    bytes[*offset + 2],
                    bytes[*offset + 3],
                ];
                *offset += 4;
                self.samples_rendered += 1;
                return Some(f32::from_ne_bytes(raw));
            }
            if let Some((done, _)) = self.current.take() {
                on_exhausted(done);
            }
            self.settle();
            if !self.running {
                return None;
            }
        }
    }

    fn settle(&mut self) {
        if self.draining && self.queued() == 0 {
            self.running = false;
            self.draining = false;
        }
    }
}
