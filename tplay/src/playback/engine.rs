//! Playback engine (transport controller)
//!
//! Owns the render output and serializes every transport command behind a
//! single transition lock, so two seeks (or a pause racing a seek) never
//! interleave their halt and re-prime phases. The refill engine runs on the
//! render thread and never takes this lock; it only moves a non-terminal
//! state to `Finished`, which is why every controller transition out of an
//! observed state is a compare-and-swap.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tplay_common::{PlayerEvent, TransportState};
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioSource, StreamFormat, SymphoniaDecoder};
use crate::control::Command;
use crate::error::{Error, Result};
use crate::playback::buffer_pool::{BufferPool, SlotState};
use crate::playback::position::clamp_seconds;
use crate::playback::refill::RefillEngine;
use crate::render::{ConsumedCallback, RenderOutput, RenderService};
use crate::state::PlayerContext;

/// Engine sizing and start-up behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Number of buffer slots
    pub buffer_count: usize,
    /// Audio held by one buffer
    pub buffer_duration_ms: u32,
    /// `Paused` primes the buffers without starting the output
    pub initial_state: TransportState,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            buffer_count: 3,
            buffer_duration_ms: 100,
            initial_state: TransportState::Playing,
        }
    }
}

struct ControlState {
    /// `None` once quit has disposed the output
    output: Option<Box<dyn RenderOutput>>,
}

pub struct PlaybackEngine {
    ctx: Arc<PlayerContext>,
    refill: RefillEngine,
    control: Mutex<ControlState>,
}

impl PlaybackEngine {
    /// Open `path` for streaming decode and start playback on `render`.
    ///
    /// # Errors
    /// [`Error::Open`] if the file cannot be decoded, [`Error::RenderService`]
    /// if the output or its buffers cannot be created.
    pub fn open(path: &Path, options: &EngineOptions, render: &dyn RenderService) -> Result<Self> {
        let source = SymphoniaDecoder::open(path)?;
        Self::with_source(Box::new(source), options, render)
    }

    /// Start playback of an already open source.
    pub fn with_source(
        source: Box<dyn AudioSource>,
        options: &EngineOptions,
        render: &dyn RenderService,
    ) -> Result<Self> {
        if options.initial_state.is_terminal() {
            return Err(Error::Config(format!(
                "Initial state must be playing or paused, got {}",
                options.initial_state
            )));
        }

        let format = source.format();
        let packets_per_buffer = format.packets_per_buffer(options.buffer_duration_ms);
        let capacity = format.buffer_capacity(packets_per_buffer);

        // The callback needs the refill engine, which needs the pool, which
        // is allocated through the output.
        let refill_slot: Arc<OnceLock<RefillEngine>> = Arc::new(OnceLock::new());
        let callback_slot = refill_slot.clone();
        let on_consumed: ConsumedCallback =
            Arc::new(move |output: &dyn RenderOutput, buffer: AudioBuffer| {
                if let Some(refill) = callback_slot.get() {
                    refill.on_buffer_consumed(output, buffer);
                }
            });

        let output = render.create_output(format, on_consumed)?;
        let pool = BufferPool::allocate_with(
            options.buffer_count,
            capacity,
            packets_per_buffer,
            format.geometry.is_variable(),
            |slot, capacity, max_descriptions| {
                output.allocate_buffer(slot, capacity, max_descriptions)
            },
        )?;

        let ctx = Arc::new(PlayerContext::new(source, pool, TransportState::Paused));
        let refill = RefillEngine::new(ctx.clone());
        let _ = refill_slot.set(refill.clone());

        info!(
            "Engine ready: {} Hz, {} channels, {:.1}s, {} buffers x {} packets ({} bytes)",
            format.sample_rate,
            format.channels,
            ctx.duration_seconds(),
            options.buffer_count,
            packets_per_buffer,
            capacity
        );

        let engine = Self {
            ctx,
            refill,
            control: Mutex::new(ControlState {
                output: Some(output),
            }),
        };

        {
            let control = engine.lock_control();
            let output = engine.output(&control)?;
            engine.prime(output);

            if options.initial_state == TransportState::Playing {
                match engine
                    .ctx
                    .transport
                    .compare_exchange(TransportState::Paused, TransportState::Playing)
                {
                    Ok(()) => {
                        output.start()?;
                        engine.ctx.broadcast_event(PlayerEvent::state_changed(
                            TransportState::Paused,
                            TransportState::Playing,
                        ));
                    }
                    // Whole stream fit in the first prime
                    Err(_) => drain_tail(output)?,
                }
            } else if engine.ctx.transport.is_terminal() {
                engine.ctx.pool.park_all(output.reset()?);
            }
        }

        Ok(engine)
    }

    /// Start (or resume) output. No-op when already playing.
    pub fn play(&self) -> Result<()> {
        let control = self.lock_control();
        self.play_locked(&control)
    }

    /// Pause output, keeping queued buffers. No-op when already paused.
    pub fn pause(&self) -> Result<()> {
        let control = self.lock_control();
        self.pause_locked(&control)
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        let control = self.lock_control();
        match self.ctx.transport.load() {
            TransportState::Playing => self.pause_locked(&control),
            TransportState::Paused => self.play_locked(&control),
            state => Err(Error::InvalidState {
                operation: "toggle",
                state,
            }),
        }
    }

    /// Jump `delta_seconds` relative to the elapsed time, clamped to the
    /// stream.
    ///
    /// Halts and flushes the output, moves the cursor, re-primes every
    /// slot from the new position and restarts the output if it was
    /// playing.
    pub fn seek(&self, delta_seconds: f64) -> Result<()> {
        let control = self.lock_control();
        let state = self.ctx.transport.load();
        if state.is_terminal() {
            return Err(Error::InvalidState {
                operation: "seek",
                state,
            });
        }
        let output = self.output(&control)?;

        let target = clamp_seconds(
            self.ctx.tracker.elapsed_seconds() + delta_seconds,
            self.ctx.duration_seconds(),
        );

        self.ctx.pool.park_all(output.reset()?);

        if self.ctx.transport.load() == TransportState::Finished {
            debug!("Stream finished before seek could halt output");
            return Ok(());
        }

        let packet = self.ctx.tracker.seek_to(target);
        self.prime(output);

        if self.ctx.transport.load() == TransportState::Finished {
            if state == TransportState::Playing {
                drain_tail(output)?;
            } else {
                self.ctx.pool.park_all(output.reset()?);
            }
        } else if state == TransportState::Playing {
            output.start()?;
        }

        let elapsed = self.ctx.tracker.elapsed_seconds();
        debug!(
            "Seek {:+.1}s -> {:.3}s (packet {})",
            delta_seconds, elapsed, packet
        );
        self.ctx.broadcast_event(PlayerEvent::Seeked {
            requested_delta_secs: delta_seconds,
            elapsed_secs: elapsed,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Stop immediately and release the output. Accepted in every state.
    pub fn quit(&self) -> Result<()> {
        let mut control = self.lock_control();
        self.ctx.set_transport_state(TransportState::Stopped);

        let Some(output) = control.output.take() else {
            return Ok(());
        };
        match output.stop(true) {
            Ok(flushed) => self.ctx.pool.park_all(flushed),
            Err(e) => warn!("Failed to stop output: {}", e),
        }
        output.dispose();
        info!("Playback stopped");
        Ok(())
    }

    /// Apply a control-surface command.
    pub fn apply(&self, command: Command) -> Result<()> {
        match command {
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::TogglePlayPause => self.toggle_play_pause(),
            Command::Seek(delta) => self.seek(delta),
            Command::Quit => self.quit(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.ctx.transport.load()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.ctx.tracker.elapsed_seconds()
    }

    /// Position of the read head, ahead of `elapsed_seconds` by the queued
    /// audio
    pub fn cursor_seconds(&self) -> f64 {
        self.ctx.tracker.cursor_seconds()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.ctx.duration_seconds()
    }

    pub fn is_finished(&self) -> bool {
        self.ctx.transport.load() == TransportState::Finished
    }

    /// Terminal and every buffer back in the pool: nothing left to hear.
    pub fn is_drained(&self) -> bool {
        self.ctx.transport.is_terminal() && self.ctx.pool.all_parked()
    }

    pub fn format(&self) -> StreamFormat {
        self.ctx.format()
    }

    pub fn packets_per_buffer(&self) -> u32 {
        self.ctx.pool.packets_per_buffer()
    }

    /// Seconds of audio one full buffer holds
    pub fn buffer_duration_seconds(&self) -> f64 {
        self.ctx
            .tracker
            .timebase()
            .packets_to_seconds(self.ctx.pool.packets_per_buffer() as u64)
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.ctx.pool.states()
    }

    /// Frames rendered since the last seek, `None` after quit
    pub fn render_position(&self) -> Option<u64> {
        let control = self.lock_control();
        control.output.as_ref().map(|output| output.current_position())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.ctx.subscribe_events()
    }

    /// Broadcast a position report for observers.
    pub fn publish_position(&self) {
        self.ctx.broadcast_event(PlayerEvent::Position {
            elapsed_secs: self.elapsed_seconds(),
            duration_secs: self.duration_seconds(),
            state: self.state(),
            timestamp: Utc::now(),
        });
    }

    fn play_locked(&self, control: &ControlState) -> Result<()> {
        match self
            .ctx
            .transport
            .compare_exchange(TransportState::Paused, TransportState::Playing)
        {
            Ok(()) => {
                self.output(control)?.start()?;
                self.ctx.broadcast_event(PlayerEvent::state_changed(
                    TransportState::Paused,
                    TransportState::Playing,
                ));
                Ok(())
            }
            Err(TransportState::Playing) => Ok(()),
            Err(state) => {
                self.settle_finished(control)?;
                Err(Error::InvalidState {
                    operation: "play",
                    state,
                })
            }
        }
    }

    fn pause_locked(&self, control: &ControlState) -> Result<()> {
        match self.ctx.transport.load() {
            TransportState::Paused => return Ok(()),
            TransportState::Playing => {}
            state => {
                return Err(Error::InvalidState {
                    operation: "pause",
                    state,
                })
            }
        }

        self.output(control)?.pause()?;
        match self
            .ctx
            .transport
            .compare_exchange(TransportState::Playing, TransportState::Paused)
        {
            Ok(()) => {
                self.ctx.broadcast_event(PlayerEvent::state_changed(
                    TransportState::Playing,
                    TransportState::Paused,
                ));
                Ok(())
            }
            Err(state) => {
                self.settle_finished(control)?;
                Err(Error::InvalidState {
                    operation: "pause",
                    state,
                })
            }
        }
    }

    /// A stream that finished while the output was halted still has its
    /// tail queued; let it play out so the engine drains.
    fn settle_finished(&self, control: &ControlState) -> Result<()> {
        if self.ctx.transport.load() != TransportState::Finished {
            return Ok(());
        }
        match control.output.as_deref() {
            Some(output) if !output.is_idle() => drain_tail(output),
            _ => Ok(()),
        }
    }

    fn prime(&self, output: &dyn RenderOutput) -> usize {
        self.ctx.pool.prime(|buffer| {
            self.refill.fill(output, buffer);
        })
    }

    fn output<'a>(&self, control: &'a ControlState) -> Result<&'a dyn RenderOutput> {
        control
            .output
            .as_deref()
            .ok_or_else(|| Error::RenderService("Output already disposed".to_string()))
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.quit();
    }
}

fn drain_tail(output: &dyn RenderOutput) -> Result<()> {
    output.start()?;
    output.stop(false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmSource;
    use crate::render::NullRenderService;

    /// Real-time null output so nothing is consumed during a test
    fn engine(seconds: usize, options: EngineOptions) -> PlaybackEngine {
        let source = PcmSource::new(vec![0.0; seconds * 1000], 1000, 1).unwrap();
        PlaybackEngine::with_source(Box::new(source), &options, &NullRenderService::new()).unwrap()
    }

    #[test]
    fn test_open_primes_and_plays() {
        let engine = engine(100, EngineOptions::default());
        assert_eq!(engine.state(), TransportState::Playing);
        assert_eq!(engine.packets_per_buffer(), 100);
        assert!((engine.buffer_duration_seconds() - 0.1).abs() < 1e-9);
        assert!(engine.cursor_seconds() >= 0.3);
    }

    #[test]
    fn test_initial_paused() {
        let engine = engine(
            10,
            EngineOptions {
                initial_state: TransportState::Paused,
                ..Default::default()
            },
        );
        assert_eq!(engine.state(), TransportState::Paused);
        assert_eq!(
            engine.slot_states(),
            vec![SlotState::Enqueued, SlotState::Enqueued, SlotState::Enqueued]
        );
    }

    #[test]
    fn test_rejects_terminal_initial_state() {
        let source = PcmSource::new(vec![0.0; 1000], 1000, 1).unwrap();
        let result = PlaybackEngine::with_source(
            Box::new(source),
            &EngineOptions {
                initial_state: TransportState::Finished,
                ..Default::default()
            },
            &NullRenderService::new(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_pause_play_are_idempotent() {
        let engine = engine(10, EngineOptions::default());
        engine.pause().unwrap();
        engine.pause().unwrap();
        assert_eq!(engine.state(), TransportState::Paused);
        engine.play().unwrap();
        engine.play().unwrap();
        assert_eq!(engine.state(), TransportState::Playing);
    }

    #[test]
    fn test_quit_is_idempotent_and_terminal() {
        let engine = engine(10, EngineOptions::default());
        engine.quit().unwrap();
        engine.quit().unwrap();
        assert_eq!(engine.state(), TransportState::Stopped);
        assert!(engine.is_drained());
        assert_eq!(engine.render_position(), None);

        assert!(matches!(
            engine.seek(1.0),
            Err(Error::InvalidState {
                operation: "seek",
                state: TransportState::Stopped
            })
        ));
        assert!(engine.toggle_play_pause().is_err());
    }

    #[test]
    fn test_apply_dispatches() {
        let engine = engine(
            10,
            EngineOptions {
                initial_state: TransportState::Paused,
                ..Default::default()
            },
        );
        engine.apply(Command::Seek(2.0)).unwrap();
        assert!((engine.elapsed_seconds() - 2.0).abs() < 1e-9);
        assert_eq!(engine.state(), TransportState::Paused);
        engine.apply(Command::TogglePlayPause).unwrap();
        assert_eq!(engine.state(), TransportState::Playing);
        engine.apply(Command::Pause).unwrap();
        assert_eq!(engine.state(), TransportState::Paused);
        engine.apply(Command::Quit).unwrap();
        assert_eq!(engine.state(), TransportState::Stopped);
    }

    #[test]
    fn test_short_stream_finishes_during_open() {
        // 0.15s: two buffers, then end of stream on the third fill
        let source = PcmSource::new(vec![0.0; 150], 1000, 1).unwrap();
        let engine = PlaybackEngine::with_source(
            Box::new(source),
            &EngineOptions::default(),
            &NullRenderService::with_speed(50.0),
        )
        .unwrap();
        assert!(engine.is_finished());

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !engine.is_drained() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(engine.is_drained());
        assert!((engine.elapsed_seconds() - 0.15).abs() < 1e-9);
    }
}
