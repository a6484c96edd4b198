//! Headless output paced by the wall clock
//!
//! Nothing is played: the render thread holds each head buffer for its
//! duration (divided by the speed factor) and then reports it consumed.
//! Used for `--output null` and in tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::debug;

use super::output::{Command, OutputHandle, OwnedOutput};
use super::playout::Playout;
use super::{ConsumedCallback, RenderOutput, RenderService};
use crate::audio::StreamFormat;
use crate::error::{Error, Result};

/// Poll interval while nothing is playing
const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct NullRenderService {
    speed: f64,
}

impl NullRenderService {
    /// Real-time pacing
    pub fn new() -> Self {
        Self { speed: 1.0 }
    }

    /// Consume buffers `speed` times faster than real time.
    pub fn with_speed(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self { speed }
    }
}

impl Default for NullRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderService for NullRenderService {
    fn create_output(
        &self,
        format: StreamFormat,
        on_consumed: ConsumedCallback,
    ) -> Result<Box<dyn RenderOutput>> {
        if format.sample_rate == 0 {
            return Err(Error::RenderService("Sample rate is zero".to_string()));
        }

        let playout = Arc::new(Mutex::new(Playout::new(format.channels)));
        let (commands_tx, commands_rx) = unbounded();
        let handle = OutputHandle::new(format, playout, commands_tx);

        let thread_handle = handle.clone();
        let speed = self.speed;
        let thread = thread::Builder::new()
            .name("tplay-null-render".to_string())
            .spawn(move || run(thread_handle, commands_rx, on_consumed, speed))
            .map_err(|e| Error::RenderService(format!("Failed to spawn render thread: {}", e)))?;
        handle.attach_thread(thread);

        debug!(
            "Null output created: {} Hz, {} channels, speed {}",
            format.sample_rate, format.channels, speed
        );
        Ok(Box::new(OwnedOutput::new(handle)))
    }
}

/// Paced playing time credited to the buffer at the head of the queue
///
/// Survives pauses, so a head buffer resumes where it left off instead of
/// waiting out its whole duration again.
#[derive(Debug, Default)]
struct HeadClock {
    played: Duration,
}

impl HeadClock {
    /// How long to wait before checking the head again.
    fn wait(&self, head: Option<Duration>) -> Duration {
        match head {
            Some(total) => total.saturating_sub(self.played).min(IDLE_POLL),
            None => IDLE_POLL,
        }
    }

    /// Credit `elapsed` to a playing head; true once it has been fully played.
    fn advance(&mut self, head: Option<Duration>, elapsed: Duration) -> bool {
        match head {
            Some(total) => {
                self.played += elapsed;
                self.played >= total
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.played = Duration::ZERO;
    }
}

fn run(handle: OutputHandle, commands: Receiver<Command>, on_consumed: ConsumedCallback, speed: f64) {
    let sample_rate = handle.format().sample_rate as f64;
    let mut clock = HeadClock::default();

    loop {
        let head = handle
            .lock_playout()
            .head_frames()
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate / speed));
        let waited_from = Instant::now();

        match commands.recv_timeout(clock.wait(head)) {
            Ok(Command::Halt {
                reset_position,
                ack,
            }) => {
                let flushed = handle.lock_playout().halt(reset_position);
                clock.reset();
                let _ = ack.send(flushed);
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if !clock.advance(head, waited_from.elapsed()) {
                    continue;
                }
                // Paused since the check: the credit is kept for the resume
                let consumed = handle.lock_playout().take_head();
                if let Some(buffer) = consumed {
                    clock.reset();
                    handle.deliver(&on_consumed, buffer);
                }
            }
        }
    }

    debug!("Null render thread exiting");
}
