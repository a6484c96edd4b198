//! Output handle shared by the render implementations
//!
//! Both outputs run a render thread that owns consumption and invokes the
//! consumed callback. Blocking halts are commands to that thread, so once
//! one is acknowledged no callback can be in flight.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{JoinHandle, ThreadId};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, warn};

use super::playout::Playout;
use super::{ConsumedCallback, Rejected, RenderOutput};
use crate::audio::{AudioBuffer, StreamFormat};
use crate::error::{Error, Result};

/// Requests processed by a render thread
pub(crate) enum Command {
    /// Stop rendering, flush, and send the flushed buffers back
    Halt {
        reset_position: bool,
        ack: Sender<Vec<AudioBuffer>>,
    },
    Shutdown,
}

struct OutputCore {
    format: StreamFormat,
    playout: Arc<Mutex<Playout>>,
    commands: Sender<Command>,
    render_thread: Mutex<Option<JoinHandle<()>>>,
    render_thread_id: OnceLock<ThreadId>,
}

/// Cloneable handle to one output; the render thread holds a clone
#[derive(Clone)]
pub(crate) struct OutputHandle {
    core: Arc<OutputCore>,
}

impl OutputHandle {
    pub(crate) fn new(
        format: StreamFormat,
        playout: Arc<Mutex<Playout>>,
        commands: Sender<Command>,
    ) -> Self {
        Self {
            core: Arc::new(OutputCore {
                format,
                playout,
                commands,
                render_thread: Mutex::new(None),
                render_thread_id: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn attach_thread(&self, thread: JoinHandle<()>) {
        let _ = self.core.render_thread_id.set(thread.thread().id());
        *self
            .core
            .render_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(thread);
    }

    pub(crate) fn lock_playout(&self) -> MutexGuard<'_, Playout> {
        lock_playout(&self.core.playout)
    }

    /// Hand a consumed buffer to the callback. Render thread only.
    pub(crate) fn deliver(&self, on_consumed: &ConsumedCallback, buffer: AudioBuffer) {
        on_consumed(self, buffer);
    }

    fn on_render_thread(&self) -> bool {
        self.core.render_thread_id.get() == Some(&std::thread::current().id())
    }

    fn halt(&self, reset_position: bool) -> Result<Vec<AudioBuffer>> {
        if self.on_render_thread() {
            return Ok(self.lock_playout().halt(reset_position));
        }

        let (ack_tx, ack_rx) = bounded(1);
        let sent = self.core.commands.send(Command::Halt {
            reset_position,
            ack: ack_tx,
        });
        if sent.is_err() {
            // Render thread already gone: nothing can consume concurrently
            return Ok(self.lock_playout().halt(reset_position));
        }

        ack_rx
            .recv()
            .map_err(|_| Error::RenderService("Render thread exited during halt".to_string()))
    }
}

fn lock_playout(playout: &Mutex<Playout>) -> MutexGuard<'_, Playout> {
    playout.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderOutput for OutputHandle {
    fn format(&self) -> StreamFormat {
        self.core.format
    }

    fn enqueue(&self, buffer: AudioBuffer) -> std::result::Result<(), Rejected> {
        if buffer.is_empty() {
            return Err(Rejected {
                reason: format!("Buffer for slot {} holds no packets", buffer.slot()),
                buffer,
            });
        }
        self.lock_playout().push(buffer).map_err(|buffer| Rejected {
            buffer,
            reason: "Output is disposed".to_string(),
        })
    }

    fn start(&self) -> Result<()> {
        let mut playout = self.lock_playout();
        if playout.is_closed() {
            return Err(Error::RenderService("Output is disposed".to_string()));
        }
        playout.start();
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.lock_playout().pause();
        Ok(())
    }

    fn stop(&self, immediate: bool) -> Result<Vec<AudioBuffer>> {
        if immediate {
            self.halt(false)
        } else {
            self.lock_playout().drain();
            Ok(Vec::new())
        }
    }

    fn reset(&self) -> Result<Vec<AudioBuffer>> {
        self.halt(true)
    }

    fn current_position(&self) -> u64 {
        self.lock_playout().frames_rendered()
    }

    fn is_idle(&self) -> bool {
        self.lock_playout().is_idle()
    }

    fn dispose(&self) {
        self.lock_playout().close();

        let thread = self
            .core
            .render_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(thread) = thread else {
            return;
        };

        let _ = self.core.commands.send(Command::Shutdown);
        if self.on_render_thread() {
            // Cannot join ourselves; the thread exits after this callback
            return;
        }
        if thread.join().is_err() {
            warn!("Render thread panicked");
        }
        debug!("Render thread joined");
    }
}

/// The engine-facing output: disposes the render thread on drop
pub(crate) struct OwnedOutput {
    handle: OutputHandle,
}

impl OwnedOutput {
    pub(crate) fn new(handle: OutputHandle) -> Self {
        Self { handle }
    }
}

impl Drop for OwnedOutput {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

impl RenderOutput for OwnedOutput {
    fn format(&self) -> StreamFormat {
        self.handle.format()
    }

    fn allocate_buffer(
        &self,
        slot: usize,
        capacity_bytes: usize,
        max_descriptions: usize,
    ) -> Result<AudioBuffer> {
        self.handle
            .allocate_buffer(slot, capacity_bytes, max_descriptions)
    }

    fn enqueue(&self, buffer: AudioBuffer) -> std::result::Result<(), Rejected> {
        self.handle.enqueue(buffer)
    }

    fn start(&self) -> Result<()> {
        self.handle.start()
    }

    fn pause(&self) -> Result<()> {
        self.handle.pause()
    }

    fn stop(&self, immediate: bool) -> Result<Vec<AudioBuffer>> {
        self.handle.stop(immediate)
    }

    fn reset(&self) -> Result<Vec<AudioBuffer>> {
        self.handle.reset()
    }

    fn current_position(&self) -> u64 {
        self.handle.current_position()
    }

    fn is_idle(&self) -> bool {
        self.handle.is_idle()
    }

    fn dispose(&self) {
        self.handle.dispose()
    }
}
