//! Single-line playback status
//!
//! `A: 00:01:05 / 00:03:20 (32%)`, redrawn in place on a timer.

use std::io::Write;

use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use tplay_common::time::{format_clock, progress_percent};
use tplay_common::TransportState;

/// Render the status text for a position.
pub fn format_status(elapsed: f64, total: f64, state: TransportState) -> String {
    let line = format!(
        "A: {} / {} ({:.0}%)",
        format_clock(elapsed),
        format_clock(total),
        progress_percent(elapsed, total).floor()
    );
    match state {
        TransportState::Playing => line,
        other => format!("{} [{}]", line, other),
    }
}

/// Redraws the status line only when its text changes
#[derive(Debug, Default)]
pub struct StatusLine {
    last: Option<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `text` over the current line. Returns whether anything was
    /// written.
    pub fn draw<W: Write>(&mut self, out: &mut W, text: &str) -> std::io::Result<bool> {
        if self.last.as_deref() == Some(text) {
            return Ok(false);
        }
        queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(text))?;
        out.flush()?;
        self.last = Some(text.to_string());
        Ok(true)
    }

    /// Forget the last text so the next draw repaints.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Move past the status line before exiting.
    pub fn finish<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        out.queue(Print("\r\n"))?;
        out.flush()
    }
}
