//! JSON-lines event log
//!
//! One [`PlayerEvent`] per line, appended as events arrive, for scripting
//! and post-mortem inspection.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tplay_common::PlayerEvent;

use crate::error::{Error, Result};

pub struct EventLog {
    writer: BufWriter<File>,
}

impl EventLog {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, event: &PlayerEvent) -> Result<()> {
        let line = event
            .to_json_line()
            .map_err(|e| Error::Config(format!("Cannot serialize event: {}", e)))?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}
