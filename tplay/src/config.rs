//! Configuration for the tplay player
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (and their `TPLAY_*` environment fallbacks)
//! 2. TOML configuration file (`--config`, `TPLAY_CONFIG`, or the user
//!    config dir)
//! 3. Built-in defaults
//!
//! Example file:
//!
//! ```toml
//! buffer_count = 3
//! buffer_duration_ms = 100
//! seek_step_secs = 5.0
//! initial_state = "playing"
//! output = "device"
//!
//! [logging]
//! level = "info"
//! file = "/tmp/tplay.log"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tplay_common::config::{load_or_default, resolve_config_file};
use tplay_common::TransportState;
use tracing::info;

use crate::error::{Error, Result};
use crate::playback::EngineOptions;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "TPLAY_CONFIG";

/// Smallest accepted status refresh interval
const MIN_STATUS_INTERVAL_MS: u64 = 10;

/// Which render service to play through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// System audio device (cpal)
    Device,
    /// No audio; buffers consumed in real time
    Null,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs go to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Player configuration, as read from the TOML file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlayerConfig {
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,

    /// Audio held by each buffer
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u32,

    /// Seconds jumped by one seek key press
    #[serde(default = "default_seek_step_secs")]
    pub seek_step_secs: f64,

    /// Status line refresh period
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// `playing` or `paused`
    #[serde(default = "default_initial_state")]
    pub initial_state: TransportState,

    #[serde(default = "default_output")]
    pub output: OutputKind,

    /// Output device name (default device if not specified)
    #[serde(default)]
    pub device: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Write every player event as a JSON line to this file
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

fn default_buffer_count() -> usize {
    3
}

fn default_buffer_duration_ms() -> u32 {
    100
}

fn default_seek_step_secs() -> f64 {
    5.0
}

fn default_status_interval_ms() -> u64 {
    100
}

fn default_initial_state() -> TransportState {
    TransportState::Playing
}

fn default_output() -> OutputKind {
    OutputKind::Device
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_count: default_buffer_count(),
            buffer_duration_ms: default_buffer_duration_ms(),
            seek_step_secs: default_seek_step_secs(),
            status_interval_ms: default_status_interval_ms(),
            initial_state: default_initial_state(),
            output: default_output(),
            device: None,
            logging: LoggingConfig::default(),
            event_log: None,
        }
    }
}

/// Values given on the command line; `None` keeps the file/default value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub buffer_count: Option<usize>,
    pub buffer_duration_ms: Option<u32>,
    pub seek_step_secs: Option<f64>,
    pub paused: bool,
    pub output: Option<OutputKind>,
    pub device: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
}

impl PlayerConfig {
    /// Load the config file (if any), apply overrides, and validate.
    ///
    /// # Errors
    /// [`Error::Config`] if an explicitly named file is missing, the file
    /// does not parse, or a value is out of range.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let source = resolve_config_file(config_path, CONFIG_ENV_VAR);
        let mut config: PlayerConfig = load_or_default(source.as_ref())?;
        if let Some(source) = &source {
            info!("Using config file {}", source.path().display());
        }

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(count) = overrides.buffer_count {
            self.buffer_count = count;
        }
        if let Some(ms) = overrides.buffer_duration_ms {
            self.buffer_duration_ms = ms;
        }
        if let Some(step) = overrides.seek_step_secs {
            self.seek_step_secs = step;
        }
        if overrides.paused {
            self.initial_state = TransportState::Paused;
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if let Some(device) = &overrides.device {
            self.device = Some(device.clone());
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(file) = &overrides.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(path) = &overrides.event_log {
            self.event_log = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(Error::Config("buffer_count must be at least 1".to_string()));
        }
        if self.buffer_duration_ms == 0 {
            return Err(Error::Config(
                "buffer_duration_ms must be at least 1".to_string(),
            ));
        }
        if !(self.seek_step_secs.is_finite() && self.seek_step_secs > 0.0) {
            return Err(Error::Config(format!(
                "seek_step_secs must be positive, got {}",
                self.seek_step_secs
            )));
        }
        if self.status_interval_ms < MIN_STATUS_INTERVAL_MS {
            return Err(Error::Config(format!(
                "status_interval_ms must be at least {}",
                MIN_STATUS_INTERVAL_MS
            )));
        }
        if self.initial_state.is_terminal() {
            return Err(Error::Config(format!(
                "initial_state must be playing or paused, got {}",
                self.initial_state
            )));
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            buffer_count: self.buffer_count,
            buffer_duration_ms: self.buffer_duration_ms,
            initial_state: self.initial_state,
        }
    }
}
