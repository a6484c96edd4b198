//! tplay - terminal audio player
//!
//! Opens one file, plays it through the playback engine and drives it from
//! the keyboard while a status line shows the elapsed time.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{Event, EventStream};
use crossterm::terminal;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tplay_common::time::millis_to_duration;
use tplay_common::PlayerEvent;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tplay::config::{ConfigOverrides, LoggingConfig, OutputKind, PlayerConfig};
use tplay::control::keys::KEY_HELP;
use tplay::control::{command_for_key, Command, KeyAction};
use tplay::render::{DeviceRenderService, NullRenderService, RenderService};
use tplay::ui::{format_status, EventLog, StatusLine};
use tplay::PlaybackEngine;

/// Command-line arguments for tplay
#[derive(Parser, Debug)]
#[command(name = "tplay")]
#[command(about = "Terminal audio player")]
#[command(version)]
struct Args {
    /// Audio file to play
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "TPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Number of buffers kept in flight
    #[arg(long, env = "TPLAY_BUFFER_COUNT")]
    buffer_count: Option<usize>,

    /// Milliseconds of audio per buffer
    #[arg(long, env = "TPLAY_BUFFER_MS")]
    buffer_ms: Option<u32>,

    /// Seconds jumped by the arrow keys
    #[arg(long, env = "TPLAY_SEEK_STEP")]
    seek_step: Option<f64>,

    /// Load and prime, but wait for Space to start
    #[arg(long)]
    paused: bool,

    /// Render service
    #[arg(long, value_enum, env = "TPLAY_OUTPUT")]
    output: Option<OutputKind>,

    /// Output device name
    #[arg(long, env = "TPLAY_DEVICE")]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TPLAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "TPLAY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Append player events as JSON lines to this file
    #[arg(long, env = "TPLAY_EVENT_LOG")]
    event_log: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            buffer_count: self.buffer_count,
            buffer_duration_ms: self.buffer_ms,
            seek_step_secs: self.seek_step,
            paused: self.paused,
            output: self.output,
            device: self.device.clone(),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            event_log: self.event_log.clone(),
        }
    }
}

/// Raw terminal mode for the life of the guard
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for name in DeviceRenderService::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = PlayerConfig::load(args.config.as_deref(), &args.overrides())
        .context("Invalid configuration")?;
    init_logging(&config.logging)?;

    let file = args
        .file
        .clone()
        .context("No audio file given")?;
    info!("Starting tplay for {}", file.display());

    let render: Box<dyn RenderService> = match config.output {
        OutputKind::Device => Box::new(DeviceRenderService::new(config.device.clone())),
        OutputKind::Null => Box::new(NullRenderService::new()),
    };

    // Probing, priming and device start-up block; keep them off the runtime threads
    let options = config.engine_options();
    let path = file.clone();
    let engine = tokio::task::spawn_blocking(move || {
        PlaybackEngine::open(&path, &options, render.as_ref())
    })
    .await
    .context("Engine start-up task failed")?
    .with_context(|| format!("Cannot play {}", file.display()))?;

    run(&engine, &config, &file).await?;

    engine.quit()?;
    info!("Exiting");
    Ok(())
}

async fn run(engine: &PlaybackEngine, config: &PlayerConfig, file: &Path) -> Result<()> {
    let mut event_log = match &config.event_log {
        Some(path) => Some(
            EventLog::create(path)
                .with_context(|| format!("Cannot open event log {}", path.display()))?,
        ),
        None => None,
    };

    let mut stdout = std::io::stdout();
    print!("Playing: {}\r\n{}\r\n", file.display(), KEY_HELP);

    let raw_mode = match RawModeGuard::enable() {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("Keyboard control unavailable: {}", e);
            None
        }
    };
    let mut keys = raw_mode.as_ref().map(|_| EventStream::new());

    let mut events = engine.subscribe();
    let mut ticker = tokio::time::interval(millis_to_duration(config.status_interval_ms));
    let mut status = StatusLine::new();

    loop {
        tokio::select! {
            input = next_input(&mut keys) => match input {
                Some(Ok(event)) => match command_for_key(&event, config.seek_step_secs) {
                    KeyAction::Command(command) => {
                        if let Err(e) = engine.apply(command) {
                            debug!("{} ignored: {}", command.name(), e);
                        }
                        if command == Command::Quit {
                            break;
                        }
                    }
                    KeyAction::Redraw => status.invalidate(),
                    KeyAction::Ignore => {}
                },
                Some(Err(e)) => {
                    warn!("Terminal input error: {}", e);
                    keys = None;
                }
                None => keys = None,
            },
            _ = ticker.tick() => {
                engine.publish_position();
                let text = format_status(
                    engine.elapsed_seconds(),
                    engine.duration_seconds(),
                    engine.state(),
                );
                status.draw(&mut stdout, &text)?;
                if engine.is_drained() {
                    break;
                }
            }
            received = events.recv() => match received {
                Ok(event) => {
                    report(&event);
                    if let Some(log) = event_log.as_mut() {
                        log.record(&event)?;
                    }
                }
                Err(RecvError::Lagged(missed)) => debug!("Missed {} player events", missed),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }
    }

    status.finish(&mut stdout)?;
    Ok(())
}

/// Next terminal event; never resolves without a terminal.
async fn next_input(keys: &mut Option<EventStream>) -> Option<std::io::Result<Event>> {
    match keys {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn report(event: &PlayerEvent) {
    match event {
        PlayerEvent::DecodeFailed { packet, reason, .. } => {
            warn!("Decode failed at packet {}: {}", packet, reason)
        }
        PlayerEvent::BufferDropped {
            start_packet,
            reason,
            ..
        } => warn!("Buffer at packet {} dropped: {}", start_packet, reason),
        PlayerEvent::Position { .. } => {}
        other => debug!("Event: {}", other.event_type()),
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    // RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}
