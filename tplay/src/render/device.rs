//! Audio device output using cpal
//!
//! A dedicated render thread owns the cpal stream (streams are not `Send`)
//! for the life of the output. The cpal data callback copies samples out
//! of the shared playout with `try_lock`, outputs silence when the lock is
//! busy, and passes exhausted buffers to the render thread over a channel.
//! The render thread is the only place the consumed callback runs.

use std::sync::{Arc, Mutex, TryLockError};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::output::{Command, OutputHandle, OwnedOutput};
use super::playout::Playout;
use super::{ConsumedCallback, RenderOutput, RenderService};
use crate::audio::{AudioBuffer, PacketGeometry, StreamFormat};
use crate::error::{Error, Result};

/// Opens outputs on a cpal device
#[derive(Debug, Clone, Default)]
pub struct DeviceRenderService {
    /// Device name; `None` uses the host default
    device_name: Option<String>,
}

impl DeviceRenderService {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::RenderService(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl RenderService for DeviceRenderService {
    fn create_output(
        &self,
        format: StreamFormat,
        on_consumed: ConsumedCallback,
    ) -> Result<Box<dyn RenderOutput>> {
        if format.geometry != PacketGeometry::pcm_f32(format.channels) {
            return Err(Error::RenderService(format!(
                "Device output needs interleaved f32 PCM, got {:?}",
                format.geometry
            )));
        }

        let playout = Arc::new(Mutex::new(Playout::new(format.channels)));
        let (commands_tx, commands_rx) = unbounded();
        let handle = OutputHandle::new(format, playout.clone(), commands_tx);
        let (ready_tx, ready_rx) = bounded(1);

        let thread_handle = handle.clone();
        let device_name = self.device_name.clone();
        let thread = thread::Builder::new()
            .name("tplay-render".to_string())
            .spawn(move || {
                run(
                    thread_handle,
                    playout,
                    commands_rx,
                    on_consumed,
                    device_name,
                    ready_tx,
                )
            })
            .map_err(|e| Error::RenderService(format!("Failed to spawn render thread: {}", e)))?;
        handle.attach_thread(thread);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(OwnedOutput::new(handle))),
            Ok(Err(e)) => {
                handle.dispose();
                Err(e)
            }
            Err(_) => {
                handle.dispose();
                Err(Error::RenderService(
                    "Render thread exited during startup".to_string(),
                ))
            }
        }
    }
}

fn run(
    handle: OutputHandle,
    playout: Arc<Mutex<Playout>>,
    commands: Receiver<Command>,
    on_consumed: ConsumedCallback,
    device_name: Option<String>,
    ready: Sender<Result<()>>,
) {
    let (exhausted_tx, exhausted_rx) = unbounded();

    let stream = match open_stream(device_name.as_deref(), handle.format(), playout, exhausted_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    loop {
        select! {
            recv(commands) -> command => match command {
                Ok(Command::Halt { reset_position, ack }) => {
                    let mut flushed = handle.lock_playout().halt(reset_position);
                    // Exhausted before the halt but not yet delivered
                    flushed.extend(exhausted_rx.try_iter());
                    let _ = ack.send(flushed);
                }
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(exhausted_rx) -> buffer => {
                if let Ok(buffer) = buffer {
                    handle.deliver(&on_consumed, buffer);
                }
            }
        }
    }

    if let Err(e) = stream.pause() {
        warn!("Failed to pause stream on shutdown: {}", e);
    }
    drop(stream);
    info!("Audio stream closed");
}

fn find_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::RenderService(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::RenderService("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Pick a sample format the device supports at exactly the stream's rate
/// and channel count, preferring f32.
fn pick_sample_format(device: &Device, format: &StreamFormat) -> Result<SampleFormat> {
    let candidates: Vec<SampleFormat> = device
        .supported_output_configs()
        .map_err(|e| Error::RenderService(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() == format.channels
                && c.min_sample_rate().0 <= format.sample_rate
                && c.max_sample_rate().0 >= format.sample_rate
        })
        .map(|c| c.sample_format())
        .collect();

    [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16]
        .into_iter()
        .find(|f| candidates.contains(f))
        .ok_or_else(|| {
            Error::RenderService(format!(
                "Device does not support {} Hz with {} channels",
                format.sample_rate, format.channels
            ))
        })
}

fn open_stream(
    device_name: Option<&str>,
    format: StreamFormat,
    playout: Arc<Mutex<Playout>>,
    exhausted: Sender<AudioBuffer>,
) -> Result<Stream> {
    let device = find_device(device_name)?;
    let sample_format = pick_sample_format(&device, &format)?;
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, playout, exhausted, |s| s)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, playout, exhausted, |s| {
            (s * i16::MAX as f32) as i16
        })?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, playout, exhausted, |s| {
            // [-1.0, 1.0] to [0, 65535]
            ((s + 1.0) * 32767.5) as u16
        })?,
        other => {
            return Err(Error::RenderService(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::RenderService(format!("Failed to start stream: {}", e)))?;
    info!("Audio stream started");
    Ok(stream)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    playout: Arc<Mutex<Playout>>,
    exhausted: Sender<AudioBuffer>,
    convert: fn(f32) -> T,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Copy + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                write_samples(data, &playout, &exhausted, convert);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::RenderService(format!("Failed to build stream: {}", e)))
}

fn write_samples<T: Copy>(
    data: &mut [T],
    playout: &Mutex<Playout>,
    exhausted: &Sender<AudioBuffer>,
    convert: fn(f32) -> T,
) {
    let silence = convert(0.0);
    let mut playout = match playout.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => {
            data.fill(silence);
            return;
        }
    };

    let mut hand_back = |buffer: AudioBuffer| {
        let _ = exhausted.send(buffer);
    };
    for out in data.iter_mut() {
        *out = match playout.next_sample(&mut hand_back) {
            Some(sample) => convert(sample.clamp(-1.0, 1.0)),
            None => silence,
        };
    }
}
