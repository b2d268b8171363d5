//! Audio output binding
//!
//! Binds a mixer to an output. Hardware devices go through cpal; the offline
//! output has no device and is pulled by the caller, for rendering to memory
//! and for tests.
//!
//! A `cpal::Stream` cannot be moved between threads on every platform, so each
//! hardware binding runs a dedicated output thread that builds the stream,
//! reports the negotiated format back, and then serves play/pause/close
//! commands over a channel. Dropping the binding closes the stream and joins
//! the thread.

use crate::error::{Error, Result};
use crate::playback::mixer::{self, Mixer, MixerInputs};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use cuebox_common::{DeviceDescriptor, DeviceKind, ShareMode, WaveFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Format used by the offline output when none is requested
pub const OFFLINE_DEFAULT_RATE: u32 = 48000;
pub const OFFLINE_DEFAULT_CHANNELS: u16 = 2;

/// How the caller wants the output opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRequest {
    /// Exact format to negotiate; `None` adopts the device default
    pub format: Option<WaveFormat>,
    pub share_mode: ShareMode,
    /// Buffer length requested in exclusive mode
    pub latency: Duration,
}

/// A mixer bound to an output.
pub enum OutputBinding {
    Cpal(CpalOutput),
    Offline(OfflineOutput),
}

impl OutputBinding {
    /// Bind to `device` and return the binding together with the mixer inputs.
    ///
    /// # Errors
    /// - `Error::UnsupportedDeviceType` for a kind outside the known set
    /// - `Error::DeviceBind` if the host, device or format is unavailable
    pub fn open(device: &DeviceDescriptor, request: &OutputRequest) -> Result<(Self, MixerInputs)> {
        match &device.kind {
            DeviceKind::Offline => {
                let (output, inputs) = OfflineOutput::open(request.format)?;
                Ok((OutputBinding::Offline(output), inputs))
            }
            DeviceKind::System | DeviceKind::Jack | DeviceKind::Asio => {
                let (output, inputs) = CpalOutput::open(device, request)?;
                Ok((OutputBinding::Cpal(output), inputs))
            }
            DeviceKind::Unrecognized(kind) => Err(Error::UnsupportedDeviceType(kind.clone())),
        }
    }

    /// Format the mixer runs at
    pub fn format(&self) -> WaveFormat {
        match self {
            OutputBinding::Cpal(output) => output.format(),
            OutputBinding::Offline(output) => output.format(),
        }
    }

    pub fn device_name(&self) -> &str {
        match self {
            OutputBinding::Cpal(output) => output.device_name(),
            OutputBinding::Offline(_) => "offline",
        }
    }

    /// Begin or resume pulling the mixer
    pub fn play(&self) -> Result<()> {
        match self {
            OutputBinding::Cpal(output) => output.play(),
            OutputBinding::Offline(output) => {
                output.set_running(true);
                Ok(())
            }
        }
    }

    /// Stop pulling the mixer; the device outputs silence meanwhile
    pub fn pause(&self) -> Result<()> {
        match self {
            OutputBinding::Cpal(output) => output.pause(),
            OutputBinding::Offline(output) => {
                output.set_running(false);
                Ok(())
            }
        }
    }

    /// True if the stream reported an error since it was opened
    pub fn has_error(&self) -> bool {
        match self {
            OutputBinding::Cpal(output) => output.has_error(),
            OutputBinding::Offline(_) => false,
        }
    }

    /// Stream errors reported since the device was opened
    pub fn error_count(&self) -> u32 {
        match self {
            OutputBinding::Cpal(output) => output.error_count(),
            OutputBinding::Offline(_) => 0,
        }
    }
}

/// Commands served by the output thread
enum DeviceCommand {
    Play(Sender<Result<()>>),
    Pause(Sender<Result<()>>),
    Close,
}

/// What the output thread reports once the stream is built
struct Bound {
    format: WaveFormat,
    device_name: String,
    inputs: MixerInputs,
}

/// Hardware output through cpal.
pub struct CpalOutput {
    commands: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
    format: WaveFormat,
    device_name: String,

    /// Stream error flag, set by the error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalOutput {
    fn open(device: &DeviceDescriptor, request: &OutputRequest) -> Result<(Self, MixerInputs)> {
        let (init_tx, init_rx) = crossbeam_channel::bounded(1);
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::new(AtomicU32::new(0));

        let setup = DeviceSetup {
            device: device.clone(),
            request: *request,
            error_flag: Arc::clone(&error_flag),
            error_count: Arc::clone(&error_count),
        };

        let thread = std::thread::Builder::new()
            .name("cuebox-output".to_string())
            .spawn(move || run_output_thread(setup, init_tx, cmd_rx))?;

        let bound = match init_rx.recv() {
            Ok(Ok(bound)) => bound,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::DeviceBind(
                    "output thread exited during initialization".to_string(),
                ));
            }
        };

        info!("Bound output {} at {}", bound.device_name, bound.format);

        Ok((
            Self {
                commands: cmd_tx,
                thread: Some(thread),
                format: bound.format,
                device_name: bound.device_name,
                error_flag,
                error_count,
            },
            bound.inputs,
        ))
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn play(&self) -> Result<()> {
        self.request(DeviceCommand::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.request(DeviceCommand::Pause)
    }

    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn request(&self, command: fn(Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| Error::Output("output thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Output("output thread did not reply".to_string()))?
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCommand::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
        debug!("Released output {}", self.device_name);
    }
}

struct DeviceSetup {
    device: DeviceDescriptor,
    request: OutputRequest,
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

fn run_output_thread(
    setup: DeviceSetup,
    init: Sender<Result<Bound>>,
    commands: Receiver<DeviceCommand>,
) {
    let (stream, bound) = match build_output(&setup) {
        Ok(built) => built,
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };
    if init.send(Ok(bound)).is_err() {
        return;
    }

    for command in commands.iter() {
        match command {
            DeviceCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::Output(format!("Failed to start stream: {}", e)));
                let _ = reply.send(result);
            }
            DeviceCommand::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| Error::Output(format!("Failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            DeviceCommand::Close => break,
        }
    }

    // Dropping the stream drops the mixer and every source it still holds
    drop(stream);
    debug!("Output thread exiting");
}

fn build_output(setup: &DeviceSetup) -> Result<(cpal::Stream, Bound)> {
    let host = select_host(&setup.device.kind)?;
    let device = select_device(&host, &setup.device)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (mut config, sample_format) = negotiate_config(&device, setup.request.format)?;
    let format = WaveFormat::new(config.sample_rate.0, config.channels)?;

    if setup.request.share_mode == ShareMode::Exclusive {
        let frames = (setup.request.latency.as_secs_f64() * format.sample_rate() as f64).round() as u32;
        config.buffer_size = cpal::BufferSize::Fixed(frames.max(1));
        debug!("Using fixed buffer of {} frames", frames);
    } else {
        debug!("Using device default buffer size");
    }

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        config.sample_rate.0, config.channels, sample_format, config.buffer_size
    );

    let (inputs, mixer) = mixer::mixer(format);
    let flags = (Arc::clone(&setup.error_flag), Arc::clone(&setup.error_count));

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, flags)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, flags)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, flags)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer, flags)?,
        sample_format => {
            return Err(Error::DeviceBind(format!(
                "Unsupported sample format: {:?}",
                sample_format
            )));
        }
    };

    // Streams may start running as soon as they are built
    stream
        .pause()
        .map_err(|e| Error::DeviceBind(format!("Failed to pause new stream: {}", e)))?;

    Ok((
        stream,
        Bound {
            format,
            device_name,
            inputs,
        },
    ))
}

fn select_host(kind: &DeviceKind) -> Result<cpal::Host> {
    let wanted = match kind {
        DeviceKind::System => return Ok(cpal::default_host()),
        DeviceKind::Jack => "JACK",
        DeviceKind::Asio => "ASIO",
        other => return Err(Error::UnsupportedDeviceType(other.to_string())),
    };

    let id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| Error::DeviceBind(format!("{} host is not available", wanted)))?;

    cpal::host_from_id(id).map_err(|e| Error::DeviceBind(format!("Failed to open {} host: {}", wanted, e)))
}

fn select_device(host: &cpal::Host, descriptor: &DeviceDescriptor) -> Result<cpal::Device> {
    if descriptor.is_default() {
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceBind("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        return Ok(device);
    }

    let mut devices = host
        .output_devices()
        .map_err(|e| Error::DeviceBind(format!("Failed to enumerate devices: {}", e)))?;

    devices
        .find(|d| d.name().ok().as_deref() == Some(descriptor.native_id.as_str()))
        .ok_or_else(|| Error::DeviceBind(format!("Device '{}' not found", descriptor.native_id)))
}

/// Pick a stream config for `requested`, preferring f32 samples.
fn negotiate_config(device: &cpal::Device, requested: Option<WaveFormat>) -> Result<(StreamConfig, SampleFormat)> {
    let Some(format) = requested else {
        let supported = device
            .default_output_config()
            .map_err(|e| Error::DeviceBind(format!("Failed to get default config: {}", e)))?;
        return Ok((supported.config(), supported.sample_format()));
    };

    let candidates: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceBind(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() == format.channels()
                && c.min_sample_rate().0 <= format.sample_rate()
                && c.max_sample_rate().0 >= format.sample_rate()
        })
        .collect();

    let chosen = candidates
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32)
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| Error::DeviceBind(format!("Device does not support {}", format)))?;

    let sample_format = chosen.sample_format();
    let config = chosen.with_sample_rate(cpal::SampleRate(format.sample_rate())).config();
    Ok((config, sample_format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: Mixer,
    (error_flag, error_count): (Arc<AtomicBool>, Arc<AtomicU32>),
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let mixed = &mut scratch[..data.len()];
                mixer.mix(mixed);
                for (out, &sample) in data.iter_mut().zip(mixed.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
                error_count.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::DeviceBind(format!("Failed to build stream: {}", e)))
}

/// Output with no device behind it.
///
/// The mixer only advances when [`OfflineRenderer::render`] is called.
pub struct OfflineOutput {
    format: WaveFormat,
    mixer: Arc<Mutex<Mixer>>,
    running: Arc<AtomicBool>,
}

impl OfflineOutput {
    fn open(format: Option<WaveFormat>) -> Result<(Self, MixerInputs)> {
        let format = match format {
            Some(format) => format,
            None => WaveFormat::new(OFFLINE_DEFAULT_RATE, OFFLINE_DEFAULT_CHANNELS)?,
        };
        let (inputs, mixer) = mixer::mixer(format);
        debug!("Opened offline output at {}", format);
        Ok((
            Self {
                format,
                mixer: Arc::new(Mutex::new(mixer)),
                running: Arc::new(AtomicBool::new(false)),
            },
            inputs,
        ))
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn renderer(&self) -> OfflineRenderer {
        OfflineRenderer {
            format: self.format,
            mixer: Arc::clone(&self.mixer),
            running: Arc::clone(&self.running),
        }
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

/// Pull handle for an offline output; clones share one mixer.
#[derive(Clone)]
pub struct OfflineRenderer {
    format: WaveFormat,
    mixer: Arc<Mutex<Mixer>>,
    running: Arc<AtomicBool>,
}

impl OfflineRenderer {
    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Render the next `out.len()` samples as the device would receive them.
    ///
    /// Outputs silence while the engine is not started.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if !self.running.load(Ordering::Acquire) {
            out.fill(0.0);
            return out.len();
        }
        let written = self.mixer.lock().mix(out);
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        written
    }
}

impl PartialEq for OfflineRenderer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mixer, &other.mixer)
    }
}

impl std::fmt::Debug for OfflineRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRenderer")
            .field("format", &self.format)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

/// Enumerate output devices of one backend.
pub fn list_devices(kind: &DeviceKind) -> Result<Vec<DeviceDescriptor>> {
    if *kind == DeviceKind::Offline {
        return Ok(vec![DeviceDescriptor::offline()]);
    }

    let host = select_host(kind)?;
    let devices: Vec<DeviceDescriptor> = host
        .output_devices()
        .map_err(|e| Error::DeviceBind(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| match device.name() {
            Ok(name) => Some(DeviceDescriptor::new(kind.clone(), name.clone(), name)),
            Err(e) => {
                warn!("Skipping device without a name: {}", e);
                None
            }
        })
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}
