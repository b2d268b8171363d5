//! Playback engine
//!
//! Owns the output binding, the mixer inputs and the master volume, and drives
//! the lifecycle state machine:
//!
//! ```text
//! Created --init--> Initialized
//! {Initialized, Stopped, Paused} --start--> Started
//! {Started, Paused} --stop--> Stopped
//! Started --pause--> Paused
//! any --dispose--> Disposed
//! ```
//!
//! Every other transition is a no-op. Lifecycle methods take the write side of
//! one `RwLock`; `play()` only takes the read side, and the output callback
//! never touches it.

use crate::audio::asset::AudioAsset;
use crate::audio::output::{OfflineRenderer, OutputBinding, OutputRequest};
use crate::error::{Error, Result};
use crate::playback::handle::{PlayMode, PlaybackHandle};
use crate::playback::mixer::MixerInputs;
use crate::playback::source::{CachedSampleSource, ChannelMap, SampleSource, StreamingSampleSource};
use crate::playback::volume::MasterVolume;
use cuebox_common::{DeviceDescriptor, EngineConfig, ShareMode, WaveFormat};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default device latency
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(200);

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Initialized,
    Started,
    Paused,
    Stopped,
    /// Terminal
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Created => "created",
            EngineState::Initialized => "initialized",
            EngineState::Started => "started",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
            EngineState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Construction parameters for [`PlaybackEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub device: DeviceDescriptor,
    /// Output format; `None` adopts the device default
    pub format: Option<WaveFormat>,
    pub share_mode: ShareMode,
    pub latency: Duration,
    /// Fan volume scaling out over rayon workers
    pub parallel: bool,
    /// Initial master volume, clamped to [0, 1]
    pub master_volume: f32,
}

impl EngineOptions {
    pub fn new(device: DeviceDescriptor) -> Self {
        Self {
            device,
            format: None,
            share_mode: ShareMode::Shared,
            latency: DEFAULT_LATENCY,
            parallel: false,
            master_volume: 1.0,
        }
    }

    /// Options described by a loaded configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            device: config.device(),
            format: config.wave_format()?,
            share_mode: config.share_mode,
            latency: Duration::from_millis(config.latency_ms as u64),
            parallel: config.parallel,
            master_volume: config.master_volume,
        })
    }

    pub fn format(mut self, format: WaveFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn share_mode(mut self, share_mode: ShareMode) -> Self {
        self.share_mode = share_mode;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

struct EngineInner {
    state: EngineState,
    binding: Option<OutputBinding>,
    inputs: Option<MixerInputs>,
    format: Option<WaveFormat>,
}

/// Real-time playback engine.
///
/// Safe to share between threads behind an `Arc`; all methods take `&self`.
pub struct PlaybackEngine {
    options: EngineOptions,
    master_volume: Arc<MasterVolume>,
    inner: RwLock<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(options: EngineOptions) -> Self {
        let master_volume = Arc::new(MasterVolume::new(options.master_volume));
        Self {
            options,
            master_volume,
            inner: RwLock::new(EngineInner {
                state: EngineState::Created,
                binding: None,
                inputs: None,
                format: None,
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.read().state
    }

    /// Negotiated output format, once initialized
    pub fn format(&self) -> Option<WaveFormat> {
        self.inner.read().format
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.options.device
    }

    /// Bind the output device.
    ///
    /// No-op unless the engine is `Created`. On failure the engine stays
    /// `Created` and `init()` may be retried.
    pub fn init(&self) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.state {
            EngineState::Disposed => Err(Error::Disposed),
            EngineState::Created => self.init_locked(&mut inner),
            _ => Ok(()),
        }
    }

    fn init_locked(&self, inner: &mut EngineInner) -> Result<()> {
        let request = OutputRequest {
            format: self.options.format,
            share_mode: self.options.share_mode,
            latency: self.options.latency,
        };

        // A failed open drops whatever it had bound so far
        let (binding, inputs) = OutputBinding::open(&self.options.device, &request).map_err(|e| {
            warn!("Failed to bind {}: {}", self.options.device, e);
            e
        })?;

        let format = binding.format();
        info!("Engine initialized on {} at {}", binding.device_name(), format);

        inner.format = Some(format);
        inner.binding = Some(binding);
        inner.inputs = Some(inputs);
        inner.state = EngineState::Initialized;
        Ok(())
    }

    /// Start or resume output, initializing first if needed.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state == EngineState::Disposed {
            return Err(Error::Disposed);
        }
        if inner.state == EngineState::Created {
            self.init_locked(&mut inner)?;
        }

        match inner.state {
            EngineState::Initialized | EngineState::Stopped | EngineState::Paused => {
                if let Some(binding) = inner.binding.as_ref() {
                    binding.play()?;
                }
                debug!("Engine {} -> started", inner.state);
                inner.state = EngineState::Started;
            }
            _ => {}
        }
        Ok(())
    }

    /// Stop output; registered sources are kept and resume on `start()`.
    pub fn stop(&self) -> Result<()> {
        self.halt(EngineState::Stopped, &[EngineState::Started, EngineState::Paused])
    }

    pub fn pause(&self) -> Result<()> {
        self.halt(EngineState::Paused, &[EngineState::Started])
    }

    fn halt(&self, target: EngineState, from: &[EngineState]) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state == EngineState::Disposed {
            return Err(Error::Disposed);
        }
        if !from.contains(&inner.state) {
            debug!("Ignoring {} request while {}", target, inner.state);
            return Ok(());
        }
        if let Some(binding) = inner.binding.as_ref() {
            binding.pause()?;
        }
        debug!("Engine {} -> {}", inner.state, target);
        inner.state = target;
        Ok(())
    }

    /// Start playing `asset` and return its handle.
    ///
    /// # Errors
    /// - `Error::Disposed` after `dispose()`
    /// - `Error::EngineNotRunning` unless started or paused
    /// - `Error::SampleRateMismatch` if the asset rate differs from the output
    /// - `Error::ChannelMismatch` if the channel layouts cannot be mapped
    pub fn play(&self, asset: &Arc<AudioAsset>, mode: PlayMode) -> Result<PlaybackHandle> {
        let inner = self.inner.read();
        match inner.state {
            EngineState::Disposed => return Err(Error::Disposed),
            EngineState::Started | EngineState::Paused => {}
            state => return Err(Error::EngineNotRunning(state.to_string())),
        }

        let (Some(format), Some(inputs)) = (inner.format, inner.inputs.as_ref()) else {
            return Err(Error::EngineNotRunning(inner.state.to_string()));
        };

        if asset.sample_rate() != format.sample_rate() {
            return Err(Error::SampleRateMismatch {
                asset: asset.sample_rate(),
                engine: format.sample_rate(),
            });
        }

        let handle = PlaybackHandle::new(mode);
        let master = Arc::clone(&self.master_volume);
        let parallel = self.options.parallel;

        let mut source: Box<dyn SampleSource> = if asset.is_cached() {
            Box::new(CachedSampleSource::new(Arc::clone(asset), handle.clone(), master, parallel))
        } else {
            Box::new(StreamingSampleSource::new(Arc::clone(asset), handle.clone(), master, parallel))
        };

        if asset.channels() != format.channels() {
            source = Box::new(ChannelMap::new(source, format)?);
        }

        inputs.add(source)?;
        debug!(
            "Playback {} started: {} ({:?})",
            handle.id(),
            asset.path().display(),
            mode
        );
        Ok(handle)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.get()
    }

    /// Set the master volume, clamped to [0, 1]; takes effect on the next buffer
    pub fn set_master_volume(&self, volume: f32) {
        let stored = self.master_volume.set(volume);
        debug!("Master volume set to {:.2}", stored);
    }

    /// Sources registered with the mixer and not yet retired
    pub fn active_sources(&self) -> usize {
        self.inner
            .read()
            .inputs
            .as_ref()
            .map_or(0, |inputs| inputs.active_count())
    }

    /// Manual pull handle, for engines bound to the offline device
    pub fn offline_output(&self) -> Option<OfflineRenderer> {
        match self.inner.read().binding.as_ref() {
            Some(OutputBinding::Offline(output)) => Some(output.renderer()),
            _ => None,
        }
    }

    /// True if the device reported a stream error
    pub fn has_device_error(&self) -> bool {
        self.inner
            .read()
            .binding
            .as_ref()
            .map_or(false, |binding| binding.has_error())
    }

    /// Release the device and every playing source. Idempotent.
    pub fn dispose(&self) {
        let mut inner = self.inner.write();
        if inner.state == EngineState::Disposed {
            return;
        }

        if let Some(inputs) = inner.inputs.take() {
            inputs.close();
        }
        if let Some(binding) = inner.binding.take() {
            if binding.has_error() {
                warn!("{} reported {} stream errors", binding.device_name(), binding.error_count());
            }
            if let Err(e) = binding.pause() {
                warn!("Failed to pause output during dispose: {}", e);
            }
            drop(binding);
        }
        inner.state = EngineState::Disposed;
        info!("Engine disposed");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
