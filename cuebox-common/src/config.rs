//! Engine configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/cuebox/config.toml`)
//! 4. Compiled defaults (fallback)

use crate::device::{DeviceDescriptor, DeviceKind, ShareMode};
use crate::format::WaveFormat;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default device latency in milliseconds
pub const DEFAULT_LATENCY_MS: u32 = 200;

/// Engine configuration as stored in `config.toml`.
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device_kind: DeviceKind,
    /// Empty selects the host default device
    pub device_id: String,
    pub device_name: String,
    /// Output rate; `None` adopts the device default
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub share_mode: ShareMode,
    pub latency_ms: u32,
    /// Fan volume scaling out over worker threads
    pub parallel: bool,
    pub master_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_kind: DeviceKind::System,
            device_id: String::new(),
            device_name: "System default".to_string(),
            sample_rate: None,
            channels: None,
            share_mode: ShareMode::Shared,
            latency_ms: DEFAULT_LATENCY_MS,
            parallel: false,
            master_volume: 1.0,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.latency_ms == 0 {
            return Err(Error::Config("latency_ms must be positive".to_string()));
        }
        if self.sample_rate.is_some() != self.channels.is_some() {
            return Err(Error::Config(
                "sample_rate and channels must be given together".to_string(),
            ));
        }
        self.wave_format()?;
        Ok(())
    }

    /// Explicit output format, if both fields are set
    pub fn wave_format(&self) -> Result<Option<WaveFormat>> {
        match (self.sample_rate, self.channels) {
            (Some(rate), Some(channels)) => WaveFormat::new(rate, channels).map(Some),
            _ => Ok(None),
        }
    }

    pub fn device(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(
            self.device_kind.clone(),
            self.device_id.clone(),
            self.device_name.clone(),
        )
    }
}

/// Resolve and load the engine configuration.
///
/// A path given on the command line or through `env_var_name` must exist; the
/// platform default file is optional.
pub fn resolve_config(cli_path: Option<&Path>, env_var_name: &str) -> Result<EngineConfig> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        info!("Using configuration file from command line: {}", path.display());
        return EngineConfig::load(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        let path = PathBuf::from(path);
        info!("Using configuration file from {}: {}", env_var_name, path.display());
        return EngineConfig::load(&path);
    }

    // Priority 3: Platform config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            info!("Using configuration file: {}", path.display());
            return EngineConfig::load(&path);
        }
    }

    // Priority 4: Compiled defaults
    debug!("No configuration file found, using defaults");
    Ok(EngineConfig::default())
}

/// Platform configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cuebox").join("config.toml"))
}
