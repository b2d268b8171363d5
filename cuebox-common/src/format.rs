//! Wave format descriptor
//!
//! All processing inside cuebox happens on interleaved 32-bit float PCM, so a
//! format is fully described by its sample rate and channel count.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sample rate / channel count pair.
///
/// Immutable once constructed; equality is used to decide whether an asset can
/// be mixed into an engine without conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWaveFormat")]
pub struct WaveFormat {
    sample_rate: u32,
    channels: u16,
}

#[derive(Deserialize)]
struct RawWaveFormat {
    sample_rate: u32,
    channels: u16,
}

impl TryFrom<RawWaveFormat> for WaveFormat {
    type Error = Error;

    fn try_from(raw: RawWaveFormat) -> Result<Self> {
        WaveFormat::new(raw.sample_rate, raw.channels)
    }
}

impl WaveFormat {
    /// Create a validated format.
    ///
    /// # Errors
    /// `Error::InvalidFormat` if either value is zero.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(Error::InvalidFormat {
                sample_rate,
                channels,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Same channel count at a different rate
    pub fn with_sample_rate(&self, sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, self.channels)
    }

    /// Number of interleaved samples making up `frames` frames
    pub fn frames_to_samples(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }

    /// Number of whole frames contained in `samples` interleaved samples
    pub fn samples_to_frames(&self, samples: usize) -> usize {
        samples / self.channels as usize
    }

    /// Playback duration of `samples` interleaved samples
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = self.samples_to_frames(samples) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate as u64)
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, f32", self.sample_rate, self.channels)
    }
}
