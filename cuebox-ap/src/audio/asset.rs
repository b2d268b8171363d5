//! Loaded sound assets
//!
//! An asset is either fully decoded into one interleaved f32 buffer (cached) or
//! reduced to validated metadata that lets every playback instance open its own
//! decoder (streaming). Assets are immutable after loading and are shared
//! read-only through `Arc` by any number of sample sources.

use crate::audio::decoder::AudioDecoder;
use crate::audio::resampler::{self, StreamResampler};
use crate::error::Result;
use cuebox_common::WaveFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Upper bound of the per-asset volume
pub const MAX_ASSET_VOLUME: f32 = 4.0;

/// Options for [`AudioAsset::load`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Output format to convert to; only the sample rate is honored, the
    /// channel count always follows the file
    pub target_format: Option<WaveFormat>,

    /// Decode the whole file up front instead of per playback
    pub cached: bool,

    /// Baseline volume, clamped to [0, 4]
    pub volume: f32,

    /// Resampling quality, clamped to [1, 60]
    pub quality: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            target_format: None,
            cached: true,
            volume: 1.0,
            quality: resampler::MAX_QUALITY,
        }
    }
}

impl LoadOptions {
    pub fn target_format(mut self, format: WaveFormat) -> Self {
        self.target_format = Some(format);
        self
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }
}

/// Clamp an asset volume into [0, MAX_ASSET_VOLUME]; NaN becomes silence
pub fn clamp_asset_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, MAX_ASSET_VOLUME)
    }
}

/// One loaded sound.
#[derive(Debug)]
pub struct AudioAsset {
    path: PathBuf,

    /// Native format of the file
    source_format: WaveFormat,

    /// Format produced for playback (target rate, file channel count)
    format: WaveFormat,

    volume: f32,
    quality: u32,

    /// Track length at the source rate, when known
    source_frames: Option<u64>,

    /// Fully decoded samples; `None` for streaming assets
    samples: Option<Vec<f32>>,
}

impl AudioAsset {
    /// Load an audio file.
    ///
    /// With `cached` set, the file is decoded (and resampled) completely on the
    /// calling thread before this returns; load assets before latency matters.
    ///
    /// # Errors
    /// - `Error::NotFound` if the path does not exist
    /// - `Error::UnsupportedFormat` if no reader or codec accepts the file
    /// - `Error::CorruptData` if the file opens but its data does not decode
    pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let started = Instant::now();

        let mut decoder = AudioDecoder::open(path)?;
        let source_format = decoder.source_format();

        let output_rate = options
            .target_format
            .map(|f| f.sample_rate())
            .unwrap_or(source_format.sample_rate());
        let format = source_format.with_sample_rate(output_rate)?;
        let quality = resampler::clamp_quality(options.quality);
        let volume = clamp_asset_volume(options.volume);

        let samples = if options.cached {
            let mut resampler = build_resampler(source_format, format, quality)?;
            Some(decode_all(&mut decoder, resampler.as_mut())?)
        } else {
            // Validate that at least the first packet decodes
            let mut first_block = Vec::new();
            decoder.decode_next(&mut first_block)?;
            None
        };

        let asset = Self {
            path: path.to_path_buf(),
            source_format,
            format,
            volume,
            quality,
            source_frames: decoder.total_frames(),
            samples,
        };

        info!(
            "Loaded {} ({}, {}, volume {:.2}) in {:.1}ms",
            path.display(),
            asset.format,
            if asset.is_cached() { "cached" } else { "streaming" },
            asset.volume,
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Arc::new(asset))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format delivered to sample sources
    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Native format of the file
    pub fn source_format(&self) -> WaveFormat {
        self.source_format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.format.channels()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    pub fn is_cached(&self) -> bool {
        self.samples.is_some()
    }

    /// Decoded samples of a cached asset
    pub fn samples(&self) -> Option<&[f32]> {
        self.samples.as_deref()
    }

    /// Playback length; for streaming assets only when the container reports it
    pub fn duration(&self) -> Option<Duration> {
        match &self.samples {
            Some(samples) => Some(self.format.duration_of(samples.len())),
            None => self.source_frames.map(|frames| {
                self.source_format
                    .duration_of(self.source_format.frames_to_samples(frames as usize))
            }),
        }
    }

    /// Open a fresh decoder and resampler for one streaming playback instance
    pub(crate) fn open_stream(&self) -> Result<(AudioDecoder, Option<StreamResampler>)> {
        let decoder = AudioDecoder::open(&self.path)?;
        let resampler = build_resampler(decoder.source_format(), self.format, self.quality)?;
        Ok((decoder, resampler))
    }

    /// Build a cached asset from samples that are already decoded, such as
    /// synthesized cues. `samples` is interleaved in `format`.
    pub fn from_samples(samples: Vec<f32>, format: WaveFormat, volume: f32) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::new(),
            source_format: format,
            format,
            volume: clamp_asset_volume(volume),
            quality: resampler::MAX_QUALITY,
            source_frames: Some(format.samples_to_frames(samples.len()) as u64),
            samples: Some(samples),
        })
    }
}

fn build_resampler(
    source: WaveFormat,
    target: WaveFormat,
    quality: u32,
) -> Result<Option<StreamResampler>> {
    if source.sample_rate() == target.sample_rate() {
        return Ok(None);
    }
    StreamResampler::new(source.sample_rate(), target.sample_rate(), source.channels(), quality)
        .map(Some)
}

fn decode_all(decoder: &mut AudioDecoder, resampler: Option<&mut StreamResampler>) -> Result<Vec<f32>> {
    let capacity = decoder
        .total_frames()
        .map(|frames| decoder.source_format().frames_to_samples(frames as usize))
        .unwrap_or(0);
    let mut decoded = Vec::with_capacity(capacity);

    match resampler {
        None => while decoder.decode_next(&mut decoded)?.is_some() {},
        Some(resampler) => {
            let mut block = Vec::new();
            while decoder.decode_next(&mut block)?.is_some() {
                resampler.process(&block, &mut decoded)?;
                block.clear();
            }
            resampler.finish(&mut decoded)?;
        }
    }

    debug!(
        "Decoded {} samples from {}",
        decoded.len(),
        decoder.path().display()
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamped() {
        assert_eq!(clamp_asset_volume(-1.0), 0.0);
        assert_eq!(clamp_asset_volume(5.0), 4.0);
        assert_eq!(clamp_asset_volume(2.5), 2.5);
        assert_eq!(clamp_asset_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_options_builder() {
        let format = WaveFormat::new(48000, 2).unwrap();
        let options = LoadOptions::default()
            .cached(false)
            .volume(0.5)
            .quality(10)
            .target_format(format);
        assert!(!options.cached);
        assert_eq!(options.volume, 0.5);
        assert_eq!(options.quality, 10);
        assert_eq!(options.target_format, Some(format));
    }

    #[test]
    fn test_in_memory_asset_duration() {
        let format = WaveFormat::new(48000, 1).unwrap();
        let asset = AudioAsset::from_samples(vec![0.0; 24000], format, 9.0);
        assert_eq!(asset.duration(), Some(Duration::from_millis(500)));
        assert_eq!(asset.volume(), 4.0);
        assert!(asset.is_cached());
    }
}
