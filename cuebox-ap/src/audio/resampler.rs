//! Audio resampling using rubato
//!
//! Converts a decoded stream to the engine output rate. Input arrives in
//! arbitrarily sized interleaved blocks (one decoded packet at a time) and is
//! fed to a fixed-input sinc resampler in constant chunks.
//!
//! The filter delay is removed from the front of the output and the tail is
//! flushed on `finish()`, so a stream of `n` input frames always produces
//! `ceil(n * out_rate / in_rate)` aligned output frames.

use crate::error::{Error, Result};
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Lowest accepted resampling quality
pub const MIN_QUALITY: u32 = 1;

/// Highest accepted resampling quality
pub const MAX_QUALITY: u32 = 60;

/// Input frames handed to rubato per call
const CHUNK_FRAMES: usize = 1024;

/// Upper bound on zero-input calls while draining the filter tail
const MAX_FLUSH_CALLS: usize = 16;

/// Clamp a requested quality into [MIN_QUALITY, MAX_QUALITY]
pub fn clamp_quality(quality: u32) -> u32 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Map a quality level onto sinc interpolation parameters.
///
/// Filter length grows with quality (16 to 240 taps); the interpolation
/// between oversampled filter points steps from linear to cubic.
fn sinc_parameters(quality: u32) -> SincInterpolationParameters {
    let quality = clamp_quality(quality) as usize;
    let sinc_len = (8 * quality.div_ceil(2)).max(16);

    let interpolation = match quality {
        0..=19 => SincInterpolationType::Linear,
        20..=39 => SincInterpolationType::Quadratic,
        _ => SincInterpolationType::Cubic,
    };

    let f_cutoff = if sinc_len >= 128 {
        0.95
    } else if sinc_len >= 64 {
        0.915
    } else {
        0.85
    };

    SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Incremental resampler for one interleaved stream.
pub struct StreamResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,

    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,

    /// Output frames still to drop to compensate the filter delay
    delay_remaining: usize,

    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    /// Create a resampler converting `input_rate` to `output_rate`.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16, quality: u32) -> Result<Self> {
        let quality = clamp_quality(quality);
        let channels = channels as usize;

        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            sinc_parameters(quality),
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))?;

        let delay_remaining = resampler.output_delay();

        debug!(
            "Resampler {}Hz -> {}Hz ({} channels, quality {}, delay {} frames)",
            input_rate, output_rate, channels, quality, delay_remaining
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
            delay_remaining,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Output frames the stream will have produced once finished
    fn expected_output_frames(&self) -> u64 {
        let num = self.frames_in as u128 * self.output_rate as u128;
        let den = self.input_rate as u128;
        num.div_ceil(den) as u64
    }

    /// Push interleaved input; append whatever output is ready to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let frames = input.len() / self.channels;
        for frame in input.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.pending[ch].push(sample);
            }
        }
        self.frames_in += frames as u64;

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|ch| &ch[..needed]).collect();
            let output = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))?;

            for ch in self.pending.iter_mut() {
                ch.drain(..needed);
            }
            self.emit(output, u64::MAX, out);
        }

        Ok(())
    }

    /// Flush buffered input and the filter tail at end of stream.
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let expected = self.expected_output_frames();

        if !self.pending[0].is_empty() {
            let output = self
                .resampler
                .process_partial(Some(self.pending.as_slice()), None)
                .map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))?;
            for ch in self.pending.iter_mut() {
                ch.clear();
            }
            self.emit(output, expected, out);
        }

        let mut calls = 0;
        while self.frames_out < expected && calls < MAX_FLUSH_CALLS {
            let output = self
                .resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))?;
            self.emit(output, expected, out);
            calls += 1;
        }

        Ok(())
    }

    /// Drop delay frames, cap at `limit` total frames and interleave into `out`.
    fn emit(&mut self, planar: Vec<Vec<f32>>, limit: u64, out: &mut Vec<f32>) {
        let frames = planar.first().map_or(0, |ch| ch.len());
        let skip = self.delay_remaining.min(frames);
        self.delay_remaining -= skip;

        let available = (frames - skip) as u64;
        let take = available.min(limit.saturating_sub(self.frames_out)) as usize;

        out.reserve(take * self.channels);
        for frame_idx in skip..skip + take {
            for ch in &planar {
                out.push(ch[frame_idx]);
            }
        }
        self.frames_out += take as u64;
    }
}

/// Resample a complete interleaved buffer in one go.
pub fn resample_all(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
    channels: u16,
    quality: u32,
) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let mut resampler = StreamResampler::new(input_rate, output_rate, channels, quality)?;
    let mut output = Vec::with_capacity(
        (input.len() as f64 * output_rate as f64 / input_rate as f64) as usize + channels as usize,
    );
    resampler.process(input, &mut output)?;
    resampler.finish(&mut output)?;
    Ok(output)
}
