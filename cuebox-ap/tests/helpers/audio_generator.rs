//! Audio test file generation
//!
//! Writes deterministic 32-bit float WAV files so that decoded samples can be
//! compared exactly against the generating function.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Interleaved sine samples, identical in every channel
pub fn sine_samples(sample_rate: u32, channels: u16, frames: usize, frequency_hz: f32, amplitude: f32) -> Vec<f32> {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let value = amplitude * (2.0 * PI * frequency_hz * i as f32 / sample_rate as f32).sin();
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

fn write_float_wav<P: AsRef<Path>>(path: P, sample_rate: u32, channels: u16, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Generate a sine wave WAV file and return the samples written
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<Vec<f32>, hound::Error> {
    let samples = sine_samples(sample_rate, channels, frames, frequency_hz, amplitude);
    write_float_wav(path, sample_rate, channels, &samples)?;
    Ok(samples)
}

/// Generate a mono WAV whose samples rise linearly to 1.0
pub fn generate_ramp_wav<P: AsRef<Path>>(path: P, sample_rate: u32, frames: usize) -> Result<Vec<f32>, hound::Error> {
    let samples: Vec<f32> = (0..frames).map(|i| (i as f32 + 1.0) / frames as f32).collect();
    write_float_wav(path, sample_rate, 1, &samples)?;
    Ok(samples)
}
