//! Master volume and per-buffer gain application

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Tolerance for treating a gain as exactly 0 or 1
pub const VOLUME_EPSILON: f32 = 1e-5;

/// Samples per worker task when gain is fanned out
const PARALLEL_CHUNK: usize = 4096;

/// Engine-wide volume in [0, 1].
///
/// Stored as the bit pattern of an `f32` in an `AtomicU32` so that the output
/// callback can read it every buffer without a lock and without tearing.
#[derive(Debug)]
pub struct MasterVolume {
    bits: AtomicU32,
}

impl MasterVolume {
    pub fn new(volume: f32) -> Self {
        Self {
            bits: AtomicU32::new(clamp_master(volume).to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Store a new volume, clamped to [0, 1]; returns the stored value
    pub fn set(&self, volume: f32) -> f32 {
        let clamped = clamp_master(volume);
        self.bits.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }
}

impl Default for MasterVolume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_master(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Scale `samples` in place by `gain`.
///
/// Gains within `VOLUME_EPSILON` of 0 zero the buffer and gains within
/// `VOLUME_EPSILON` of 1 leave it bit-identical. Otherwise every sample is
/// multiplied, across rayon workers when `parallel` is set; each index has a
/// single writer so chunks never overlap.
pub fn apply_gain(samples: &mut [f32], gain: f32, parallel: bool) {
    if gain.abs() < VOLUME_EPSILON {
        samples.fill(0.0);
    } else if (gain - 1.0).abs() < VOLUME_EPSILON {
        // passthrough
    } else if parallel && samples.len() > PARALLEL_CHUNK {
        samples.par_chunks_mut(PARALLEL_CHUNK).for_each(|chunk| {
            for sample in chunk {
                *sample *= gain;
            }
        });
    } else {
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}
