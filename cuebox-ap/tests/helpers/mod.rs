//! Test helper modules for cuebox-ap integration tests
//!
//! Provides WAV fixture generation and an offline engine builder.

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{generate_ramp_wav, generate_sine_wav, sine_samples};

use cuebox_ap::{DeviceDescriptor, EngineOptions, PlaybackEngine, WaveFormat};

/// Engine bound to the offline device and already started
pub fn started_offline_engine(format: WaveFormat) -> PlaybackEngine {
    let engine = PlaybackEngine::new(EngineOptions::new(DeviceDescriptor::offline()).format(format));
    engine.start().expect("offline engine starts");
    engine
}
