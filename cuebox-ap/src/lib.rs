//! # cuebox Audio Player Library (cuebox-ap)
//!
//! Real-time mixing core of the cuebox sound-effect board.
//!
//! **Purpose:** Load sound assets (fully decoded or streamed on demand), play any
//! number of them concurrently onto one output device with per-asset and master
//! volume, one-shot or looped, with cooperative cancellation.
//!
//! **Architecture:** symphonia decoding + rubato resampling feeding pull-based
//! sample sources, summed by a mixer that is driven by a cpal output callback
//! (or pulled manually through the offline backend).

pub mod audio;
pub mod error;
pub mod playback;

pub use audio::asset::{AudioAsset, LoadOptions};
pub use error::{Error, Result};
pub use playback::engine::{EngineOptions, EngineState, PlaybackEngine};
pub use playback::handle::{PlayMode, PlaybackHandle, PlaybackState};

pub use cuebox_common::{DeviceDescriptor, DeviceKind, ShareMode, WaveFormat};
