//! Playback engine, mixer, sample sources and playback handles

pub mod engine;
pub mod handle;
pub mod mixer;
pub mod source;
pub mod volume;

pub use engine::{EngineOptions, EngineState, PlaybackEngine};
pub use handle::{PlayMode, PlaybackHandle, PlaybackState};
pub use mixer::{Mixer, MixerInputs};
pub use source::{CachedSampleSource, SampleSource, StreamingSampleSource};
pub use volume::MasterVolume;
