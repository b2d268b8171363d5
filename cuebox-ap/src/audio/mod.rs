//! Audio file decoding, resampling, asset loading and device output

pub mod asset;
pub mod decoder;
pub mod output;
pub mod resampler;

pub use asset::{AudioAsset, LoadOptions};
pub use decoder::AudioDecoder;
pub use resampler::StreamResampler;
