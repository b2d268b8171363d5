//! Error types for cuebox-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cuebox-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration and format errors
    #[error(transparent)]
    Common(#[from] cuebox_common::Error),

    /// Asset path does not exist
    #[error("Audio file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Container or codec cannot be opened
    #[error("Unsupported audio format in {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// File opens but its packets do not decode
    #[error("Corrupt audio data in {}: {reason}", path.display())]
    CorruptData { path: PathBuf, reason: String },

    /// Resampler construction or processing failure
    #[error("Resampling error: {0}")]
    Resample(String),

    /// `play()` called while the engine is neither started nor paused
    #[error("Engine not running (state: {0})")]
    EngineNotRunning(String),

    /// Asset rate differs from the engine output rate
    #[error("Sample rate mismatch: asset {asset} Hz, engine {engine} Hz")]
    SampleRateMismatch { asset: u32, engine: u32 },

    /// Asset channel layout cannot be mapped onto the engine layout
    #[error("Channel mismatch: asset has {asset} channels, engine has {engine}")]
    ChannelMismatch { asset: u16, engine: u16 },

    /// Device descriptor names a backend outside the supported set
    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(String),

    /// Output device could not be bound
    #[error("Audio device error: {0}")]
    DeviceBind(String),

    /// Bound stream failed to start or pause
    #[error("Audio output error: {0}")]
    Output(String),

    /// Engine has been disposed
    #[error("Engine has been disposed")]
    Disposed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using cuebox-ap Error
pub type Result<T> = std::result::Result<T, Error>;
