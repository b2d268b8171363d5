//! Common error types for cuebox

use thiserror::Error;

/// Common result type for cuebox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by cuebox crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wave format with a zero sample rate or channel count
    #[error("Invalid wave format: sample_rate={sample_rate}, channels={channels}")]
    InvalidFormat { sample_rate: u32, channels: u16 },
}
