//! # cuebox Common Library
//!
//! Value types shared by the cuebox audio player and its callers:
//! - Wave format descriptor
//! - Output device descriptor and share mode
//! - Engine configuration loading
//! - Common error type

pub mod config;
pub mod device;
pub mod error;
pub mod format;

pub use config::EngineConfig;
pub use device::{DeviceDescriptor, DeviceKind, ShareMode};
pub use error::{Error, Result};
pub use format::WaveFormat;
