//! Output device descriptor
//!
//! Devices are discovered by an external enumeration collaborator and handed to
//! the engine as an opaque descriptor. The engine only dispatches on `kind`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend family a device belongs to.
///
/// Deserializes from a lowercase string. Strings outside the known set are
/// kept as `Unrecognized` so that the engine can reject them when binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceKind {
    /// Platform default host (ALSA, CoreAudio, WASAPI)
    System,
    /// JACK audio connection kit
    Jack,
    /// Steinberg ASIO
    Asio,
    /// No hardware; the mixer is pulled manually by the caller
    Offline,
    /// Anything else an enumerator may report
    Unrecognized(String),
}

impl DeviceKind {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceKind::System => "system",
            DeviceKind::Jack => "jack",
            DeviceKind::Asio => "asio",
            DeviceKind::Offline => "offline",
            DeviceKind::Unrecognized(kind) => kind,
        }
    }
}

impl From<String> for DeviceKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "system" => DeviceKind::System,
            "jack" => DeviceKind::Jack,
            "asio" => DeviceKind::Asio,
            "offline" => DeviceKind::Offline,
            _ => DeviceKind::Unrecognized(value),
        }
    }
}

impl From<DeviceKind> for String {
    fn from(kind: DeviceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for DeviceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeviceKind::from(s.to_string()))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque output device reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub kind: DeviceKind,
    /// Backend specific identifier; empty selects the host's default device
    pub native_id: String,
    pub display_name: String,
}

impl DeviceDescriptor {
    pub fn new(kind: DeviceKind, native_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            kind,
            native_id: native_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Default device of the platform host
    pub fn system_default() -> Self {
        Self::new(DeviceKind::System, "", "System default")
    }

    /// Manually pulled device, used for offline rendering and tests
    pub fn offline() -> Self {
        Self::new(DeviceKind::Offline, "offline", "Offline renderer")
    }

    pub fn is_default(&self) -> bool {
        self.native_id.is_empty()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name, self.kind)
    }
}

/// How the device is opened.
///
/// `Exclusive` requests a fixed callback buffer derived from the latency
/// setting; `Shared` leaves buffer sizing to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    #[default]
    Shared,
    Exclusive,
}
