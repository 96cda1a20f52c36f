//! Device identity and connectivity types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DeviceError;

/// Default network debugging port.
pub const DEFAULT_PORT: u16 = 5555;

/// Network address of a device (`ip:port`).
///
/// The display form is exactly what the device tool expects after `-s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub ip: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// IP with dots replaced, for use in directory names.
    pub fn file_safe_ip(&self) -> String {
        self.ip.replace(['.', ':'], "_")
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for DeviceAddress {
    type Err = DeviceError;

    /// Parse `ip` or `ip:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DeviceError::invalid_address(s));
        }

        match s.rsplit_once(':') {
            Some((ip, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| DeviceError::invalid_address(s))?;
                if ip.is_empty() {
                    return Err(DeviceError::invalid_address(s));
                }
                Ok(Self::new(ip, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

/// Connectivity as last observed by a scan or connection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// A device discovered on the network.
///
/// Identity (`address`) is fixed; the reported fields are filled in by
/// discovery and connection checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: DeviceAddress,
    /// Reported Android version.
    pub version: Option<String>,
    /// Reported model name.
    pub model: Option<String>,
    pub status: ConnectionStatus,
    /// Whether the user picked this device for the next run.
    pub selected: bool,
}

impl Device {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            version: None,
            model: None,
            status: ConnectionStatus::Disconnected,
            selected: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn ip(&self) -> &str {
        &self.address.ip
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Android {} ({})",
            self.address,
            self.version.as_deref().unwrap_or("Unknown"),
            self.model.as_deref().unwrap_or("Unknown")
        )
    }
}
