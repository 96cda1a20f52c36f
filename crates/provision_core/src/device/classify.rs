//! Classification of device errors into short message / remedy pairs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DeviceError;

/// Broad category of a device failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Offline,
    Closed,
    Timeout,
    Permission,
    ReadOnly,
    NoSpace,
    NotFound,
    UnknownOwner,
    Other,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "offline",
            ErrorKind::Closed => "closed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permission => "permission",
            ErrorKind::ReadOnly => "read_only",
            ErrorKind::NoSpace => "no_space",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnknownOwner => "unknown_owner",
            ErrorKind::Other => "other",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "device disconnected",
            ErrorKind::Closed => "connection closed",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Permission => "permission denied",
            ErrorKind::ReadOnly => "read-only filesystem",
            ErrorKind::NoSpace => "storage full",
            ErrorKind::NotFound => "file not found",
            ErrorKind::UnknownOwner => "app owner unknown",
            ErrorKind::Other => "unknown error",
        }
    }

    pub fn remedy(&self) -> &'static str {
        match self {
            ErrorKind::Offline | ErrorKind::Timeout => "check network",
            ErrorKind::Closed => "retry",
            ErrorKind::Permission => "check root access",
            ErrorKind::ReadOnly => "retry remount",
            ErrorKind::NoSpace => "free space on device",
            ErrorKind::NotFound => "check payload files",
            ErrorKind::UnknownOwner => "check app installation",
            ErrorKind::Other => "check the log",
        }
    }
}

/// Substring table, checked in order. First hit wins.
const PATTERNS: &[(&str, ErrorKind)] = &[
    ("device offline", ErrorKind::Offline),
    ("connect failed: closed", ErrorKind::Closed),
    ("timeout", ErrorKind::Timeout),
    ("permission denied", ErrorKind::Permission),
    ("read-only file", ErrorKind::ReadOnly),
    ("no space left", ErrorKind::NoSpace),
    ("not found", ErrorKind::NotFound),
    ("unknown", ErrorKind::UnknownOwner),
];

/// User-facing description of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
}

impl Classification {
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    pub fn remedy(&self) -> &'static str {
        self.kind.remedy()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind.message(), self.kind.remedy())
    }
}

/// Classify free-form error text from the device tool.
pub fn classify_text(text: &str) -> Classification {
    let lower = text.to_lowercase();
    let kind = PATTERNS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Other);
    Classification { kind }
}

/// Classify a typed device error.
pub fn classify(err: &DeviceError) -> Classification {
    match err {
        DeviceError::Timeout { .. } => Classification {
            kind: ErrorKind::Timeout,
        },
        DeviceError::Connectivity { .. } => Classification {
            kind: ErrorKind::Offline,
        },
        DeviceError::Command { stderr, .. } => classify_text(stderr),
        other => classify_text(&other.to_string()),
    }
}
