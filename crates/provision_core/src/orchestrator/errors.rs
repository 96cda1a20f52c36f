//! Error types for provisioning runs.
//!
//! Only [`ProvisionError`] ever reaches the caller, and only before any
//! device has been touched. [`StepError`] stays inside the pipeline: it is
//! classified, logged and recorded, and the next step runs anyway.

use std::io;

use thiserror::Error;

use crate::device::{classify, classify_text, Classification, DeviceError};

/// Failure that prevents a run from starting.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    #[error("Run '{run_name}' setup failed: {message}")]
    SetupFailed { run_name: String, message: String },
}

impl ProvisionError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn setup_failed(run_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            run_name: run_name.into(),
            message: message.into(),
        }
    }
}

/// Failure inside one step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("{what} not found: {path}")]
    NotFound { what: String, path: String },

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Short message and remedy for the run log.
    pub fn classification(&self) -> Classification {
        match self {
            StepError::Device(e) => classify(e),
            other => classify_text(&other.to_string()),
        }
    }
}

pub type StepResult<T> = Result<T, StepError>;

pub type ProvisionResult<T> = Result<T, ProvisionError>;
