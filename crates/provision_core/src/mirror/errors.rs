//! Mirror supervisor errors.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    /// The mirror tool is missing or does not answer its version probe.
    /// Retrying will not help.
    #[error("mirror tool '{tool}' is not available")]
    ProcessUnavailable { tool: String },

    /// The mirror process exited before or while being shown.
    #[error("mirror process exited (code {})", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    ProcessCrashed { code: Option<i32> },

    #[error("failed to launch mirror tool '{tool}': {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to embed mirror window: {0}")]
    Embed(String),
}

impl MirrorError {
    pub fn unavailable(tool: impl Into<String>) -> Self {
        Self::ProcessUnavailable { tool: tool.into() }
    }

    pub fn crashed(code: Option<i32>) -> Self {
        Self::ProcessCrashed { code }
    }

    pub fn launch(tool: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            tool: tool.into(),
            source,
        }
    }

    pub fn embed(message: impl Into<String>) -> Self {
        Self::Embed(message.into())
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ProcessUnavailable { .. })
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;
