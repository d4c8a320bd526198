//! Error types for the ckptkit-ml crate.

use ckptkit_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State transfer failed: {0:#}")]
    State(#[source] anyhow::Error),

    #[error("Checkpoint not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CheckpointError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Map an I/O error from reading or writing a structured file: parse
    /// failures become `Serialization`, everything else stays `Io`.
    pub(crate) fn from_io_data(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::InvalidData {
            Self::Serialization(err.to_string())
        } else {
            Self::Io(err)
        }
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
