//! Error types for the ckptkit-core crate.

use thiserror::Error;

/// Errors raised by the shared persistence, configuration and logging layers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

impl CoreError {
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
