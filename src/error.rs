//! Error types for the daylight sync controller
//!
//! Each boundary owns its error enum (configuration, transport, payload decoding,
//! process execution). The core converts all of them into log entries; only the
//! binary's bootstrap path surfaces [`SyncError`] to decide the exit status.

use crate::command::codec::DecodeError;
use crate::command::executor::ExecutionError;
use crate::config::ConfigError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Top-level error for bootstrap and CLI operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("Payload error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error represents a requested shutdown rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(MqttError::Cancelled)
                | SyncError::Execution(ExecutionError::Cancelled)
        )
    }
}

/// Result type for controller operations
pub type SyncResult<T> = Result<T, SyncError>;
