//! Runtime error types

use mdprov_core::{ChannelId, ProviderError};
use thiserror::Error;

/// Errors raised by the runtime around the engine
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Frame of {length} bytes on {channel} exceeds the {limit} byte limit")]
    FrameTooLarge {
        channel: ChannelId,
        length: usize,
        limit: usize,
    },

    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("Runtime is shut down")]
    Shutdown,
}

impl RuntimeError {
    pub fn channel<T: Into<String>>(message: T) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    pub fn invalid_operation<T: Into<String>>(reason: T) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
