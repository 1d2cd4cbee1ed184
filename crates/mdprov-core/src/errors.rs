//! Error types for the mdprov engine
//!
//! This module contains the error types used throughout the provider engine:
//! session registry errors, directory store errors, dictionary errors, transport
//! errors and the `ProviderError` type that unifies them and carries the error
//! taxonomy the publish API exposes to applications.

use crate::item::StateTransitionError;
use crate::types::{ChannelId, ItemHandle, ServiceId, StreamId};

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised by a session registry or the handle table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found for {channel}")]
    SessionNotFound { channel: ChannelId },
    #[error("Session already exists for {channel}")]
    SessionAlreadyExists { channel: ChannelId },
    #[error("Maximum sessions reached: {current}/{max}")]
    MaxSessionsReached { current: usize, max: usize },
    #[error("Stream {stream_id} is already open on {channel}")]
    StreamInUse { channel: ChannelId, stream_id: StreamId },
    #[error("Handle table exhausted: {capacity} live handles")]
    HandleTableFull { capacity: usize },
    #[error("Item {handle} not found")]
    ItemNotFound { handle: ItemHandle },
    #[error("Attempt to change service from {from} to {to} on stream {stream_id}")]
    ServiceChangeNotAllowed {
        stream_id: StreamId,
        from: ServiceId,
        to: ServiceId,
    },
}

/// Errors raised by the service directory store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Attempt to add a service with name of {name} and id of {service_id} while a service with the same id is already added.")]
    DuplicateServiceId { name: String, service_id: u64 },
    #[error("Attempt to add a service with name of {name} and id of {service_id} while a service with the same name is already added.")]
    DuplicateServiceName { name: String, service_id: u64 },
    #[error("Service id {service_id} is out of range (max 65535)")]
    ServiceIdOutOfRange { service_id: u64 },
    #[error("Service name {name} is not included in the source directory")]
    UnknownServiceName { name: String },
    #[error("Service id {service_id} is not included in the source directory")]
    UnknownServiceId { service_id: u64 },
    #[error("Service with id {service_id} is missing its info filter")]
    MissingServiceInfo { service_id: u64 },
}

/// Errors raised while loading or encoding reference dictionaries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DictionaryError {
    #[error("Dictionary {name} is not loaded")]
    NotLoaded { name: String },
    #[error("Dictionary part buffer of {required} bytes exceeds the limit of {limit} bytes")]
    BufferOverflow { required: usize, limit: usize },
    #[error("Malformed dictionary definition at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Dictionary encoding failed: {reason}")]
    EncodingFailed { reason: String },
}

/// Errors raised by channel transports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Submit on {channel} failed: {reason}")]
    SubmitFailed { channel: ChannelId, reason: String },
    #[error("Submit on {channel} would block: {reason}")]
    WouldBlock { channel: ChannelId, reason: String },
    #[error("Channel {channel} is not connected")]
    NotConnected { channel: ChannelId },
}

// ----------------------------------------------------------------------------
// Error Classification
// ----------------------------------------------------------------------------

/// Coarse classification of a `ProviderError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProtocolReject,
    InvalidUsage,
    InvalidHandleState,
    AllocationFailure,
    TransportFailure,
    Configuration,
    Serialization,
    StateTransition,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the provider engine
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Malformed or unauthorized inbound request; a reject status was sent
    #[error("Protocol reject on {channel} stream {stream_id}: {reason}")]
    ProtocolReject {
        channel: ChannelId,
        stream_id: StreamId,
        reason: String,
    },

    /// The application misused the publish API
    #[error("Invalid usage: {text}")]
    InvalidUsage { text: String },

    /// The operation is not yet legal on this handle
    #[error("Invalid handle state for {handle}: {text}")]
    InvalidHandleState { handle: ItemHandle, text: String },

    /// Resource exhaustion while creating core structures
    #[error("Allocation failure: {reason}")]
    AllocationFailure { reason: String },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl ProviderError {
    /// Classify this error into the taxonomy exposed to applications
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::ProtocolReject { .. } => ErrorKind::ProtocolReject,
            ProviderError::InvalidUsage { .. } => ErrorKind::InvalidUsage,
            ProviderError::InvalidHandleState { .. } => ErrorKind::InvalidHandleState,
            ProviderError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            ProviderError::Transport(_) => ErrorKind::TransportFailure,
            ProviderError::Session(SessionError::HandleTableFull { .. }) => {
                ErrorKind::AllocationFailure
            }
            ProviderError::Session(_) => ErrorKind::InvalidUsage,
            ProviderError::Directory(_) => ErrorKind::InvalidUsage,
            ProviderError::Dictionary(DictionaryError::BufferOverflow { .. }) => {
                ErrorKind::AllocationFailure
            }
            ProviderError::Dictionary(_) => ErrorKind::InvalidUsage,
            ProviderError::Serialization(_) => ErrorKind::Serialization,
            ProviderError::StateTransition(_) => ErrorKind::StateTransition,
            ProviderError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// True when the error reports a misuse of the publish API
    pub fn is_invalid_usage(&self) -> bool {
        self.kind() == ErrorKind::InvalidUsage
    }

    /// True when the transport could not take the message yet
    pub fn is_would_block(&self) -> bool {
        matches!(self, ProviderError::Transport(TransportError::WouldBlock { .. }))
    }
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ProviderError {
    /// Create an invalid usage error with a message
    pub fn invalid_usage<T: Into<String>>(text: T) -> Self {
        ProviderError::InvalidUsage { text: text.into() }
    }

    /// Create an invalid handle state error
    pub fn invalid_handle<T: Into<String>>(handle: ItemHandle, text: T) -> Self {
        ProviderError::InvalidHandleState {
            handle,
            text: text.into(),
        }
    }

    /// Create a protocol reject error
    pub fn protocol_reject<T: Into<String>>(
        channel: ChannelId,
        stream_id: StreamId,
        reason: T,
    ) -> Self {
        ProviderError::ProtocolReject {
            channel,
            stream_id,
            reason: reason.into(),
        }
    }

    /// Create an allocation failure error
    pub fn allocation_failure<T: Into<String>>(reason: T) -> Self {
        ProviderError::AllocationFailure {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ProviderError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transport failure carrying channel diagnostics
    pub fn transport_failure<T: Into<String>>(channel: ChannelId, reason: T) -> Self {
        ProviderError::Transport(TransportError::SubmitFailed {
            channel,
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ProviderError>;
pub type ProviderResult<T> = Result<T>;
