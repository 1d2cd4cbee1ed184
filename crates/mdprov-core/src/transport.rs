//! Channel transport abstraction
//!
//! The engine never performs I/O itself. Outbound bytes go through a
//! `ChannelTransport`, which the runtime implements on top of TCP connections
//! and tests implement with an in-memory recorder.

use serde::{Deserialize, Serialize};

use crate::types::ChannelId;

// ----------------------------------------------------------------------------
// Submit Status
// ----------------------------------------------------------------------------

/// Outcome of one low-level submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Success,
    /// Transient condition (for example a full outbound queue); the caller decides whether to retry
    Retryable { reason: String },
    /// The channel is unusable
    Fatal { reason: String },
}

impl SubmitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitStatus::Success)
    }
}

// ----------------------------------------------------------------------------
// Channel Transport Trait
// ----------------------------------------------------------------------------

/// Byte-level access to accepted channels
pub trait ChannelTransport: Send {
    /// Queue `bytes` for delivery on `channel`
    fn submit(&mut self, channel: ChannelId, bytes: &[u8]) -> SubmitStatus;

    /// Close the channel; no further events are expected for it
    fn close(&mut self, channel: ChannelId);
}

// ----------------------------------------------------------------------------
// Channel Information
// ----------------------------------------------------------------------------

/// Connection details reported when a channel comes up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelInfo {
    pub host: String,
    pub port: u16,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub max_fragment_size: u32,
    pub send_buffer_size: u32,
    pub recv_buffer_size: u32,
}

impl ChannelInfo {
    pub fn new<T: Into<String>>(host: T, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol_major: 14,
            protocol_minor: 1,
            max_fragment_size: 6144,
            send_buffer_size: 65535,
            recv_buffer_size: 65535,
        }
    }

    /// Diagnostic text appended to transport failures
    pub fn diagnostics(&self) -> String {
        format!(
            "host {}:{} protocol {}.{} max fragment {}",
            self.host, self.port, self.protocol_major, self.protocol_minor, self.max_fragment_size
        )
    }
}
