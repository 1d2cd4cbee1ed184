//! Connection directory
//!
//! Every accepted TCP connection is registered here with its outbound queue.
//! The directory is shared between the accept loop, the per-connection tasks
//! and the engine's transport, so it lives in a `DashMap` rather than behind
//! the engine lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mdprov_core::{ChannelId, ChannelInfo, ChannelTransport, SubmitStatus};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

#[cfg(not(feature = "std"))]
use log::debug;
#[cfg(feature = "std")]
use tracing::debug;

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

/// One registered connection
#[derive(Debug)]
pub struct Connection {
    pub info: ChannelInfo,
    pub connected_at: Instant,
    outbound: mpsc::Sender<Vec<u8>>,
    closed: Arc<Notify>,
    frames_queued: AtomicU64,
}

impl Connection {
    pub fn frames_queued(&self) -> u64 {
        self.frames_queued.load(Ordering::Relaxed)
    }
}

/// Receiving ends handed to the tasks serving a new connection
#[derive(Debug)]
pub struct Registration {
    pub channel: ChannelId,
    pub outbound: mpsc::Receiver<Vec<u8>>,
    /// Signalled when the provider closes the channel
    pub closed: Arc<Notify>,
}

// ----------------------------------------------------------------------------
// Connection Directory
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct ConnectionDirectory {
    connections: DashMap<ChannelId, Connection>,
    next_id: AtomicU64,
    outbound_buffer: usize,
}

impl ConnectionDirectory {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register a connection and allocate its channel id
    pub fn register(&self, info: ChannelInfo) -> Registration {
        let channel = ChannelId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let closed = Arc::new(Notify::new());
        self.connections.insert(
            channel,
            Connection {
                info,
                connected_at: Instant::now(),
                outbound: tx,
                closed: closed.clone(),
                frames_queued: AtomicU64::new(0),
            },
        );
        Registration {
            channel,
            outbound: rx,
            closed,
        }
    }

    /// Remove a connection. Returns false when it was already gone.
    pub fn unregister(&self, channel: ChannelId) -> bool {
        match self.connections.remove(&channel) {
            Some((_, connection)) => {
                connection.closed.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn info(&self, channel: ChannelId) -> Option<ChannelInfo> {
        self.connections.get(&channel).map(|c| c.info.clone())
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.connections.contains_key(&channel)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a frame on a connection without waiting
    pub fn submit(&self, channel: ChannelId, bytes: &[u8]) -> SubmitStatus {
        let Some(connection) = self.connections.get(&channel) else {
            return SubmitStatus::Fatal {
                reason: format!("{} is not connected", channel),
            };
        };
        match connection.outbound.try_send(bytes.to_vec()) {
            Ok(()) => {
                connection.frames_queued.fetch_add(1, Ordering::Relaxed);
                SubmitStatus::Success
            }
            Err(mpsc::error::TrySendError::Full(_)) => SubmitStatus::Retryable {
                reason: format!(
                    "outbound queue of {} is full ({} frames)",
                    channel, self.outbound_buffer
                ),
            },
            Err(mpsc::error::TrySendError::Closed(_)) => SubmitStatus::Fatal {
                reason: format!("writer of {} has stopped", channel),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// TCP Channel Transport
// ----------------------------------------------------------------------------

/// `ChannelTransport` over the connections of a `ConnectionDirectory`
#[derive(Debug, Clone)]
pub struct TcpChannelTransport {
    directory: Arc<ConnectionDirectory>,
}

impl TcpChannelTransport {
    pub fn new(directory: Arc<ConnectionDirectory>) -> Self {
        Self { directory }
    }
}

impl ChannelTransport for TcpChannelTransport {
    fn submit(&mut self, channel: ChannelId, bytes: &[u8]) -> SubmitStatus {
        self.directory.submit(channel, bytes)
    }

    fn close(&mut self, channel: ChannelId) {
        if self.directory.unregister(channel) {
            debug!("Provider closed {}", channel);
        }
    }
}
