//! Dictionary distribution state
//!
//! Pending multi-part dictionary streams, the per-dictionary listener lists and
//! per-channel delivery tracking. The listener lists sit behind their own lock
//! so a status fan-out can snapshot them without holding anything else.

use hashbrown::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(not(feature = "std"))]
use log::debug;
#[cfg(feature = "std")]
use tracing::debug;

use crate::dictionary::encoder::DictionaryPartEncoder;
use crate::types::{ChannelId, ItemHandle, StreamId};

/// A dictionary stream with parts still to send
#[derive(Debug)]
pub struct PendingDictionary {
    pub channel: ChannelId,
    pub handle: ItemHandle,
    pub stream_id: StreamId,
    pub encoder: DictionaryPartEncoder,
}

/// One stream waiting on status for a dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictionaryListener {
    pub channel: ChannelId,
    pub handle: ItemHandle,
}

#[derive(Debug, Default)]
pub struct DictionaryDistributor {
    pending: HashMap<u64, PendingDictionary>,
    next_pending: u64,
    listeners: Mutex<HashMap<String, Vec<DictionaryListener>>>,
    delivered: HashMap<ChannelId, HashSet<String>>,
}

impl DictionaryDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Vec<DictionaryListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Pending Parts
    // ------------------------------------------------------------------------

    /// Track a dictionary stream that still has parts to send
    pub fn start(&mut self, pending: PendingDictionary) -> u64 {
        let id = self.next_pending;
        self.next_pending += 1;
        debug!(
            "Dictionary {} on {} continues after part {}",
            pending.encoder.name(),
            pending.channel,
            pending.encoder.parts_encoded()
        );
        self.pending.insert(id, pending);
        id
    }

    pub fn take(&mut self, id: u64) -> Option<PendingDictionary> {
        self.pending.remove(&id)
    }

    /// Drop pending parts of one stream
    pub fn cancel_handle(&mut self, handle: ItemHandle) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.handle != handle);
        before - self.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    pub fn add_listener(&self, name: &str, channel: ChannelId, handle: ItemHandle) {
        let mut listeners = self.listeners();
        let list = listeners.entry(name.to_string()).or_default();
        let listener = DictionaryListener { channel, handle };
        if !list.contains(&listener) {
            list.push(listener);
        }
    }

    pub fn remove_listener(&self, handle: ItemHandle) {
        let mut listeners = self.listeners();
        for list in listeners.values_mut() {
            list.retain(|l| l.handle != handle);
        }
        listeners.retain(|_, list| !list.is_empty());
    }

    /// Snapshot of the streams listening on `name`
    pub fn listeners_of(&self, name: &str) -> Vec<DictionaryListener> {
        self.listeners().get(name).cloned().unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Delivery Tracking
    // ------------------------------------------------------------------------

    pub fn mark_delivered(&mut self, channel: ChannelId, name: &str) {
        self.delivered
            .entry(channel)
            .or_default()
            .insert(name.to_string());
    }

    /// Whether `name` has been fully delivered on `channel`
    pub fn is_delivered(&self, channel: ChannelId, name: &str) -> bool {
        self.delivered
            .get(&channel)
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    /// Forget everything about a channel. Returns the number of pending
    /// dictionary streams dropped.
    pub fn cancel_channel(&mut self, channel: ChannelId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.channel != channel);
        self.delivered.remove(&channel);

        let mut listeners = self.listeners();
        for list in listeners.values_mut() {
            list.retain(|l| l.channel != channel);
        }
        listeners.retain(|_, list| !list.is_empty());

        before - self.pending.len()
    }
}
