//! Generation-checked handle table
//!
//! Maps application-facing `ItemHandle`s to the channel whose session owns the
//! record. The table is a lookup index only; records live in their session.

use crate::errors::SessionError;
use crate::types::{ChannelId, ItemHandle};

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    channel: Option<ChannelId>,
}

#[derive(Debug, Clone)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    /// Allocate a handle for a record owned by `channel`
    pub fn allocate(&mut self, channel: ChannelId) -> Result<ItemHandle, SessionError> {
        if self.live >= self.capacity {
            return Err(SessionError::HandleTableFull {
                capacity: self.capacity,
            });
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = u32::try_from(self.slots.len()).map_err(|_| {
                    SessionError::HandleTableFull {
                        capacity: self.capacity,
                    }
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    channel: None,
                });
                slot
            }
        };

        let entry = &mut self.slots[slot as usize];
        entry.channel = Some(channel);
        self.live += 1;
        Ok(ItemHandle::from_parts(slot, entry.generation))
    }

    /// Owning channel of a live handle
    pub fn resolve(&self, handle: ItemHandle) -> Option<ChannelId> {
        let slot = self.slots.get(handle.slot()? as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.channel
    }

    /// Release a handle; stale or unknown handles are ignored
    pub fn release(&mut self, handle: ItemHandle) -> bool {
        let Some(index) = handle.slot() else {
            return false;
        };
        let Some(slot) = self.slots.get_mut(index as usize) else {
            return false;
        };
        if slot.generation != handle.generation() || slot.channel.is_none() {
            return false;
        }

        slot.channel = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        true
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
