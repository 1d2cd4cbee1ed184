//! Session Registry
//!
//! One connected peer's open streams. The registry exclusively owns its
//! `ItemRecord`s and keeps four indices over them:
//!
//! - insertion order (walked tail to head by `close_all`)
//! - stream id → record (unique)
//! - message key → record, only when duplicate-key detection is enabled
//! - service id → item group → records, for group-based invalidation
//!
//! Every record in the stream-id map is in the ordered list exactly once, and
//! removal unlinks it from all indices.

use hashbrown::HashMap;
use std::collections::BTreeMap;

#[cfg(not(feature = "std"))]
use log::debug;
#[cfg(feature = "std")]
use tracing::debug;

use crate::item::ItemRecord;
use crate::message::MsgKey;
use crate::transport::ChannelInfo;
use crate::types::{ChannelId, DomainType, ItemGroupId, ItemHandle, ServiceId, StreamId, Timestamp};

/// Identity used for duplicate-key detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub domain: DomainType,
    pub private_stream: bool,
    pub key: MsgKey,
}

impl ItemKey {
    fn of(record: &ItemRecord) -> Self {
        Self {
            domain: record.domain(),
            private_stream: record.is_private(),
            key: record.key().clone(),
        }
    }
}

type GroupBuckets = HashMap<ItemGroupId, Vec<ItemHandle>>;

// ----------------------------------------------------------------------------
// Session Registry
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct SessionRegistry {
    channel: ChannelId,
    info: ChannelInfo,
    connected_at: Timestamp,
    logged_in: bool,
    login_item: Option<ItemHandle>,
    records: HashMap<ItemHandle, ItemRecord>,
    order: BTreeMap<u64, ItemHandle>,
    next_seq: u64,
    streams: HashMap<StreamId, ItemHandle>,
    keys: Option<HashMap<ItemKey, ItemHandle>>,
    groups: HashMap<ServiceId, GroupBuckets>,
    closing_all: bool,
}

impl SessionRegistry {
    pub fn new(
        channel: ChannelId,
        info: ChannelInfo,
        detect_duplicate_keys: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            channel,
            info,
            connected_at: now,
            logged_in: false,
            login_item: None,
            records: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            streams: HashMap::new(),
            keys: detect_duplicate_keys.then(HashMap::new),
            groups: HashMap::new(),
            closing_all: false,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.logged_in = logged_in;
    }

    pub fn login_item(&self) -> Option<ItemHandle> {
        self.login_item
    }

    pub fn set_login_item(&mut self, handle: ItemHandle) {
        self.login_item = Some(handle);
    }

    pub fn get(&self, handle: ItemHandle) -> Option<&ItemRecord> {
        self.records.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ItemHandle) -> Option<&mut ItemRecord> {
        self.records.get_mut(&handle)
    }

    pub fn find_by_stream(&self, stream_id: StreamId) -> Option<ItemHandle> {
        self.streams.get(&stream_id).copied()
    }

    /// Records in insertion order
    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.order.values().filter_map(|h| self.records.get(h))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn key_index_len(&self) -> usize {
        self.keys.as_ref().map(HashMap::len).unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Item Lifecycle
    // ------------------------------------------------------------------------

    /// Link `record` into the registry. Returns false, linking nothing, when
    /// its stream id is already in use.
    pub fn add_item(&mut self, mut record: ItemRecord) -> bool {
        let handle = record.handle();
        if self.streams.contains_key(&record.stream_id()) || self.records.contains_key(&handle) {
            if let Some(keys) = self.keys.as_mut() {
                let key = ItemKey::of(&record);
                if keys.get(&key) == Some(&handle) {
                    keys.remove(&key);
                }
            }
            return false;
        }

        record.seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(record.seq, handle);
        self.streams.insert(record.stream_id(), handle);
        self.records.insert(handle, record);
        true
    }

    /// Insert the record's key into the duplicate-key index. Returns true when
    /// a different record already holds an equal key.
    pub fn check_existing_request(&mut self, record: &ItemRecord) -> bool {
        let Some(keys) = self.keys.as_mut() else {
            return false;
        };
        match keys.entry(ItemKey::of(record)) {
            hashbrown::hash_map::Entry::Occupied(entry) => *entry.get() != record.handle(),
            hashbrown::hash_map::Entry::Vacant(entry) => {
                entry.insert(record.handle());
                false
            }
        }
    }

    /// Move a reissued record's duplicate-key entry from `previous` to its current key
    pub fn reindex_key(&mut self, handle: ItemHandle, previous: &MsgKey) {
        let Some(record) = self.records.get(&handle) else {
            return;
        };
        let Some(keys) = self.keys.as_mut() else {
            return;
        };
        let old = ItemKey {
            domain: record.domain(),
            private_stream: record.is_private(),
            key: previous.clone(),
        };
        if keys.get(&old) == Some(&handle) {
            keys.remove(&old);
        }
        keys.entry(ItemKey::of(record)).or_insert(handle);
    }

    /// Unlink and return a record
    pub fn remove_item(&mut self, handle: ItemHandle) -> Option<ItemRecord> {
        let record = self.records.remove(&handle)?;
        self.order.remove(&record.seq);
        if self.streams.get(&record.stream_id()) == Some(&handle) {
            self.streams.remove(&record.stream_id());
        }
        if !self.closing_all {
            if let Some(keys) = self.keys.as_mut() {
                let key = ItemKey::of(&record);
                if keys.get(&key) == Some(&handle) {
                    keys.remove(&key);
                }
            }
            self.unlink_group(&record);
        }
        if self.login_item == Some(handle) {
            self.login_item = None;
            self.logged_in = false;
        }
        Some(record)
    }

    /// Remove every record, walking the item list from tail to head, then clear
    /// the remaining indices in one shot.
    pub fn close_all(&mut self) -> Vec<ItemRecord> {
        self.closing_all = true;
        let mut closed = Vec::with_capacity(self.records.len());

        let mut cursor = self.order.keys().next_back().copied();
        while let Some(seq) = cursor {
            cursor = self.order.range(..seq).next_back().map(|(s, _)| *s);
            if let Some(handle) = self.order.get(&seq).copied() {
                if let Some(record) = self.remove_item(handle) {
                    closed.push(record);
                }
            }
        }

        self.streams.clear();
        if let Some(keys) = self.keys.as_mut() {
            keys.clear();
        }
        self.groups.clear();
        self.login_item = None;
        self.logged_in = false;
        self.closing_all = false;

        debug!("Closed {} items on {}", closed.len(), self.channel);
        closed
    }

    // ------------------------------------------------------------------------
    // Item Groups
    // ------------------------------------------------------------------------

    fn unlink_group(&mut self, record: &ItemRecord) {
        let (Some(service), Some(group)) = (record.service_id(), record.group()) else {
            return;
        };
        if let Some(buckets) = self.groups.get_mut(&service) {
            if let Some(members) = buckets.get_mut(group) {
                members.retain(|h| *h != record.handle());
                if members.is_empty() {
                    buckets.remove(group);
                }
            }
            if buckets.is_empty() {
                self.groups.remove(&service);
            }
        }
    }

    /// Insert a record into the bucket of its current group
    pub fn add_item_group(&mut self, handle: ItemHandle) -> bool {
        let Some(record) = self.records.get(&handle) else {
            return false;
        };
        let (Some(service), Some(group)) = (record.service_id(), record.group().cloned()) else {
            return false;
        };
        let members = self
            .groups
            .entry(service)
            .or_default()
            .entry(group)
            .or_default();
        if !members.contains(&handle) {
            members.push(handle);
        }
        true
    }

    /// Remove a record from the bucket of its current group
    pub fn remove_item_group(&mut self, handle: ItemHandle) -> bool {
        let Some(record) = self.records.get(&handle).cloned() else {
            return false;
        };
        self.unlink_group(&record);
        true
    }

    /// Move a record from its current group bucket to `group`
    pub fn update_item_group(&mut self, handle: ItemHandle, group: ItemGroupId) {
        self.remove_item_group(handle);
        if let Some(record) = self.records.get_mut(&handle) {
            record.set_group(Some(group));
        }
        self.add_item_group(handle);
    }

    /// Apply an outbound group id to a record. Blank ids and records without a
    /// service are ignored; an unchanged group is a no-op.
    pub fn assign_item_group(&mut self, handle: ItemHandle, group: &ItemGroupId) {
        if group.is_blank() {
            return;
        }
        let current = match self.records.get(&handle) {
            Some(record) if record.service_id().is_some() => record.group().cloned(),
            _ => return,
        };
        match current {
            Some(current) if &current == group => {}
            Some(_) => self.update_item_group(handle, group.clone()),
            None => {
                if let Some(record) = self.records.get_mut(&handle) {
                    record.set_group(Some(group.clone()));
                }
                self.add_item_group(handle);
            }
        }
    }

    /// Append every record of `from` into `to` and drop `from`
    pub fn merge_to_group_id(&mut self, service: ServiceId, from: &ItemGroupId, to: &ItemGroupId) {
        if from == to {
            return;
        }
        let Some(buckets) = self.groups.get_mut(&service) else {
            return;
        };
        let Some(moved) = buckets.remove(from) else {
            return;
        };
        let target = buckets.entry(to.clone()).or_default();
        for handle in &moved {
            if !target.contains(handle) {
                target.push(*handle);
            }
        }
        for handle in moved {
            if let Some(record) = self.records.get_mut(&handle) {
                record.set_group(Some(to.clone()));
            }
        }
    }

    /// Destroy every record of one group bucket
    pub fn remove_group_id(&mut self, service: ServiceId, group: &ItemGroupId) -> Vec<ItemRecord> {
        let members = match self.groups.get_mut(&service) {
            Some(buckets) => {
                let members = buckets.remove(group).unwrap_or_default();
                if buckets.is_empty() {
                    self.groups.remove(&service);
                }
                members
            }
            None => Vec::new(),
        };
        members
            .into_iter()
            .filter_map(|handle| self.remove_item(handle))
            .collect()
    }

    /// Drop every bucket of `service` and destroy every non-administrative
    /// record whose key references it
    pub fn remove_service_id(&mut self, service: ServiceId) -> Vec<ItemRecord> {
        self.groups.remove(&service);
        let doomed: Vec<ItemHandle> = self
            .items()
            .filter(|r| !r.domain().is_admin() && r.service_id() == Some(service))
            .map(ItemRecord::handle)
            .collect();
        doomed
            .into_iter()
            .filter_map(|handle| self.remove_item(handle))
            .collect()
    }

    /// Handles in one group bucket
    pub fn group_members(&self, service: ServiceId, group: &ItemGroupId) -> &[ItemHandle] {
        self.groups
            .get(&service)
            .and_then(|b| b.get(group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn group_count(&self, service: ServiceId) -> usize {
        self.groups.get(&service).map(HashMap::len).unwrap_or(0)
    }
}
