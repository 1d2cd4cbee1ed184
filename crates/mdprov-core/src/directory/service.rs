//! Service directory entries
//!
//! `Service` is one stored directory entry; `ServiceUpdate` is one entry of a
//! directory map as submitted by the application or sent to a consumer.

use serde::{Deserialize, Serialize};

use crate::message::filter;
use crate::types::{DomainType, ItemGroupId, Qos, ServiceId, State, StreamState};

// ----------------------------------------------------------------------------
// Filter Payloads
// ----------------------------------------------------------------------------

/// Service info filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceInfo {
    pub name: String,
    pub vendor: Option<String>,
    pub is_source: bool,
    pub capabilities: Vec<DomainType>,
    pub dictionaries_provided: Vec<String>,
    pub dictionaries_used: Vec<String>,
    pub qos: Vec<Qos>,
    pub supports_qos_range: bool,
    pub item_list: Option<String>,
    pub supports_out_of_band_snapshots: bool,
    pub accepting_consumer_status: bool,
}

/// Service state filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceState {
    /// 1 when the service is up
    pub service_state: u64,
    pub accepting_requests: Option<bool>,
    pub status: Option<State>,
}

impl ServiceState {
    pub fn up() -> Self {
        Self {
            service_state: 1,
            accepting_requests: Some(true),
            status: None,
        }
    }

    /// The state carries a closed-recover status
    pub fn is_closed_recover(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.stream_state == StreamState::ClosedRecover)
            .unwrap_or(false)
    }

    fn apply(&mut self, update: &ServiceState) {
        self.service_state = update.service_state;
        if update.accepting_requests.is_some() {
            self.accepting_requests = update.accepting_requests;
        }
        if update.status.is_some() {
            self.status = update.status.clone();
        }
    }
}

/// Service load filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceLoad {
    pub open_limit: Option<u64>,
    pub open_window: Option<u64>,
    pub load_factor: Option<u64>,
}

impl ServiceLoad {
    fn apply(&mut self, update: &ServiceLoad) {
        if update.open_limit.is_some() {
            self.open_limit = update.open_limit;
        }
        if update.open_window.is_some() {
            self.open_window = update.open_window;
        }
        if update.load_factor.is_some() {
            self.load_factor = update.load_factor;
        }
    }
}

/// One upstream link of the link filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceLink {
    pub name: String,
    pub link_type: u8,
    pub link_state: u8,
    pub link_code: u8,
    pub text: Option<String>,
}

/// Item-group status for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceGroupState {
    pub group: ItemGroupId,
    pub merged_to_group: Option<ItemGroupId>,
    pub status: Option<State>,
}

impl ServiceGroupState {
    pub fn is_closed_recover(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.stream_state == StreamState::ClosedRecover)
            .unwrap_or(false)
    }
}

// ----------------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------------

/// Action on a directory map entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapAction {
    Add,
    Update,
    Delete,
}

/// Action on one filter of a service entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterAction {
    Set,
    Update,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry<T> {
    pub action: FilterAction,
    pub value: T,
}

impl<T> FilterEntry<T> {
    pub fn set(value: T) -> Self {
        Self {
            action: FilterAction::Set,
            value,
        }
    }

    pub fn update(value: T) -> Self {
        Self {
            action: FilterAction::Update,
            value,
        }
    }
}

// ----------------------------------------------------------------------------
// Service Update (directory map entry)
// ----------------------------------------------------------------------------

/// One directory map entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    /// Wire-width id; values above 65535 are rejected
    pub service_id: u64,
    pub action: MapAction,
    pub info: Option<FilterEntry<ServiceInfo>>,
    pub state: Option<FilterEntry<ServiceState>>,
    pub load: Option<FilterEntry<ServiceLoad>>,
    pub links: Option<FilterEntry<Vec<ServiceLink>>>,
    pub groups: Vec<ServiceGroupState>,
}

impl ServiceUpdate {
    pub fn new(service_id: u64, action: MapAction) -> Self {
        Self {
            service_id,
            action,
            info: None,
            state: None,
            load: None,
            links: None,
            groups: Vec::new(),
        }
    }

    pub fn delete(service_id: u64) -> Self {
        Self::new(service_id, MapAction::Delete)
    }

    pub fn with_info(mut self, info: ServiceInfo) -> Self {
        self.info = Some(FilterEntry::set(info));
        self
    }

    pub fn with_state(mut self, action: FilterAction, state: ServiceState) -> Self {
        self.state = Some(FilterEntry { action, value: state });
        self
    }

    pub fn with_load(mut self, action: FilterAction, load: ServiceLoad) -> Self {
        self.load = Some(FilterEntry { action, value: load });
        self
    }

    pub fn with_links(mut self, action: FilterAction, links: Vec<ServiceLink>) -> Self {
        self.links = Some(FilterEntry { action, value: links });
        self
    }

    pub fn with_group(mut self, group: ServiceGroupState) -> Self {
        self.groups.push(group);
        self
    }

    /// Filter bits present in this entry
    pub fn filter_mask(&self) -> u32 {
        let mut mask = 0;
        if self.info.is_some() {
            mask |= filter::INFO;
        }
        if self.state.is_some() {
            mask |= filter::STATE;
        }
        if !self.groups.is_empty() {
            mask |= filter::GROUP;
        }
        if self.load.is_some() {
            mask |= filter::LOAD;
        }
        if self.links.is_some() {
            mask |= filter::LINK;
        }
        mask
    }
}

// ----------------------------------------------------------------------------
// Stored Service
// ----------------------------------------------------------------------------

/// One advertised service as held by the directory store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: ServiceId,
    pub info: Option<ServiceInfo>,
    pub state: Option<ServiceState>,
    pub load: Option<ServiceLoad>,
    pub links: Vec<ServiceLink>,
    pub group_states: Vec<ServiceGroupState>,
}

impl Service {
    pub fn new(service_id: ServiceId) -> Self {
        Self {
            service_id,
            info: None,
            state: None,
            load: None,
            links: Vec::new(),
            group_states: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.name.as_str())
    }

    /// Absent accepting-requests means the service accepts requests
    pub fn is_accepting_requests(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.accepting_requests)
            .unwrap_or(true)
    }

    pub(crate) fn apply_state(&mut self, entry: &FilterEntry<ServiceState>) {
        match entry.action {
            FilterAction::Set => self.state = Some(entry.value.clone()),
            FilterAction::Update => match self.state.as_mut() {
                Some(state) => state.apply(&entry.value),
                None => self.state = Some(entry.value.clone()),
            },
            FilterAction::Clear => self.state = None,
        }
    }

    pub(crate) fn apply_load(&mut self, entry: &FilterEntry<ServiceLoad>) {
        match entry.action {
            FilterAction::Set => self.load = Some(entry.value.clone()),
            FilterAction::Update => match self.load.as_mut() {
                Some(load) => load.apply(&entry.value),
                None => self.load = Some(entry.value.clone()),
            },
            FilterAction::Clear => self.load = None,
        }
    }

    pub(crate) fn apply_links(&mut self, entry: &FilterEntry<Vec<ServiceLink>>) {
        match entry.action {
            FilterAction::Set => self.links = entry.value.clone(),
            FilterAction::Update => {
                for link in &entry.value {
                    match self.links.iter_mut().find(|l| l.name == link.name) {
                        Some(existing) => *existing = link.clone(),
                        None => self.links.push(link.clone()),
                    }
                }
            }
            FilterAction::Clear => self.links.clear(),
        }
    }

    pub(crate) fn record_group_state(&mut self, group: &ServiceGroupState) {
        match self
            .group_states
            .iter_mut()
            .find(|g| g.group == group.group)
        {
            Some(existing) => *existing = group.clone(),
            None => self.group_states.push(group.clone()),
        }
    }

    /// Build the directory map entry for this service restricted to `request_filter`
    pub fn to_update(&self, request_filter: u32) -> ServiceUpdate {
        let mut update = ServiceUpdate::new(self.service_id.0 as u64, MapAction::Add);
        if request_filter & filter::INFO != 0 {
            update.info = self.info.clone().map(FilterEntry::set);
        }
        if request_filter & filter::STATE != 0 {
            update.state = self.state.clone().map(FilterEntry::set);
        }
        if request_filter & filter::LOAD != 0 {
            update.load = self.load.clone().map(FilterEntry::set);
        }
        if request_filter & filter::LINK != 0 && !self.links.is_empty() {
            update.links = Some(FilterEntry::set(self.links.clone()));
        }
        if request_filter & filter::GROUP != 0 {
            update.groups = self.group_states.clone();
        }
        update
    }
}
