//! Item Record and Lifecycle State Machine
//!
//! An `ItemRecord` is one open subscription stream on one session. Its lifecycle
//! is Pending (request accepted) → Open (complete open/ok refresh sent) → Closed
//! (terminal). Transitions consume the current state and produce an audit entry.

use core::fmt;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::SessionError;
use crate::message::{MsgKey, RequestMsg};
use crate::types::{
    ChannelId, DomainType, ItemGroupId, ItemHandle, Qos, ServiceId, State, StreamId, StreamState,
    Timestamp,
};

/// Audit entries kept per record
const MAX_AUDIT_ENTRIES: usize = 8;

// ----------------------------------------------------------------------------
// Item State Machine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Pending,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    /// A refresh went out on the stream
    RefreshSent { complete: bool, open_ok: bool },
    /// A terminal refresh or status went out, or the stream was torn down
    Terminated { reason: String },
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: ItemState,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub handle: ItemHandle,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
}

impl ItemState {
    pub fn state_name(&self) -> &'static str {
        match self {
            ItemState::Pending => "Pending",
            ItemState::Open => "Open",
            ItemState::Closed => "Closed",
        }
    }

    /// Consume the state on `event`, producing the next state and its audit entry
    pub fn transition(
        self,
        handle: ItemHandle,
        event: ItemEvent,
        now: Timestamp,
    ) -> Result<StateTransition, StateTransitionError> {
        let from_state = self.state_name().to_string();
        let event_name = format!("{:?}", event);

        let new_state = match (self, &event) {
            (ItemState::Closed, _) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state,
                    event: event_name,
                    reason: "closed items are terminal".into(),
                });
            }
            (ItemState::Pending, ItemEvent::RefreshSent { complete, open_ok }) => {
                if *complete && *open_ok {
                    ItemState::Open
                } else {
                    ItemState::Pending
                }
            }
            (ItemState::Open, ItemEvent::RefreshSent { .. }) => ItemState::Open,
            (_, ItemEvent::Terminated { .. }) => ItemState::Closed,
        };

        Ok(StateTransition {
            new_state,
            audit_entry: AuditEntry {
                timestamp: now,
                handle,
                from_state,
                to_state: new_state.state_name().to_string(),
                event: event_name,
            },
        })
    }
}

/// Errors that can occur during item state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTransitionError::InvalidTransition {
                from_state,
                event,
                reason,
            } => write!(
                f,
                "Invalid transition from {} on event {}: {}",
                from_state, event, reason
            ),
        }
    }
}

impl std::error::Error for StateTransitionError {}

// ----------------------------------------------------------------------------
// Item Record
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemFlags {
    pub streaming: bool,
    pub private_stream: bool,
    pub group_set: bool,
}

/// Outcome of applying a reissue to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reissue {
    pub previous_key: MsgKey,
    pub service_changed: bool,
}

/// One open stream's identity and state
#[derive(Debug, Clone)]
pub struct ItemRecord {
    handle: ItemHandle,
    channel: ChannelId,
    stream_id: StreamId,
    domain: DomainType,
    key: MsgKey,
    service_name: Option<String>,
    qos: Option<Qos>,
    worst_qos: Option<Qos>,
    group: Option<ItemGroupId>,
    flags: ItemFlags,
    sent_refresh: bool,
    state: ItemState,
    posted_ids: SmallVec<[u32; 4]>,
    /// Insertion order within the owning session
    pub(crate) seq: u64,
    created_at: Timestamp,
    audit: Vec<AuditEntry>,
}

impl ItemRecord {
    /// Build a pending record from the request that opened the stream
    pub fn from_request(
        handle: ItemHandle,
        channel: ChannelId,
        request: &RequestMsg,
        service_name: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            handle,
            channel,
            stream_id: request.stream_id,
            domain: request.domain,
            key: request.key.clone(),
            service_name,
            qos: request.qos,
            worst_qos: request.worst_qos,
            group: None,
            flags: ItemFlags {
                streaming: request.streaming,
                private_stream: request.private_stream,
                group_set: false,
            },
            sent_refresh: false,
            state: ItemState::Pending,
            posted_ids: SmallVec::new(),
            seq: 0,
            created_at: now,
            audit: Vec::new(),
        }
    }

    pub fn handle(&self) -> ItemHandle {
        self.handle
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn domain(&self) -> DomainType {
        self.domain
    }

    pub fn key(&self) -> &MsgKey {
        &self.key
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        self.key.service_id
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    pub fn qos(&self) -> (Option<Qos>, Option<Qos>) {
        (self.qos, self.worst_qos)
    }

    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    pub fn is_streaming(&self) -> bool {
        self.flags.streaming
    }

    pub fn is_private(&self) -> bool {
        self.flags.private_stream
    }

    pub fn group(&self) -> Option<&ItemGroupId> {
        self.group.as_ref()
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn has_sent_refresh(&self) -> bool {
        self.sent_refresh
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn audit_trail(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Directory filter the consumer asked for
    pub fn filter(&self) -> u32 {
        self.key.filter.unwrap_or(0)
    }

    pub(crate) fn set_group(&mut self, group: Option<ItemGroupId>) {
        self.flags.group_set = group.is_some();
        self.group = group;
    }

    pub(crate) fn set_service_name(&mut self, name: Option<String>) {
        self.service_name = name;
    }

    /// Apply a reissue request. A changed service id is only accepted when
    /// `allow_service_change` is set.
    pub fn apply_reissue(
        &mut self,
        request: &RequestMsg,
        allow_service_change: bool,
    ) -> Result<Reissue, SessionError> {
        let service_changed = request.key.service_id.is_some()
            && self.key.service_id.is_some()
            && request.key.service_id != self.key.service_id;

        if service_changed && !allow_service_change {
            return Err(SessionError::ServiceChangeNotAllowed {
                stream_id: self.stream_id,
                from: self.key.service_id.unwrap_or(ServiceId(0)),
                to: request.key.service_id.unwrap_or(ServiceId(0)),
            });
        }

        let mut key = request.key.clone();
        if key.service_id.is_none() {
            key.service_id = self.key.service_id;
        }
        let previous_key = core::mem::replace(&mut self.key, key);
        self.flags.streaming = request.streaming;
        if request.qos.is_some() {
            self.qos = request.qos;
            self.worst_qos = request.worst_qos;
        }

        Ok(Reissue {
            previous_key,
            service_changed,
        })
    }

    /// Record a refresh sent on this stream
    pub fn mark_refresh_sent(
        &mut self,
        state: &State,
        complete: bool,
        now: Timestamp,
    ) -> Result<(), StateTransitionError> {
        self.sent_refresh = true;
        self.apply(
            ItemEvent::RefreshSent {
                complete,
                open_ok: state.is_open_ok(),
            },
            now,
        )
    }

    /// Move the record to Closed
    pub fn mark_closed<T: Into<String>>(
        &mut self,
        reason: T,
        now: Timestamp,
    ) -> Result<(), StateTransitionError> {
        self.apply(
            ItemEvent::Terminated {
                reason: reason.into(),
            },
            now,
        )
    }

    fn apply(&mut self, event: ItemEvent, now: Timestamp) -> Result<(), StateTransitionError> {
        let transition = self.state.transition(self.handle, event, now)?;
        self.state = transition.new_state;
        if self.audit.len() == MAX_AUDIT_ENTRIES {
            self.audit.remove(0);
        }
        self.audit.push(transition.audit_entry);
        Ok(())
    }

    /// Whether an outbound refresh or status with `state` ends this stream.
    /// `complete` is the refresh-complete flag; status messages pass true.
    pub fn is_terminal(&self, state: Option<&State>, complete: bool) -> bool {
        let stream_state = state.map(|s| s.stream_state);
        match stream_state {
            Some(StreamState::Closed)
            | Some(StreamState::ClosedRecover)
            | Some(StreamState::Redirected) => true,
            Some(StreamState::NonStreaming) => complete,
            _ => !self.flags.streaming && complete && self.sent_refresh,
        }
    }

    pub fn record_post(&mut self, post_id: u32) {
        if !self.posted_ids.contains(&post_id) {
            self.posted_ids.push(post_id);
        }
    }

    /// Consume a recorded post id; false when it was never received
    pub fn take_post(&mut self, ack_id: u32) -> bool {
        match self.posted_ids.iter().position(|id| *id == ack_id) {
            Some(index) => {
                self.posted_ids.remove(index);
                true
            }
            None => false,
        }
    }
}
