//! Submission Engine
//!
//! The application-facing publish API. Every `submit_*` call resolves its handle
//! to a stream (or, for handle 0 on the administrative domains, to every open
//! stream of the domain), validates the message for its domain, sends it and
//! then applies the item-info post-condition: a terminal state removes the
//! record, and on the login domain closes the channel.
//!
//! Every error returned here is also passed to the `ErrorClient`.

#[cfg(not(feature = "std"))]
use log::{debug, info, warn};
#[cfg(feature = "std")]
use tracing::{debug, info, warn};

use crate::config::AdminControl;
use crate::directory::{encode_directory_msg, DirectoryChange, ServiceUpdate};
use crate::engine::{ProviderEngine, Target};
use crate::errors::ProviderError;
use crate::message::{
    AckMsg, DataType, GenericMsg, MapPayload, Message, MsgClass, MsgKey, Payload, RefreshMsg,
    StatusMsg, UpdateMsg,
};
use crate::types::{ChannelId, DomainType, ItemHandle, ServiceId, State};
use crate::Result;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

impl ProviderEngine {
    /// Send a refresh on `handle`, or to every stream of its domain when the handle is 0
    pub fn submit_refresh(&mut self, refresh: RefreshMsg, handle: ItemHandle) -> Result<()> {
        let result = self.submit_message(Message::Refresh(refresh), handle);
        self.report(result)
    }

    pub fn submit_update(&mut self, update: UpdateMsg, handle: ItemHandle) -> Result<()> {
        let result = self.submit_message(Message::Update(update), handle);
        self.report(result)
    }

    pub fn submit_status(&mut self, status: StatusMsg, handle: ItemHandle) -> Result<()> {
        let result = self.submit_message(Message::Status(status), handle);
        self.report(result)
    }

    pub fn submit_generic(&mut self, generic: GenericMsg, handle: ItemHandle) -> Result<()> {
        let result = self.submit_message(Message::Generic(generic), handle);
        self.report(result)
    }

    /// Acknowledge a post received on `handle`
    pub fn submit_ack(&mut self, ack: AckMsg, handle: ItemHandle) -> Result<()> {
        let result = self.submit_ack_inner(ack, handle);
        self.report(result)
    }

    // ------------------------------------------------------------------------
    // Item-info Post-condition
    // ------------------------------------------------------------------------

    /// Remove the record of `handle` when `state` ends its stream. A terminal
    /// login stream closes the whole channel.
    pub(crate) fn apply_item_info(&mut self, handle: ItemHandle, state: Option<&State>, complete: bool) {
        let Some(record) = self.lookup(handle) else {
            return;
        };
        if !record.is_terminal(state, complete) {
            return;
        }

        let channel = record.channel();
        if record.domain() == DomainType::LOGIN {
            info!("Login stream of {} closed, closing the channel", channel);
            self.close_channel(channel);
            return;
        }
        debug!(
            "Stream {} on {} reached a terminal state",
            record.stream_id(),
            channel
        );
        self.remove_item_info(handle);
    }
}

// ----------------------------------------------------------------------------
// Submission
// ----------------------------------------------------------------------------

fn fanout_supported(domain: DomainType) -> bool {
    matches!(
        domain,
        DomainType::LOGIN | DomainType::SOURCE | DomainType::DICTIONARY
    )
}

fn container_error(class: MsgClass, domain: &str, expected: DataType, actual: DataType) -> ProviderError {
    ProviderError::invalid_usage(format!(
        "Attempt to submit {} with {} domain using container with wrong data type. Expected container data type is {}. Passed in is {}",
        class, domain, expected, actual
    ))
}

/// Domain the message is published on when it is fanned out
fn message_domain(message: &Message) -> DomainType {
    message.domain().unwrap_or_default()
}

fn payload_of(message: &Message) -> Option<&Payload> {
    match message {
        Message::Refresh(m) => Some(&m.payload),
        Message::Update(m) => Some(&m.payload),
        Message::Status(m) => Some(&m.payload),
        Message::Generic(m) => Some(&m.payload),
        _ => None,
    }
}

impl ProviderEngine {
    fn submit_message(&mut self, message: Message, handle: ItemHandle) -> Result<()> {
        let class = message.class();

        if handle.is_fanout() {
            let domain = message_domain(&message);
            if !fanout_supported(domain) {
                return Err(ProviderError::invalid_usage(format!(
                    "Attempt to fanout {} with domain type {} while this is not supported.",
                    class, domain
                )));
            }
            self.validate(&message, domain)?;
            return self.fanout(message, domain);
        }

        let Some(target) = self.target(handle) else {
            return Err(ProviderError::invalid_usage(format!(
                "Attempt to submit {} with non existent Handle = {}.",
                class, handle
            )));
        };
        self.validate(&message, target.domain)?;

        let mut message = message;
        if !target.domain.is_admin() {
            self.resolve_item_service(&mut message)?;
        }

        if class == MsgClass::Update
            && !target.has_sent_refresh
            && self.policy().refresh_first_required
        {
            return Err(ProviderError::invalid_handle(
                handle,
                format!(
                    "Attempt to submit UpdateMsg while RefreshMsg was not submitted on this stream yet. Handle = {}.",
                    handle
                ),
            ));
        }

        if target.domain == DomainType::SOURCE {
            let changes = self.store_directory(&message)?;
            let sent = self.send_directory(&target, &message);
            self.apply_directory_changes(Some(target.channel), changes);
            return sent;
        }

        stamp(&mut message, &target);
        self.send(target.channel, &message)?;
        self.after_send(&target, &message);
        Ok(())
    }

    /// Per-domain rules that do not depend on the recipient
    fn validate(&self, message: &Message, domain: DomainType) -> Result<()> {
        let class = message.class();
        match (domain, class) {
            (DomainType::LOGIN, MsgClass::Update) => Err(ProviderError::invalid_usage(
                "Attempt to submit UpdateMsg with login domain while this is not supported.",
            )),
            (DomainType::DICTIONARY, MsgClass::Update) => Err(ProviderError::invalid_usage(
                "Attempt to submit UpdateMsg with dictionary domain while this is not supported.",
            )),
            (DomainType::DICTIONARY, MsgClass::Generic) => Err(ProviderError::invalid_usage(
                "Attempt to submit GenericMsg with Dictionary domain while this is not supported.",
            )),
            (DomainType::SOURCE, MsgClass::Refresh | MsgClass::Update) => {
                match payload_of(message).map(Payload::data_type) {
                    Some(DataType::Map) => Ok(()),
                    Some(actual) => Err(container_error(class, "SourceDirectory", DataType::Map, actual)),
                    None => Ok(()),
                }
            }
            (DomainType::DICTIONARY, MsgClass::Refresh) => {
                match payload_of(message).map(Payload::data_type) {
                    Some(DataType::Series) => Ok(()),
                    Some(actual) => Err(container_error(class, "Dictionary", DataType::Series, actual)),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Replace a service name with its id; an explicit id must be advertised
    fn resolve_item_service(&self, message: &mut Message) -> Result<()> {
        let class = message.class();
        let (key, service_name) = match message {
            Message::Refresh(m) => (&mut m.key, m.service_name.as_deref()),
            Message::Update(m) => (&mut m.key, m.service_name.as_deref()),
            Message::Status(m) => (&mut m.key, m.service_name.as_deref()),
            _ => return Ok(()),
        };

        if let Some(name) = service_name {
            let id = self.directory.service_id_by_name(name).ok_or_else(|| {
                ProviderError::invalid_usage(format!(
                    "Attempt to submit {} with service name of {} that was not included in the SourceDirectory. Dropping this {}.",
                    class, name, class
                ))
            })?;
            key.service_id = Some(id);
        } else if let Some(id) = key.service_id {
            if self.directory.service(id).is_none() {
                return Err(ProviderError::invalid_usage(format!(
                    "Attempt to submit {} with service Id of {} that was not included in the SourceDirectory. Dropping this {}.",
                    class, id, class
                )));
            }
        }
        Ok(())
    }

    fn fanout(&mut self, message: Message, domain: DomainType) -> Result<()> {
        let changes = if domain == DomainType::SOURCE {
            self.store_directory(&message)?
        } else {
            Vec::new()
        };

        let handles = self.domain_items.list(domain).to_vec();
        let class = message.class();
        let mut first_error = None;
        let mut delivered = 0usize;

        for handle in handles {
            let Some(target) = self.target(handle) else {
                continue;
            };
            if class == MsgClass::Update && !target.has_sent_refresh {
                warn!(
                    "Skipping fan-out of UpdateMsg to stream {} on {}: no refresh sent yet",
                    target.stream_id, target.channel
                );
                continue;
            }

            let sent = if domain == DomainType::SOURCE {
                self.send_directory(&target, &message)
            } else {
                let mut copy = message.clone();
                stamp(&mut copy, &target);
                self.send(target.channel, &copy)
                    .map(|()| self.after_send(&target, &copy))
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        debug!("Fanned out {} to {} {} streams", class, delivered, domain);
        self.apply_directory_changes(None, changes);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit_ack_inner(&mut self, ack: AckMsg, handle: ItemHandle) -> Result<()> {
        let Some(target) = self.target(handle) else {
            return Err(ProviderError::invalid_usage(format!(
                "Attempt to submit AckMsg with non existent Handle = {}.",
                handle
            )));
        };

        let validate = self.policy().enforce_ack_id_validation;
        if validate {
            let known = self
                .lookup_mut(handle)
                .map(|record| record.take_post(ack.ack_id))
                .unwrap_or(false);
            if !known {
                return Err(ProviderError::invalid_usage(format!(
                    "Attempt to submit AckMsg with ack id {} that does not match any PostMsg received on this stream. Handle = {}.",
                    ack.ack_id, handle
                )));
            }
        }

        let mut message = Message::Ack(ack);
        stamp(&mut message, &target);
        let sent = self.send(target.channel, &message);
        if sent.is_err() && validate {
            if let (Some(record), Message::Ack(ack)) = (self.lookup_mut(handle), &message) {
                record.record_post(ack.ack_id);
            }
        }
        sent
    }

    /// Record-level effects of a message that reached the transport
    fn after_send(&mut self, target: &Target, message: &Message) {
        let now = self.now();
        match message {
            Message::Refresh(refresh) => {
                if let Some(record) = self.lookup_mut(target.handle) {
                    if let Err(err) = record.mark_refresh_sent(&refresh.state, refresh.complete, now) {
                        debug!("{}", err);
                    }
                }
                if let Some(group) = refresh.group_id.as_ref() {
                    self.assign_group(target, group);
                }
                if target.domain == DomainType::LOGIN && refresh.state.is_open_ok() {
                    if let Some(session) = self.sessions.get_mut(target.channel) {
                        session.set_logged_in(true);
                        info!("{} logged in", target.channel);
                    }
                }
                if target.domain == DomainType::DICTIONARY
                    && refresh.complete
                    && refresh.state.is_open_ok()
                {
                    if let Some(name) = target.key.name.as_deref() {
                        self.distributor.mark_delivered(target.channel, name);
                    }
                }
                self.apply_item_info(target.handle, Some(&refresh.state), refresh.complete);
            }
            Message::Status(status) => {
                if let Some(group) = status.group_id.as_ref() {
                    self.assign_group(target, group);
                }
                if status.state.is_some() {
                    self.apply_item_info(target.handle, status.state.as_ref(), true);
                }
            }
            _ => {}
        }
    }

    fn assign_group(&mut self, target: &Target, group: &crate::types::ItemGroupId) {
        if let Some(session) = self.sessions.get_mut(target.channel) {
            session.assign_item_group(target.handle, group);
        }
    }

    // ------------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------------

    /// Apply a directory payload to the store. Under user admin control only the
    /// id/name pairs are recorded.
    fn store_directory(&mut self, message: &Message) -> Result<Vec<DirectoryChange>> {
        let Some(updates) = payload_of(message).and_then(Payload::directory) else {
            return Ok(Vec::new());
        };
        let store = self.directory.admin_control() == AdminControl::Api;
        Ok(self.directory.submit(updates, store)?)
    }

    /// Send a directory message to one stream, filtered to what it asked for
    fn send_directory(&mut self, target: &Target, message: &Message) -> Result<()> {
        let mut copy = message.clone();
        if let Some(updates) = payload_of(message).and_then(Payload::directory) {
            let filtered = filter_for(updates, target);
            if target.key.service_id.is_some() && filtered.is_empty() {
                debug!(
                    "Directory stream {} on {} asked for another service",
                    target.stream_id, target.channel
                );
                return Ok(());
            }
            set_payload(&mut copy, Payload::Map(MapPayload::Directory(filtered)));
        }

        stamp(&mut copy, target);
        if let Some(key) = key_mut(&mut copy) {
            key.filter = Some(target.filter());
        }
        self.send(target.channel, &copy)?;
        self.after_send(target, &copy);
        Ok(())
    }

    /// Invalidate records affected by directory changes, in one session or all of them
    pub(crate) fn apply_directory_changes(
        &mut self,
        scope: Option<ChannelId>,
        changes: Vec<DirectoryChange>,
    ) {
        if changes.is_empty() {
            return;
        }
        let channels = match scope {
            Some(channel) => vec![channel],
            None => self.sessions.channels(),
        };

        for change in &changes {
            for channel in &channels {
                let Some(session) = self.sessions.get_mut(*channel) else {
                    continue;
                };
                let removed = match change {
                    DirectoryChange::ServiceDeleted { service_id } => {
                        session.remove_service_id(*service_id)
                    }
                    DirectoryChange::ServiceStateChanged { service_id, state } => {
                        if state.is_closed_recover() {
                            session.remove_service_id(*service_id)
                        } else {
                            Vec::new()
                        }
                    }
                    DirectoryChange::GroupChanged { service_id, group } => {
                        if let Some(merged_to) = group.merged_to_group.as_ref() {
                            session.merge_to_group_id(*service_id, &group.group, merged_to);
                        }
                        if group.is_closed_recover() {
                            session.remove_group_id(*service_id, &group.group)
                        } else {
                            Vec::new()
                        }
                    }
                };
                if !removed.is_empty() {
                    info!(
                        "Directory change {:?} removed {} items on {}",
                        change_service(change),
                        removed.len(),
                        channel
                    );
                }
                self.release_records(removed);
            }
        }
    }
}

fn change_service(change: &DirectoryChange) -> ServiceId {
    match change {
        DirectoryChange::ServiceDeleted { service_id }
        | DirectoryChange::ServiceStateChanged { service_id, .. }
        | DirectoryChange::GroupChanged { service_id, .. } => *service_id,
    }
}

fn filter_for(updates: &[ServiceUpdate], target: &Target) -> Vec<ServiceUpdate> {
    encode_directory_msg(updates, target.filter(), target.key.service_id).services
}

// ----------------------------------------------------------------------------
// Message Stamping
// ----------------------------------------------------------------------------

fn key_mut(message: &mut Message) -> Option<&mut MsgKey> {
    match message {
        Message::Refresh(m) => Some(&mut m.key),
        Message::Update(m) => Some(&mut m.key),
        Message::Status(m) => Some(&mut m.key),
        Message::Generic(m) => Some(&mut m.key),
        Message::Ack(m) => Some(&mut m.key),
        _ => None,
    }
}

fn set_payload(message: &mut Message, payload: Payload) {
    match message {
        Message::Refresh(m) => m.payload = payload,
        Message::Update(m) => m.payload = payload,
        Message::Status(m) => m.payload = payload,
        Message::Generic(m) => m.payload = payload,
        _ => {}
    }
}

/// Address a submitted message to the stream of `target`
fn stamp(message: &mut Message, target: &Target) {
    match message {
        Message::Refresh(m) => {
            m.stream_id = target.stream_id;
            m.domain = target.domain;
            m.private_stream = target.private_stream;
        }
        Message::Update(m) => {
            m.stream_id = target.stream_id;
            m.domain = target.domain;
        }
        Message::Status(m) => {
            m.stream_id = target.stream_id;
            m.domain = target.domain;
            m.private_stream = target.private_stream;
        }
        Message::Generic(m) => {
            m.stream_id = target.stream_id;
            m.domain = Some(target.domain);
        }
        Message::Ack(m) => {
            m.stream_id = target.stream_id;
            m.domain = target.domain;
        }
        Message::Request(_) | Message::Close(_) | Message::Post(_) => {}
    }

    if let Some(key) = key_mut(message) {
        if key.name.is_none() && key.service_id.is_none() {
            *key = MsgKey {
                filter: key.filter.or(target.key.filter),
                ..target.key.clone()
            };
        }
    }
}
