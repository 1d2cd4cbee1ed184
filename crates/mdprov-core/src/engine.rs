//! Provider Engine
//!
//! Owns every session, the handle table, the directory and dictionary stores
//! and the timer queue. Transport events come in through `on_channel_up`,
//! `on_channel_down` and `on_message`; the application publishes through the
//! `submit_*` methods in `submission.rs`. The engine performs no I/O and never
//! blocks: outbound bytes go to the `ChannelTransport`, multi-part work is
//! resumed from `process_timers`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "std"))]
use log::{debug, error, info, warn};
#[cfg(feature = "std")]
use tracing::{debug, error, info, warn};

use crate::client::{ErrorClient, ProviderClient, ProviderEvent};
use crate::codec::{BincodeCodec, MessageCodec};
use crate::config::{ProviderConfig, ServiceRef, SessionPolicyConfig, SharedProviderConfig};
use crate::dictionary::{
    DictionaryDistributor, DictionaryPayload, DictionaryStore, EnumTypeTables, FieldDictionary,
};
use crate::directory::{Service, ServiceDirectoryStore};
use crate::errors::{ProviderError, SessionError, TransportError};
use crate::handlers;
use crate::handles::HandleTable;
use crate::item::ItemRecord;
use crate::manager::SessionManager;
use crate::message::{Message, MsgKey, RequestMsg, StatusMsg};
use crate::session::SessionRegistry;
use crate::timer::{ScheduledTask, TimerQueue};
use crate::transport::{ChannelInfo, ChannelTransport, SubmitStatus};
use crate::types::{
    ChannelId, DomainType, ItemHandle, ServiceId, State, StatusCode, StreamId, SystemTimeSource,
    TimeSource, Timestamp,
};
use crate::Result;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters kept by one protocol handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerStats {
    pub messages: u64,
    pub requests: u64,
    pub reissues: u64,
    pub closes: u64,
    pub rejects: u64,
}

/// Engine-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub channels_accepted: u64,
    pub channels_closed: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub decode_errors: u64,
    pub transport_failures: u64,
    pub items_opened: u64,
    pub items_closed: u64,
    pub dictionary_parts_sent: u64,
    pub login: HandlerStats,
    pub directory: HandlerStats,
    pub dictionary: HandlerStats,
    pub item: HandlerStats,
}

impl EngineStats {
    pub fn handler(&self, domain: DomainType) -> &HandlerStats {
        match domain {
            DomainType::LOGIN => &self.login,
            DomainType::SOURCE => &self.directory,
            DomainType::DICTIONARY => &self.dictionary,
            _ => &self.item,
        }
    }

    pub(crate) fn handler_mut(&mut self, domain: DomainType) -> &mut HandlerStats {
        match domain {
            DomainType::LOGIN => &mut self.login,
            DomainType::SOURCE => &mut self.directory,
            DomainType::DICTIONARY => &mut self.dictionary,
            _ => &mut self.item,
        }
    }
}

// ----------------------------------------------------------------------------
// Per-Domain Item Lists
// ----------------------------------------------------------------------------

/// Open handles per protocol handler, in open order
#[derive(Debug, Clone, Default)]
pub(crate) struct DomainItems {
    login: Vec<ItemHandle>,
    directory: Vec<ItemHandle>,
    dictionary: Vec<ItemHandle>,
    item: Vec<ItemHandle>,
}

impl DomainItems {
    pub(crate) fn list(&self, domain: DomainType) -> &[ItemHandle] {
        match domain {
            DomainType::LOGIN => &self.login,
            DomainType::SOURCE => &self.directory,
            DomainType::DICTIONARY => &self.dictionary,
            _ => &self.item,
        }
    }

    fn list_mut(&mut self, domain: DomainType) -> &mut Vec<ItemHandle> {
        match domain {
            DomainType::LOGIN => &mut self.login,
            DomainType::SOURCE => &mut self.directory,
            DomainType::DICTIONARY => &mut self.dictionary,
            _ => &mut self.item,
        }
    }

    fn add(&mut self, domain: DomainType, handle: ItemHandle) {
        self.list_mut(domain).push(handle);
    }

    fn remove(&mut self, handle: ItemHandle) {
        for list in [
            &mut self.login,
            &mut self.directory,
            &mut self.dictionary,
            &mut self.item,
        ] {
            if let Some(index) = list.iter().position(|h| *h == handle) {
                list.remove(index);
                return;
            }
        }
    }
}

/// Copy of the routing details of one record
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub handle: ItemHandle,
    pub channel: ChannelId,
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub private_stream: bool,
    pub has_sent_refresh: bool,
}

impl Target {
    fn of(record: &ItemRecord) -> Self {
        Self {
            handle: record.handle(),
            channel: record.channel(),
            stream_id: record.stream_id(),
            domain: record.domain(),
            key: record.key().clone(),
            private_stream: record.is_private(),
            has_sent_refresh: record.has_sent_refresh(),
        }
    }

    pub fn filter(&self) -> u32 {
        self.key.filter.unwrap_or(0)
    }
}

/// Request carrying the last known identity of a record, passed to `on_close`
pub(crate) fn close_notice(record: &ItemRecord) -> RequestMsg {
    let mut request = RequestMsg::new(record.stream_id().0, record.domain(), record.key().clone());
    request.service_name = record.service_name().map(str::to_string);
    request.streaming = record.is_streaming();
    request.private_stream = record.is_private();
    let (qos, worst_qos) = record.qos();
    request.qos = qos;
    request.worst_qos = worst_qos;
    request
}

// ----------------------------------------------------------------------------
// Provider Engine
// ----------------------------------------------------------------------------

pub struct ProviderEngine {
    pub(crate) config: SharedProviderConfig,
    pub(crate) sessions: SessionManager,
    pub(crate) handles: HandleTable,
    pub(crate) directory: ServiceDirectoryStore,
    pub(crate) dictionaries: DictionaryStore,
    pub(crate) distributor: DictionaryDistributor,
    pub(crate) timers: TimerQueue<ScheduledTask>,
    pub(crate) domain_items: DomainItems,
    pub(crate) stats: EngineStats,
    codec: Box<dyn MessageCodec>,
    transport: Box<dyn ChannelTransport>,
    client: Option<Box<dyn ProviderClient>>,
    error_client: Option<Box<dyn ErrorClient>>,
    time: Arc<dyn TimeSource>,
    closure: Option<u64>,
}

impl ProviderEngine {
    pub fn builder(config: ProviderConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn policy(&self) -> &SessionPolicyConfig {
        &self.config.session
    }

    pub fn now(&self) -> Timestamp {
        self.time.now()
    }

    // ------------------------------------------------------------------------
    // Channel Lifecycle
    // ------------------------------------------------------------------------

    /// A connection was accepted by the transport
    pub fn on_channel_up(&mut self, channel: ChannelId, info: ChannelInfo) -> Result<()> {
        let now = self.now();
        self.sessions.accept(channel, info, now)?;
        self.stats.channels_accepted += 1;
        Ok(())
    }

    /// The transport lost a connection. The login stream's close is delivered
    /// to the application before every record of the session is destroyed.
    pub fn on_channel_down(&mut self, channel: ChannelId, reason: &str) {
        info!("{} down: {}", channel, reason);

        let login = self
            .sessions
            .get(channel)
            .and_then(SessionRegistry::login_item)
            .and_then(|handle| self.lookup(handle))
            .map(|record| (record.handle(), close_notice(record)));
        if let Some((handle, notice)) = login {
            self.notify(handle, channel, |client, event| client.on_close(&notice, event));
        }

        self.teardown_channel(channel);
    }

    /// Close a channel from the provider side; no close callbacks are delivered
    pub fn close_channel(&mut self, channel: ChannelId) {
        self.transport.close(channel);
        self.teardown_channel(channel);
    }

    fn teardown_channel(&mut self, channel: ChannelId) -> bool {
        let Some(mut session) = self.sessions.remove(channel) else {
            return false;
        };

        let closed = session.close_all();
        let items = closed.len();
        self.release_records(closed);
        let timers = self.timers.cancel_where(|task| task.channel() == channel);
        let pending = self.distributor.cancel_channel(channel);
        self.stats.channels_closed += 1;

        info!(
            "Closed {}: {} items, {} pending dictionaries, {} timers",
            channel, items, pending, timers
        );
        true
    }

    // ------------------------------------------------------------------------
    // Inbound Messages
    // ------------------------------------------------------------------------

    /// Decode and dispatch one inbound message. Undecodable input is logged and dropped.
    pub fn on_message(&mut self, channel: ChannelId, bytes: &[u8]) -> Result<()> {
        let message = match self.codec.decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                self.stats.decode_errors += 1;
                warn!("Dropping undecodable message on {}: {}", channel, err);
                return Ok(());
            }
        };
        self.on_decoded_message(channel, message)
    }

    /// Dispatch a decoded message to the handler of its domain
    pub fn on_decoded_message(&mut self, channel: ChannelId, message: Message) -> Result<()> {
        if self.sessions.get(channel).is_none() {
            warn!("Dropping {} for unknown {}", message.class(), channel);
            return Err(SessionError::SessionNotFound { channel }.into());
        }
        self.stats.messages_received += 1;

        let domain = message
            .domain()
            .or_else(|| {
                let session = self.sessions.get(channel)?;
                let handle = session.find_by_stream(message.stream_id())?;
                session.get(handle).map(ItemRecord::domain)
            })
            .unwrap_or_default();

        let handler = handlers::handler_for(domain);
        debug!(
            "Received {} on {} stream {} for the {} handler",
            message.class(),
            channel,
            message.stream_id(),
            handler.name()
        );
        self.stats.handler_mut(domain).messages += 1;
        handler.on_message(self, channel, message)
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Run every timer task that is due. Returns the number of tasks run.
    pub fn process_timers(&mut self) -> usize {
        let due = self.timers.pop_due(self.now());
        let count = due.len();
        for task in due {
            match task {
                ScheduledTask::DictionaryPart { channel, pending } => {
                    let Some(pending) = self.distributor.take(pending) else {
                        debug!("Dictionary stream on {} was cancelled", channel);
                        continue;
                    };
                    if let Err(err) = self.continue_dictionary(pending) {
                        warn!("Dictionary part on {} failed: {}", channel, err);
                    }
                }
            }
        }
        count
    }

    // ------------------------------------------------------------------------
    // Outbound Plumbing
    // ------------------------------------------------------------------------

    /// Length of `message` once encoded for the wire
    pub(crate) fn encoded_len(&self, message: &Message) -> Result<usize> {
        Ok(self.codec.encode(message)?.len())
    }

    /// Encode `message` and submit it on `channel`
    pub(crate) fn send(&mut self, channel: ChannelId, message: &Message) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        match self.transport.submit(channel, &bytes) {
            SubmitStatus::Success => {
                self.stats.messages_sent += 1;
                self.stats.bytes_sent += bytes.len() as u64;
                Ok(())
            }
            SubmitStatus::Retryable { reason } => {
                self.stats.transport_failures += 1;
                let reason = format!("{} ({})", reason, self.diagnostics(channel));
                warn!("Submit of {} on {} would block: {}", message.class(), channel, reason);
                Err(TransportError::WouldBlock { channel, reason }.into())
            }
            SubmitStatus::Fatal { reason } => {
                self.stats.transport_failures += 1;
                let reason = format!("{} ({})", reason, self.diagnostics(channel));
                error!("Submit of {} on {} failed: {}", message.class(), channel, reason);
                Err(ProviderError::transport_failure(channel, reason))
            }
        }
    }

    fn diagnostics(&self, channel: ChannelId) -> String {
        self.sessions
            .connection_info(channel)
            .map(ChannelInfo::diagnostics)
            .unwrap_or_else(|| format!("{} has no connection info", channel))
    }

    /// Send a closed-recover/suspect status for a request that was refused
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn send_reject(
        &mut self,
        channel: ChannelId,
        stream_id: StreamId,
        domain: DomainType,
        key: MsgKey,
        private_stream: bool,
        code: StatusCode,
        text: &str,
    ) -> Result<()> {
        warn!("Rejecting {} stream {} on {}: {}", domain, stream_id, channel, text);
        self.stats.handler_mut(domain).rejects += 1;
        let status = StatusMsg {
            stream_id,
            domain,
            key,
            state: Some(State::reject(code, text)),
            private_stream,
            ..StatusMsg::default()
        };
        self.send(channel, &Message::Status(status))
    }

    /// Surface an application-facing result to the error client
    pub(crate) fn report<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!("{}", err);
            if let Some(mut error_client) = self.error_client.take() {
                error_client.on_error(err);
                self.error_client = Some(error_client);
            }
        }
        result
    }

    /// Invoke the application client with re-entrant engine access. Nested
    /// callbacks (a callback triggering another) are not delivered.
    pub(crate) fn notify<F>(&mut self, handle: ItemHandle, channel: ChannelId, callback: F)
    where
        F: FnOnce(&mut dyn ProviderClient, &mut ProviderEvent<'_>),
    {
        let Some(mut client) = self.client.take() else {
            debug!("No client to notify for {} on {}", handle, channel);
            return;
        };
        let closure = self.closure;
        {
            let mut event = ProviderEvent::new(handle, channel, closure, self);
            callback(client.as_mut(), &mut event);
        }
        self.client = Some(client);
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// Allocate a handle and build a pending record; nothing is linked yet
    pub(crate) fn new_record(
        &mut self,
        channel: ChannelId,
        request: &RequestMsg,
        service_name: Option<String>,
    ) -> Result<ItemRecord> {
        let handle = self.handles.allocate(channel).map_err(|err| {
            error!("Cannot open stream {} on {}: {}", request.stream_id, channel, err);
            ProviderError::from(err)
        })?;
        Ok(ItemRecord::from_request(
            handle,
            channel,
            request,
            service_name,
            self.now(),
        ))
    }

    /// Release the handle of a record that was never linked
    pub(crate) fn discard_record(&mut self, record: ItemRecord) {
        self.handles.release(record.handle());
    }

    /// Link a record into its session and its handler's list
    pub(crate) fn link_record(&mut self, record: ItemRecord) -> Result<ItemHandle> {
        let handle = record.handle();
        let channel = record.channel();
        let domain = record.domain();
        let stream_id = record.stream_id();

        let linked = match self.sessions.get_mut(channel) {
            Some(session) => {
                let linked = session.add_item(record);
                if linked && domain == DomainType::LOGIN {
                    session.set_login_item(handle);
                }
                linked
            }
            None => false,
        };
        if !linked {
            self.handles.release(handle);
            return Err(SessionError::StreamInUse { channel, stream_id }.into());
        }

        self.domain_items.add(domain, handle);
        self.stats.items_opened += 1;
        Ok(handle)
    }

    /// Unlink a record from its session and every index, returning it
    pub(crate) fn remove_item_info(&mut self, handle: ItemHandle) -> Option<ItemRecord> {
        let channel = self.handles.resolve(handle)?;
        let now = self.now();
        let removed = self
            .sessions
            .get_mut(channel)
            .and_then(|session| session.remove_item(handle));
        self.forget(handle);

        let mut record = removed?;
        if let Err(err) = record.mark_closed("stream removed", now) {
            debug!("{}", err);
        }
        Some(record)
    }

    /// Release the handles of records already unlinked from their session
    pub(crate) fn release_records(&mut self, records: Vec<ItemRecord>) {
        for record in records {
            debug!(
                "Destroying {} stream {} on {}",
                record.domain(),
                record.stream_id(),
                record.channel()
            );
            self.forget(record.handle());
        }
    }

    fn forget(&mut self, handle: ItemHandle) {
        if self.handles.release(handle) {
            self.stats.items_closed += 1;
        }
        self.domain_items.remove(handle);
        self.distributor.remove_listener(handle);
        self.distributor.cancel_handle(handle);
    }

    pub(crate) fn target(&self, handle: ItemHandle) -> Option<Target> {
        self.lookup(handle).map(Target::of)
    }

    pub(crate) fn lookup_mut(&mut self, handle: ItemHandle) -> Option<&mut ItemRecord> {
        let channel = self.handles.resolve(handle)?;
        self.sessions.get_mut(channel)?.get_mut(handle)
    }

    // ------------------------------------------------------------------------
    // Unsupported Consumer-side Calls
    // ------------------------------------------------------------------------

    pub fn register_client(&mut self, _request: &RequestMsg) -> Result<ItemHandle> {
        self.report(Err(ProviderError::invalid_usage(
            "Calling the ProviderEngine::register_client() method is not supported in this release.",
        )))
    }

    pub fn reissue(&mut self, _request: &RequestMsg, _handle: ItemHandle) -> Result<()> {
        self.report(Err(ProviderError::invalid_usage(
            "Calling the ProviderEngine::reissue() method is not supported in this release.",
        )))
    }

    pub fn unregister(&mut self, _handle: ItemHandle) -> Result<()> {
        self.report(Err(ProviderError::invalid_usage(
            "Calling the ProviderEngine::unregister() method is not supported in this release.",
        )))
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Open handles of one domain, in open order
    pub fn open_items(&self, domain: DomainType) -> Vec<ItemHandle> {
        self.domain_items
            .list(domain)
            .iter()
            .copied()
            .filter(|handle| {
                self.lookup(*handle)
                    .map(|record| record.domain() == domain)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn lookup(&self, handle: ItemHandle) -> Option<&ItemRecord> {
        let channel = self.handles.resolve(handle)?;
        self.sessions.get(channel)?.get(handle)
    }

    pub fn directory(&self) -> &ServiceDirectoryStore {
        &self.directory
    }

    pub fn dictionaries(&self) -> &DictionaryStore {
        &self.dictionaries
    }

    pub fn session(&self, channel: ChannelId) -> Option<&SessionRegistry> {
        self.sessions.get(channel)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.sessions.channels()
    }

    pub fn connection_info(&self, channel: ChannelId) -> Option<&ChannelInfo> {
        self.sessions.connection_info(channel)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn is_dictionary_delivered(&self, channel: ChannelId, name: &str) -> bool {
        self.distributor.is_delivered(channel, name)
    }
}

// ----------------------------------------------------------------------------
// Engine Builder
// ----------------------------------------------------------------------------

/// Builder for a `ProviderEngine`
pub struct EngineBuilder {
    config: SharedProviderConfig,
    codec: Option<Box<dyn MessageCodec>>,
    transport: Option<Box<dyn ChannelTransport>>,
    client: Option<Box<dyn ProviderClient>>,
    error_client: Option<Box<dyn ErrorClient>>,
    time_source: Option<Arc<dyn TimeSource>>,
    closure: Option<u64>,
    field_dictionary: Option<FieldDictionary>,
    enum_tables: Option<EnumTypeTables>,
}

impl EngineBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_shared_config(config.into_shared())
    }

    pub fn with_shared_config(config: SharedProviderConfig) -> Self {
        Self {
            config,
            codec: None,
            transport: None,
            client: None,
            error_client: None,
            time_source: None,
            closure: None,
            field_dictionary: None,
            enum_tables: None,
        }
    }

    pub fn codec(mut self, codec: Box<dyn MessageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn transport(mut self, transport: Box<dyn ChannelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn client(mut self, client: Box<dyn ProviderClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn error_client(mut self, error_client: Box<dyn ErrorClient>) -> Self {
        self.error_client = Some(error_client);
        self
    }

    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Opaque value handed back in every `ProviderEvent`
    pub fn closure(mut self, closure: u64) -> Self {
        self.closure = Some(closure);
        self
    }

    pub fn field_dictionary(mut self, dictionary: FieldDictionary) -> Self {
        self.field_dictionary = Some(dictionary);
        self
    }

    pub fn enum_tables(mut self, tables: EnumTypeTables) -> Self {
        self.enum_tables = Some(tables);
        self
    }

    pub fn build(self) -> Result<ProviderEngine> {
        self.config.validate().map_err(ProviderError::config_error)?;
        let transport = self
            .transport
            .ok_or_else(|| ProviderError::config_error("A channel transport is required"))?;

        let config = self.config;
        let directory = build_directory(&config)?;
        let dictionaries = load_dictionaries(
            &config,
            &directory,
            self.field_dictionary,
            self.enum_tables,
        )?;

        info!(
            "Provider engine ready: {} services, {} dictionaries",
            directory.len(),
            dictionaries.len()
        );

        Ok(ProviderEngine {
            sessions: SessionManager::new(
                config.session.max_sessions,
                config.session.detects_duplicate_keys(),
            ),
            handles: HandleTable::new(config.session.max_items),
            directory,
            dictionaries,
            distributor: DictionaryDistributor::new(),
            timers: TimerQueue::new(),
            domain_items: DomainItems::default(),
            stats: EngineStats::default(),
            codec: self.codec.unwrap_or_else(|| Box::new(BincodeCodec::new())),
            transport,
            client: self.client,
            error_client: self.error_client,
            time: self
                .time_source
                .unwrap_or_else(|| Arc::new(SystemTimeSource::new())),
            closure: self.closure,
            config,
        })
    }
}

fn build_directory(config: &ProviderConfig) -> Result<ServiceDirectoryStore> {
    let control = config.directory.admin_control;
    if config.directory.services.is_empty() {
        return Ok(ServiceDirectoryStore::with_default_service(control));
    }

    let mut directory = ServiceDirectoryStore::new(control);
    for definition in &config.directory.services {
        let mut service = Service::new(ServiceId(definition.id));
        service.info = Some(definition.info.clone());
        service.state = Some(definition.state.clone());
        directory.add_service(service)?;
    }
    Ok(directory)
}

fn load_dictionaries(
    config: &ProviderConfig,
    directory: &ServiceDirectoryStore,
    field_dictionary: Option<FieldDictionary>,
    enum_tables: Option<EnumTypeTables>,
) -> Result<DictionaryStore> {
    let settings = &config.dictionary;

    let field_dictionary = match (field_dictionary, settings.field_dictionary_path.as_deref()) {
        (Some(dictionary), _) => Some(dictionary),
        (None, Some(path)) => Some(FieldDictionary::from_rdm_str(&read_definition(path)?)?),
        (None, None) => None,
    };
    let enum_tables = match (enum_tables, settings.enum_dictionary_path.as_deref()) {
        (Some(tables), _) => Some(tables),
        (None, Some(path)) => Some(EnumTypeTables::from_enum_def_str(&read_definition(path)?)?),
        (None, None) => None,
    };

    let mut store = DictionaryStore::new();
    if field_dictionary.is_none() && enum_tables.is_none() {
        return Ok(store);
    }

    let service = match &settings.field_dictionary_service {
        ServiceRef::Id(id) => ServiceId(*id),
        ServiceRef::Name(name) => directory.service_id_by_name(name).ok_or_else(|| {
            ProviderError::config_error(format!(
                "Dictionary service {} is not included in the source directory",
                name
            ))
        })?,
    };

    if let Some(fields) = field_dictionary {
        debug!("Loaded {} field definitions", fields.len());
        store.insert(
            settings.field_dictionary_name.clone(),
            service,
            DictionaryPayload::Fields(Arc::new(fields)),
        );
    }
    if let Some(tables) = enum_tables {
        debug!("Loaded {} enum tables", tables.len());
        store.insert(
            settings.enum_dictionary_name.clone(),
            service,
            DictionaryPayload::Enums(Arc::new(tables)),
        );
    }
    Ok(store)
}

fn read_definition(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| {
        ProviderError::config_error(format!("Cannot read dictionary file {}: {}", path, err))
    })
}
