//! Dictionary domain handler
//!
//! Under API admin control the engine serves the loaded field and enum
//! dictionaries itself, in as many parts as the part buffer requires. Parts
//! after the first are sent from the timer queue.

#[cfg(not(feature = "std"))]
use log::{debug, info};
#[cfg(feature = "std")]
use tracing::{debug, info};

use super::{
    allocate_record, check_login, close_stream, deliver, find_stream, reject_message,
    reject_request, unhandled, ProtocolHandler,
};
use crate::config::AdminControl;
use crate::dictionary::{DictionaryPart, DictionaryPartEncoder, DictionaryPayload, PendingDictionary};
use crate::engine::{ProviderEngine, Target};
use crate::errors::ProviderError;
use crate::message::{Message, Payload, RefreshMsg, RequestMsg, SeriesPayload, StatusMsg};
use crate::timer::ScheduledTask;
use crate::types::{ChannelId, DomainType, ServiceId, State, StatusCode, Timestamp};
use crate::Result;

const NO_LOGIN: &str = "Dictionary message rejected - there is no logged in user for this session.";
const INVALID_MESSAGE: &str = "Dictionary message rejected - invalid dictionary domain message.";
const NOT_LOADED: &str = "Dictionary request message rejected - dictionary is not loaded in provider.";
const ENCODE_FAILED: &str =
    "Dictionary request message rejected - failed to encode dictionary information.";

pub(crate) struct DictionaryHandler;

impl ProtocolHandler for DictionaryHandler {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn on_message(
        &self,
        engine: &mut ProviderEngine,
        channel: ChannelId,
        message: Message,
    ) -> Result<()> {
        if !check_login(engine, channel) {
            return reject_message(engine, channel, &message, StatusCode::NotAuthorized, NO_LOGIN);
        }

        match message {
            Message::Request(request) => on_request(engine, channel, request),
            Message::Close(close) => {
                let notify = engine.config.dictionary.admin_control == AdminControl::User;
                close_stream(engine, channel, close.stream_id, notify)
            }
            other => {
                if deliver(engine, channel, &other) {
                    return Ok(());
                }
                unhandled(
                    engine,
                    channel,
                    &other,
                    "Dictionary message rejected - unhandled dictionary message type.",
                )
            }
        }
    }
}

fn on_request(engine: &mut ProviderEngine, channel: ChannelId, request: RequestMsg) -> Result<()> {
    let user_control = engine.config.dictionary.admin_control == AdminControl::User;

    if let Some(handle) = find_stream(engine, channel, request.stream_id) {
        engine.stats.dictionary.reissues += 1;
        if let Some(record) = engine.lookup_mut(handle) {
            record.apply_reissue(&request, true)?;
        }
        if user_control {
            engine.notify(handle, channel, |client, event| client.on_reissue(&request, event));
        } else {
            debug!("Dictionary stream {} on {} reissued", request.stream_id, channel);
        }
        return Ok(());
    }

    let Some(name) = request.key.name.clone() else {
        return reject_request(
            engine,
            channel,
            &request,
            StatusCode::InvalidArgument,
            INVALID_MESSAGE,
        );
    };
    engine.stats.dictionary.requests += 1;

    if user_control {
        let record = allocate_record(engine, channel, &request, None)?;
        let handle = engine.link_record(record)?;
        engine.notify(handle, channel, |client, event| client.on_request(&request, event));
        return Ok(());
    }

    let service = match resolve_service(engine, &request) {
        Ok(service) => service,
        Err(text) => {
            return reject_request(engine, channel, &request, StatusCode::NotFound, &text);
        }
    };
    if engine.dictionaries.is_empty() {
        return reject_request(engine, channel, &request, StatusCode::NotFound, NOT_LOADED);
    }
    let Some(payload) = engine.dictionaries.find(&name, service).cloned() else {
        let text = format!(
            "Dictionary request message rejected - the requesting dictionary name '{}' not found.",
            name
        );
        return reject_request(engine, channel, &request, StatusCode::NotFound, &text);
    };

    let record = allocate_record(engine, channel, &request, None)?;
    let handle = engine.link_record(record)?;
    engine.distributor.add_listener(&name, channel, handle);

    let settings = &engine.config.dictionary;
    let buffer_size = match payload {
        DictionaryPayload::Fields(_) => settings.field_fragment_size,
        DictionaryPayload::Enums(_) => settings.enum_fragment_size,
    };
    let encoder = DictionaryPartEncoder::new(
        name.as_str(),
        payload,
        buffer_size,
        settings.max_part_buffer,
    );

    info!("Serving dictionary {} on {} stream {}", name, channel, request.stream_id);
    engine.continue_dictionary(PendingDictionary {
        channel,
        handle,
        stream_id: request.stream_id,
        encoder,
    })
}

/// Service a dictionary request names, if any. Unknown services produce the reject text.
fn resolve_service(
    engine: &ProviderEngine,
    request: &RequestMsg,
) -> core::result::Result<Option<ServiceId>, String> {
    if let Some(service_name) = request.service_name.as_deref() {
        return engine
            .directory
            .service_id_by_name(service_name)
            .map(Some)
            .ok_or_else(|| {
                format!(
                    "Dictionary request message rejected - the service name = {} does not exist in the source directory",
                    service_name
                )
            });
    }
    match request.key.service_id {
        Some(id) if engine.directory.service(id).is_none() => Err(format!(
            "Dictionary request message rejected - the service Id = {} does not exist in the source directory",
            id
        )),
        other => Ok(other),
    }
}

// ----------------------------------------------------------------------------
// Part Continuation and Status Fan-out
// ----------------------------------------------------------------------------

impl ProviderEngine {
    /// Encode and send the next part of a dictionary stream, scheduling the
    /// part after it when more remain
    pub(crate) fn continue_dictionary(&mut self, mut pending: PendingDictionary) -> Result<()> {
        let handle = pending.handle;
        let Some(target) = self.target(handle) else {
            debug!("Dictionary stream {} is gone", pending.stream_id);
            return Ok(());
        };

        let checkpoint = pending.encoder.clone();
        let outcome = match self
            .dictionary_envelope(&target, &pending.encoder)
            .and_then(|envelope| Ok(pending.encoder.encode_next(envelope)?))
        {
            Ok(outcome) => outcome,
            Err(err) => {
                let rejected = self.send_reject(
                    target.channel,
                    target.stream_id,
                    DomainType::DICTIONARY,
                    target.key.clone(),
                    target.private_stream,
                    StatusCode::None,
                    ENCODE_FAILED,
                );
                self.remove_item_info(handle);
                rejected?;
                return Err(err);
            }
        };

        let complete = outcome.is_complete();
        let part = outcome.into_part();
        let state = State::open_ok(part.describe());
        let refresh = dictionary_refresh(&target, part, state.clone(), complete);

        if let Err(err) = self.send(target.channel, &Message::Refresh(refresh)) {
            if err.is_would_block() {
                debug!("Retrying dictionary part on {} stream {}", target.channel, target.stream_id);
                pending.encoder = checkpoint;
                let due = self.now() + self.config.dictionary.part_delay_ms;
                self.schedule_dictionary_part(pending, due);
            }
            return Err(err);
        }
        self.stats.dictionary_parts_sent += 1;

        let now = self.now();
        if let Some(record) = self.lookup_mut(handle) {
            record.mark_refresh_sent(&state, complete, now)?;
        }

        if complete {
            let name = pending.encoder.name().to_string();
            debug!(
                "Dictionary {} delivered on {} in {} parts",
                name,
                target.channel,
                pending.encoder.parts_encoded()
            );
            self.distributor.mark_delivered(target.channel, &name);
            self.apply_item_info(handle, Some(&state), true);
            return Ok(());
        }

        let due = now + self.config.dictionary.part_delay_ms;
        self.schedule_dictionary_part(pending, due);
        Ok(())
    }

    fn schedule_dictionary_part(&mut self, pending: PendingDictionary, due: Timestamp) {
        let channel = pending.channel;
        let id = self.distributor.start(pending);
        self.timers
            .schedule(due, ScheduledTask::DictionaryPart { channel, pending: id });
    }

    /// Bytes the encoded refresh adds around the next part of `encoder`
    fn dictionary_envelope(&self, target: &Target, encoder: &DictionaryPartEncoder) -> Result<usize> {
        let header = encoder.next_header();
        let header_len = header.encoded_len()?;
        let state = State::open_ok(header.describe());
        let refresh = dictionary_refresh(target, header, state, false);
        let encoded = self.encoded_len(&Message::Refresh(refresh))?;
        Ok(encoded.saturating_sub(header_len))
    }

    /// Send `state` to every stream listening on dictionary `name`. Returns the
    /// number of streams notified.
    pub fn notify_dictionary_status(&mut self, name: &str, state: State) -> Result<usize> {
        let listeners = self.distributor.listeners_of(name);
        let mut sent = 0;
        let mut first_error: Option<ProviderError> = None;

        for listener in listeners {
            let Some(target) = self.target(listener.handle) else {
                continue;
            };
            let status = StatusMsg {
                stream_id: target.stream_id,
                domain: DomainType::DICTIONARY,
                key: target.key.clone(),
                state: Some(state.clone()),
                private_stream: target.private_stream,
                ..StatusMsg::default()
            };
            match self.send(listener.channel, &Message::Status(status)) {
                Ok(()) => {
                    sent += 1;
                    self.apply_item_info(listener.handle, Some(&state), true);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        let result = match first_error {
            Some(err) => Err(err),
            None => Ok(sent),
        };
        self.report(result)
    }
}

fn dictionary_refresh(target: &Target, part: DictionaryPart, state: State, complete: bool) -> RefreshMsg {
    let clear_cache = part.clear_cache;
    let mut refresh = RefreshMsg::new(DomainType::DICTIONARY)
        .state(state)
        .complete(complete)
        .payload(Payload::Series(SeriesPayload::Dictionary(part)));
    refresh.stream_id = target.stream_id;
    refresh.key = target.key.clone();
    refresh.clear_cache = clear_cache;
    refresh.private_stream = target.private_stream;
    refresh
}
