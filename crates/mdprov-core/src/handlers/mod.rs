//! Protocol domain handlers
//!
//! One handler per domain family: login, source directory, dictionary and the
//! generic item handler that serves every non-administrative domain. Each
//! handler interprets inbound consumer messages for its domain, creates and
//! destroys item records, and either answers itself or hands the message to
//! the application client.

mod dictionary;
mod directory;
mod item;
mod login;

#[cfg(not(feature = "std"))]
use log::{debug, warn};
#[cfg(feature = "std")]
use tracing::{debug, warn};

use crate::engine::{close_notice, ProviderEngine};
use crate::errors::ProviderError;
use crate::item::ItemRecord;
use crate::message::{Message, RequestMsg};
use crate::types::{ChannelId, DomainType, ItemHandle, StatusCode, StreamId};
use crate::Result;

use dictionary::DictionaryHandler;
use directory::DirectoryHandler;
use item::ItemHandler;
use login::LoginHandler;

// ----------------------------------------------------------------------------
// Protocol Handler Trait
// ----------------------------------------------------------------------------

/// Interprets inbound messages of one domain family
pub(crate) trait ProtocolHandler: Sync {
    fn name(&self) -> &'static str;

    /// Handle one decoded message. Protocol rejects are answered on the wire
    /// and reported as `Ok`; only engine-side failures are returned.
    fn on_message(
        &self,
        engine: &mut ProviderEngine,
        channel: ChannelId,
        message: Message,
    ) -> Result<()>;
}

/// Handler responsible for `domain`
pub(crate) fn handler_for(domain: DomainType) -> &'static dyn ProtocolHandler {
    match domain {
        DomainType::LOGIN => &LoginHandler,
        DomainType::SOURCE => &DirectoryHandler,
        DomainType::DICTIONARY => &DictionaryHandler,
        _ => &ItemHandler,
    }
}

// ----------------------------------------------------------------------------
// Shared Helpers
// ----------------------------------------------------------------------------

/// Whether the session may send non-login messages
pub(crate) fn check_login(engine: &ProviderEngine, channel: ChannelId) -> bool {
    engine.policy().accept_message_without_being_login
        || engine
            .session(channel)
            .map(|session| session.is_logged_in())
            .unwrap_or(false)
}

/// Existing record for a stream on a channel
pub(crate) fn find_stream(
    engine: &ProviderEngine,
    channel: ChannelId,
    stream_id: StreamId,
) -> Option<ItemHandle> {
    engine.session(channel)?.find_by_stream(stream_id)
}

/// Answer a request with a closed-recover status and create nothing
pub(crate) fn reject_request(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    request: &RequestMsg,
    code: StatusCode,
    text: &str,
) -> Result<()> {
    engine.send_reject(
        channel,
        request.stream_id,
        request.domain,
        request.key.clone(),
        request.private_stream,
        code,
        text,
    )
}

/// Answer any inbound message with a closed-recover status and create nothing
pub(crate) fn reject_message(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    message: &Message,
    code: StatusCode,
    text: &str,
) -> Result<()> {
    if let Message::Request(request) = message {
        return reject_request(engine, channel, request, code, text);
    }
    engine.send_reject(
        channel,
        message.stream_id(),
        message.domain().unwrap_or_default(),
        message.key().cloned().unwrap_or_default(),
        false,
        code,
        text,
    )
}

/// Allocate a pending record, rejecting the request when the handle table is exhausted
pub(crate) fn allocate_record(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    request: &RequestMsg,
    service_name: Option<String>,
) -> Result<ItemRecord> {
    match engine.new_record(channel, request, service_name) {
        Ok(record) => Ok(record),
        Err(err) => {
            reject_request(
                engine,
                channel,
                request,
                StatusCode::None,
                "Request message rejected - unable to allocate an item for this request.",
            )?;
            Err(ProviderError::allocation_failure(err.to_string()))
        }
    }
}

/// Destroy the record of a closed stream, optionally delivering `on_close` first.
/// A close for an unknown stream is ignored.
pub(crate) fn close_stream(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    stream_id: StreamId,
    notify: bool,
) -> Result<()> {
    let Some(handle) = find_stream(engine, channel, stream_id) else {
        debug!("Close for unknown stream {} on {}", stream_id, channel);
        return Ok(());
    };
    let Some(record) = engine.lookup(handle) else {
        return Ok(());
    };
    let domain = record.domain();
    let notice = close_notice(record);

    engine.stats.handler_mut(domain).closes += 1;
    if notify {
        engine.notify(handle, channel, |client, event| client.on_close(&notice, event));
    }
    engine.remove_item_info(handle);
    Ok(())
}

/// Hand a consumer refresh, status, generic or post message to the client.
/// Returns false when the stream has no record or the class is not delivered.
pub(crate) fn deliver(engine: &mut ProviderEngine, channel: ChannelId, message: &Message) -> bool {
    let Some(handle) = find_stream(engine, channel, message.stream_id()) else {
        return false;
    };

    match message {
        Message::Refresh(refresh) => {
            engine.notify(handle, channel, |client, event| client.on_refresh(refresh, event))
        }
        Message::Status(status) => {
            engine.notify(handle, channel, |client, event| client.on_status(status, event))
        }
        Message::Generic(generic) => {
            engine.notify(handle, channel, |client, event| client.on_generic(generic, event))
        }
        Message::Post(post) => {
            if let Some(post_id) = post.post_id {
                if let Some(record) = engine.lookup_mut(handle) {
                    record.record_post(post_id);
                }
            }
            engine.notify(handle, channel, |client, event| client.on_post(post, event))
        }
        _ => return false,
    }
    true
}

/// Log an unhandled message, rejecting it when the stream has no record yet
pub(crate) fn unhandled(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    message: &Message,
    text: &str,
) -> Result<()> {
    warn!(
        "Unhandled {} on {} stream {}",
        message.class(),
        channel,
        message.stream_id()
    );
    if find_stream(engine, channel, message.stream_id()).is_some() {
        return Ok(());
    }
    reject_message(engine, channel, message, StatusCode::UsageError, text)
}
