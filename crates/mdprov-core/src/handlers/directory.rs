//! Source directory domain handler
//!
//! Under API admin control the engine answers directory requests from its own
//! store, filtered to what each consumer asked for. Under user control requests
//! are handed to the application.

#[cfg(not(feature = "std"))]
use log::debug;
#[cfg(feature = "std")]
use tracing::debug;

use super::{
    allocate_record, check_login, close_stream, deliver, find_stream, reject_message,
    reject_request, unhandled, ProtocolHandler,
};
use crate::config::AdminControl;
use crate::directory::encode_directory_msg;
use crate::engine::ProviderEngine;
use crate::message::{filter, MapPayload, Message, Payload, RefreshMsg, RequestMsg};
use crate::types::{ChannelId, DomainType, ItemHandle, State, StatusCode};
use crate::Result;

const NO_LOGIN: &str =
    "Source directory request rejected - there is no logged in user for this session.";
const MISSING_FILTERS: &str = "Source directory request rejected - request message must have both SERVICE_INFO_FILTER and SERVICE_STATE_FILTER filters";

pub(crate) struct DirectoryHandler;

impl ProtocolHandler for DirectoryHandler {
    fn name(&self) -> &'static str {
        "directory"
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
                let notify = engine.directory.admin_control() == AdminControl::User;
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
                    "Source directory message rejected - unhandled directory message type.",
                )
            }
        }
    }
}

fn has_min_filters(engine: &ProviderEngine, request: &RequestMsg) -> bool {
    let requested = request.key.filter.unwrap_or(0);
    engine.policy().accept_dir_message_without_min_filters
        || requested & filter::MIN_DIRECTORY == filter::MIN_DIRECTORY
}

fn on_request(engine: &mut ProviderEngine, channel: ChannelId, request: RequestMsg) -> Result<()> {
    if let Some(handle) = find_stream(engine, channel, request.stream_id) {
        return on_reissue(engine, channel, handle, request);
    }

    if !has_min_filters(engine, &request) {
        return reject_request(
            engine,
            channel,
            &request,
            StatusCode::UsageError,
            MISSING_FILTERS,
        );
    }

    engine.stats.directory.requests += 1;
    let record = allocate_record(engine, channel, &request, None)?;
    let handle = engine.link_record(record)?;

    match engine.directory.admin_control() {
        AdminControl::Api => send_directory_refresh(engine, handle),
        AdminControl::User => {
            engine.notify(handle, channel, |client, event| client.on_request(&request, event));
            Ok(())
        }
    }
}

fn on_reissue(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    handle: ItemHandle,
    request: RequestMsg,
) -> Result<()> {
    engine.stats.directory.reissues += 1;

    if !has_min_filters(engine, &request) {
        reject_request(
            engine,
            channel,
            &request,
            StatusCode::UsageError,
            MISSING_FILTERS,
        )?;
        engine.remove_item_info(handle);
        return Ok(());
    }

    if let Some(record) = engine.lookup_mut(handle) {
        record.apply_reissue(&request, true)?;
    }

    match engine.directory.admin_control() {
        AdminControl::Api => send_directory_refresh(engine, handle),
        AdminControl::User => {
            engine.notify(handle, channel, |client, event| client.on_reissue(&request, event));
            Ok(())
        }
    }
}

/// Answer a directory stream from the store, restricted to its filter and service
fn send_directory_refresh(engine: &mut ProviderEngine, handle: ItemHandle) -> Result<()> {
    let Some(target) = engine.target(handle) else {
        return Ok(());
    };

    let specific = target.key.service_id;
    let updates = engine.directory.snapshot(target.filter(), specific);
    let filtered = encode_directory_msg(&updates, target.filter(), specific);
    debug!(
        "Answering directory stream {} on {} with {} services",
        target.stream_id,
        target.channel,
        filtered.services.len()
    );

    let state = State::open_ok("");
    let mut refresh = RefreshMsg::new(DomainType::SOURCE)
        .state(state.clone())
        .payload(Payload::Map(MapPayload::Directory(filtered.services)));
    refresh.stream_id = target.stream_id;
    refresh.key = target.key.clone();
    refresh.key.filter = Some(target.filter());
    refresh.clear_cache = true;
    refresh.private_stream = target.private_stream;

    engine.send(target.channel, &Message::Refresh(refresh))?;

    let now = engine.now();
    if let Some(record) = engine.lookup_mut(handle) {
        record.mark_refresh_sent(&state, true, now)?;
    }
    engine.apply_item_info(handle, Some(&state), true);
    Ok(())
}
