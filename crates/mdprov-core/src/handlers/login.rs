//! Login domain handler
//!
//! A session is logged in once the application sends an open/ok refresh on
//! its login stream. Closing the login stream logs the session out; a terminal
//! login refresh or status closes the channel.

#[cfg(not(feature = "std"))]
use log::info;
#[cfg(feature = "std")]
use tracing::info;

use super::{
    allocate_record, close_stream, deliver, find_stream, reject_request, unhandled, ProtocolHandler,
};
use crate::engine::ProviderEngine;
use crate::message::{Message, RequestMsg};
use crate::types::{ChannelId, StatusCode};
use crate::Result;

pub(crate) struct LoginHandler;

impl ProtocolHandler for LoginHandler {
    fn name(&self) -> &'static str {
        "login"
    }

    fn on_message(
        &self,
        engine: &mut ProviderEngine,
        channel: ChannelId,
        message: Message,
    ) -> Result<()> {
        match message {
            Message::Request(request) => on_request(engine, channel, request),
            Message::Close(close) => close_stream(engine, channel, close.stream_id, true),
            other => {
                if deliver(engine, channel, &other) {
                    return Ok(());
                }
                unhandled(
                    engine,
                    channel,
                    &other,
                    "Login message rejected - unhandled login message type.",
                )
            }
        }
    }
}

fn on_request(engine: &mut ProviderEngine, channel: ChannelId, request: RequestMsg) -> Result<()> {
    if let Some(handle) = find_stream(engine, channel, request.stream_id) {
        engine.stats.login.reissues += 1;
        if let Some(record) = engine.lookup_mut(handle) {
            record.apply_reissue(&request, true)?;
        }
        engine.notify(handle, channel, |client, event| client.on_reissue(&request, event));
        return Ok(());
    }

    let existing = engine.session(channel).and_then(|session| session.login_item());
    if existing.is_some() {
        return reject_request(
            engine,
            channel,
            &request,
            StatusCode::AlreadyOpen,
            "Login request rejected - a login stream is already open for this session.",
        );
    }

    engine.stats.login.requests += 1;
    let record = allocate_record(engine, channel, &request, None)?;
    let handle = engine.link_record(record)?;

    info!(
        "Login request from {} on stream {} for {}",
        channel,
        request.stream_id,
        request.key.name.as_deref().unwrap_or("<anonymous>")
    );
    engine.notify(handle, channel, |client, event| client.on_request(&request, event));
    Ok(())
}
