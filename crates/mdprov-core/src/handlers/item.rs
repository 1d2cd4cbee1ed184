//! Generic item handler
//!
//! Serves every non-administrative domain. A new request is admitted only when
//! its service exists, accepts requests and offers the requested QoS, and when
//! no other stream of the session already holds the same key. Each of these
//! checks except the service lookup can be waived by policy.

#[cfg(not(feature = "std"))]
use log::{debug, warn};
#[cfg(feature = "std")]
use tracing::{debug, warn};

use super::{
    allocate_record, check_login, close_stream, deliver, find_stream, reject_message,
    reject_request, unhandled, ProtocolHandler,
};
use crate::engine::{close_notice, ProviderEngine};
use crate::message::{Message, RequestMsg};
use crate::types::{ChannelId, ItemHandle, Qos, ServiceId, StatusCode};
use crate::Result;

const NO_LOGIN: &str = "Message rejected - there is no logged in user for this session.";
const DUPLICATE_KEY: &str =
    "Request Message rejected - Item already open with exact same message key on another stream.";
const NO_SERVICE: &str =
    "Request Message rejected - the request does not specify a service name or service Id.";

pub(crate) struct ItemHandler;

impl ProtocolHandler for ItemHandler {
    fn name(&self) -> &'static str {
        "item"
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
            Message::Close(close) => close_stream(engine, channel, close.stream_id, true),
            other => {
                if deliver(engine, channel, &other) {
                    return Ok(());
                }
                unhandled(
                    engine,
                    channel,
                    &other,
                    "Message rejected - unhandled message type.",
                )
            }
        }
    }
}

/// Resolve the service a request names, by name first then by id
fn resolve_service(
    engine: &ProviderEngine,
    request: &RequestMsg,
) -> core::result::Result<(ServiceId, Option<String>), String> {
    if let Some(name) = request.service_name.as_deref() {
        return match engine.directory.service_id_by_name(name) {
            Some(id) => Ok((id, Some(name.to_string()))),
            None => Err(format!(
                "Request Message rejected - the service name = {} does not exist in the source directory.",
                name
            )),
        };
    }

    match request.key.service_id {
        Some(id) if engine.directory.service(id).is_some() => {
            let name = engine.directory.service_name_by_id(id).map(str::to_string);
            Ok((id, name))
        }
        Some(id) => Err(format!(
            "Request Message rejected - the service Id = {} does not exist in the source directory.",
            id
        )),
        None => Err(NO_SERVICE.to_string()),
    }
}

fn describe_qos(qos: Option<&Qos>, worst: Option<&Qos>) -> String {
    match (qos, worst) {
        (Some(best), Some(worst)) => format!(
            "{:?}/{:?} - {:?}/{:?}",
            best.timeliness, best.rate, worst.timeliness, worst.rate
        ),
        (Some(best), None) => format!("{:?}/{:?}", best.timeliness, best.rate),
        (None, _) => "default".to_string(),
    }
}

fn on_request(engine: &mut ProviderEngine, channel: ChannelId, request: RequestMsg) -> Result<()> {
    if let Some(handle) = find_stream(engine, channel, request.stream_id) {
        return on_reissue(engine, channel, handle, request);
    }

    let (service_id, service_name) = match resolve_service(engine, &request) {
        Ok(resolved) => resolved,
        Err(text) => {
            return reject_request(engine, channel, &request, StatusCode::SourceUnknown, &text);
        }
    };

    let policy = engine.policy();
    if !policy.accept_message_without_accepting_requests
        && !engine.directory.is_accepting_requests(service_id)
    {
        let text = format!(
            "Request message rejected - the service Id = {} does not accept any requests.",
            service_id
        );
        return reject_request(engine, channel, &request, StatusCode::None, &text);
    }

    let policy = engine.policy();
    if !policy.accept_message_without_qos_in_range
        && !engine.directory.is_valid_qos_range(
            service_id,
            request.qos.as_ref(),
            request.worst_qos.as_ref(),
        )
    {
        let text = format!(
            "Request message rejected - the service Id = {} does not support the specified QoS({}).",
            service_id,
            describe_qos(request.qos.as_ref(), request.worst_qos.as_ref())
        );
        return reject_request(engine, channel, &request, StatusCode::QosNotSupported, &text);
    }

    let mut request = request;
    request.key.service_id = Some(service_id);

    engine.stats.item.requests += 1;
    let record = allocate_record(engine, channel, &request, service_name)?;

    let duplicate = engine
        .sessions
        .get_mut(channel)
        .map(|session| session.check_existing_request(&record))
        .unwrap_or(false);
    if duplicate {
        engine.discard_record(record);
        return reject_request(engine, channel, &request, StatusCode::AlreadyOpen, DUPLICATE_KEY);
    }

    let handle = engine.link_record(record)?;
    debug!(
        "Opened {} item {} on {} stream {}",
        request.domain,
        request.key.name.as_deref().unwrap_or(""),
        channel,
        request.stream_id
    );
    engine.notify(handle, channel, |client, event| client.on_request(&request, event));
    Ok(())
}

fn on_reissue(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    handle: ItemHandle,
    request: RequestMsg,
) -> Result<()> {
    engine.stats.item.reissues += 1;

    let current = engine.lookup(handle).and_then(|record| record.service_id());
    let requested = match request.service_name.as_deref() {
        Some(name) => match engine.directory.service_id_by_name(name) {
            Some(id) => Some(id),
            None => {
                let text = format!(
                    "Request Message rejected - the service name = {} does not exist in the source directory.",
                    name
                );
                return reject_reissue(engine, channel, handle, &request, StatusCode::SourceUnknown, &text);
            }
        },
        None => request.key.service_id.or(current),
    };

    let changes_service = current.is_some() && requested != current;
    if changes_service && !engine.policy().accept_message_that_changes_service {
        let text = format!(
            "Request Message rejected - Attempt to reissue the service Id from {} to {} while this is not supported.",
            current.map(|id| id.to_string()).unwrap_or_default(),
            requested.map(|id| id.to_string()).unwrap_or_default()
        );
        return reject_reissue(engine, channel, handle, &request, StatusCode::InvalidArgument, &text);
    }

    let mut request = request;
    request.key.service_id = requested;
    let service_name = requested
        .and_then(|id| engine.directory.service_name_by_id(id))
        .map(str::to_string);

    let Some(session) = engine.sessions.get_mut(channel) else {
        return Ok(());
    };
    if changes_service {
        session.remove_item_group(handle);
    }
    let previous_key = match session.get_mut(handle) {
        Some(record) => {
            let reissue = record.apply_reissue(&request, true)?;
            if reissue.service_changed {
                record.set_service_name(service_name);
            }
            reissue.previous_key
        }
        None => return Ok(()),
    };
    if changes_service {
        session.add_item_group(handle);
    }
    session.reindex_key(handle, &previous_key);

    engine.notify(handle, channel, |client, event| client.on_reissue(&request, event));
    Ok(())
}

/// Reject a reissue and close the stream it targeted
fn reject_reissue(
    engine: &mut ProviderEngine,
    channel: ChannelId,
    handle: ItemHandle,
    request: &RequestMsg,
    code: StatusCode,
    text: &str,
) -> Result<()> {
    warn!("{} on {} stream {}", text, channel, request.stream_id);
    reject_request(engine, channel, request, code, text)?;

    if let Some(notice) = engine.lookup(handle).map(close_notice) {
        engine.notify(handle, channel, |client, event| client.on_close(&notice, event));
    }
    engine.remove_item_info(handle);
    Ok(())
}
