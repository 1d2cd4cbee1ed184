//! Application callback interfaces
//!
//! `ProviderClient` receives inbound consumer traffic; `ErrorClient` sees every
//! error the publish API returns. Both run on the dispatching thread, and the
//! `ProviderEvent` they receive gives re-entrant access to the engine so an
//! application can answer a request from inside its callback.

use crate::engine::ProviderEngine;
use crate::errors::ProviderError;
use crate::message::{GenericMsg, PostMsg, RefreshMsg, RequestMsg, StatusMsg};
use crate::types::{ChannelId, ItemHandle};

/// Context of one callback
pub struct ProviderEvent<'a> {
    handle: ItemHandle,
    channel: ChannelId,
    closure: Option<u64>,
    provider: &'a mut ProviderEngine,
}

impl<'a> ProviderEvent<'a> {
    pub(crate) fn new(
        handle: ItemHandle,
        channel: ChannelId,
        closure: Option<u64>,
        provider: &'a mut ProviderEngine,
    ) -> Self {
        Self {
            handle,
            channel,
            closure,
            provider,
        }
    }

    /// Handle of the item the message arrived on
    pub fn handle(&self) -> ItemHandle {
        self.handle
    }

    /// Channel of the consumer that sent the message
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Closure value registered with the client
    pub fn closure(&self) -> Option<u64> {
        self.closure
    }

    /// The engine, for submitting responses from within the callback
    pub fn provider(&mut self) -> &mut ProviderEngine {
        self.provider
    }
}

/// Inbound message callbacks. Every method defaults to ignoring the message.
#[allow(unused_variables)]
pub trait ProviderClient: Send {
    /// A new request opened a stream
    fn on_request(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {}

    /// An open stream was re-requested
    fn on_reissue(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {}

    /// A stream was closed by the consumer or its channel went down; the
    /// request carries the last known key
    fn on_close(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {}

    fn on_refresh(&mut self, refresh: &RefreshMsg, event: &mut ProviderEvent<'_>) {}

    fn on_status(&mut self, status: &StatusMsg, event: &mut ProviderEvent<'_>) {}

    fn on_generic(&mut self, generic: &GenericMsg, event: &mut ProviderEvent<'_>) {}

    fn on_post(&mut self, post: &PostMsg, event: &mut ProviderEvent<'_>) {}
}

/// Receives every error returned by the publish API
pub trait ErrorClient: Send {
    fn on_error(&mut self, error: &ProviderError);
}
