//! Test doubles: a recording transport, recording clients and a manual clock
//!
//! Available to unit tests and, with the `testing` feature, to integration
//! tests of this and downstream crates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{ErrorClient, ProviderClient, ProviderEvent};
use crate::codec::{BincodeCodec, MessageCodec};
use crate::errors::{ErrorKind, ProviderError};
use crate::message::{GenericMsg, Message, PostMsg, RefreshMsg, RequestMsg, StatusMsg};
use crate::transport::{ChannelTransport, SubmitStatus};
use crate::types::{ChannelId, DomainType, ItemHandle, State, TimeSource, Timestamp};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Recording Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TransportLog {
    sent: Vec<(ChannelId, Vec<u8>)>,
    closed: Vec<ChannelId>,
    fail_next: Vec<SubmitStatus>,
}

/// Transport that keeps every submitted frame. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next submit return `status` instead of succeeding
    pub fn fail_next(&self, status: SubmitStatus) {
        lock(&self.log).fail_next.push(status);
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.log).sent.len()
    }

    /// Byte length of every frame sent so far, in order
    pub fn frame_lengths(&self) -> Vec<(ChannelId, usize)> {
        lock(&self.log)
            .sent
            .iter()
            .map(|(channel, bytes)| (*channel, bytes.len()))
            .collect()
    }

    /// Every frame sent so far, decoded
    pub fn sent(&self) -> Vec<(ChannelId, Message)> {
        let codec = BincodeCodec::new();
        lock(&self.log)
            .sent
            .iter()
            .filter_map(|(channel, bytes)| codec.decode(bytes).ok().map(|m| (*channel, m)))
            .collect()
    }

    /// Messages sent to one channel, decoded
    pub fn sent_to(&self, channel: ChannelId) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, message)| message)
            .collect()
    }

    /// Drain and decode every frame sent so far
    pub fn take(&self) -> Vec<(ChannelId, Message)> {
        let sent = self.sent();
        lock(&self.log).sent.clear();
        sent
    }

    pub fn closed(&self) -> Vec<ChannelId> {
        lock(&self.log).closed.clone()
    }
}

impl ChannelTransport for RecordingTransport {
    fn submit(&mut self, channel: ChannelId, bytes: &[u8]) -> SubmitStatus {
        let mut log = lock(&self.log);
        if !log.fail_next.is_empty() {
            return log.fail_next.remove(0);
        }
        log.sent.push((channel, bytes.to_vec()));
        SubmitStatus::Success
    }

    fn close(&mut self, channel: ChannelId) {
        lock(&self.log).closed.push(channel);
    }
}

// ----------------------------------------------------------------------------
// Recording Client
// ----------------------------------------------------------------------------

/// One callback the engine delivered
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Request { handle: ItemHandle, channel: ChannelId, request: RequestMsg },
    Reissue { handle: ItemHandle, channel: ChannelId, request: RequestMsg },
    Close { handle: ItemHandle, channel: ChannelId, request: RequestMsg },
    Refresh { handle: ItemHandle, refresh: RefreshMsg },
    Status { handle: ItemHandle, status: StatusMsg },
    Generic { handle: ItemHandle, generic: GenericMsg },
    Post { handle: ItemHandle, post: PostMsg },
}

impl ClientCall {
    pub fn handle(&self) -> ItemHandle {
        match self {
            ClientCall::Request { handle, .. }
            | ClientCall::Reissue { handle, .. }
            | ClientCall::Close { handle, .. }
            | ClientCall::Refresh { handle, .. }
            | ClientCall::Status { handle, .. }
            | ClientCall::Generic { handle, .. }
            | ClientCall::Post { handle, .. } => *handle,
        }
    }
}

/// Client that records callbacks. With `accepting_logins` it answers every
/// login request with an open/ok refresh from inside the callback.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    calls: Arc<Mutex<Vec<ClientCall>>>,
    accept_logins: bool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepting_logins() -> Self {
        Self {
            accept_logins: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        lock(&self.calls).clone()
    }

    pub fn take(&self) -> Vec<ClientCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    /// Handles of every request callback for `domain`, in arrival order
    pub fn request_handles(&self, domain: DomainType) -> Vec<ItemHandle> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ClientCall::Request { handle, request, .. } if request.domain == domain => {
                    Some(*handle)
                }
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: ClientCall) {
        lock(&self.calls).push(call);
    }
}

impl ProviderClient for RecordingClient {
    fn on_request(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Request {
            handle: event.handle(),
            channel: event.channel(),
            request: request.clone(),
        });

        if self.accept_logins && request.domain == DomainType::LOGIN {
            let refresh = RefreshMsg::new(DomainType::LOGIN)
                .name(request.key.name.clone().unwrap_or_default())
                .state(State::open_ok("Login accepted"));
            let handle = event.handle();
            let _ = event.provider().submit_refresh(refresh, handle);
        }
    }

    fn on_reissue(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Reissue {
            handle: event.handle(),
            channel: event.channel(),
            request: request.clone(),
        });
    }

    fn on_close(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Close {
            handle: event.handle(),
            channel: event.channel(),
            request: request.clone(),
        });
    }

    fn on_refresh(&mut self, refresh: &RefreshMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Refresh {
            handle: event.handle(),
            refresh: refresh.clone(),
        });
    }

    fn on_status(&mut self, status: &StatusMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Status {
            handle: event.handle(),
            status: status.clone(),
        });
    }

    fn on_generic(&mut self, generic: &GenericMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Generic {
            handle: event.handle(),
            generic: generic.clone(),
        });
    }

    fn on_post(&mut self, post: &PostMsg, event: &mut ProviderEvent<'_>) {
        self.push(ClientCall::Post {
            handle: event.handle(),
            post: post.clone(),
        });
    }
}

/// Error client that keeps the kind and text of every reported error
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorClient {
    errors: Arc<Mutex<Vec<(ErrorKind, String)>>>,
}

impl RecordingErrorClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        lock(&self.errors).clone()
    }
}

impl ErrorClient for RecordingErrorClient {
    fn on_error(&mut self, error: &ProviderError) {
        lock(&self.errors).push((error.kind(), error.to_string()));
    }
}

// ----------------------------------------------------------------------------
// Manual Clock
// ----------------------------------------------------------------------------

/// Time source that only moves when told to
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    millis: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}
