//! Synthetic price feed
//!
//! `FeedClient` is the provider application behind `mdprov serve`: it accepts
//! every login, answers item requests with a refresh carrying a generated
//! quote, and remembers streaming items so the serve loop can publish updates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use mdprov_core::dictionary::FieldDef;
use mdprov_core::message::{FieldEntry, FieldValue};
use mdprov_core::{
    ChannelId, DataState, DomainType, ErrorClient, FieldDictionary, ItemHandle, Payload, PostMsg,
    ProviderClient, ProviderError, ProviderEvent, RefreshMsg, RequestMsg, State, StatusCode,
    StatusMsg, StreamState, UpdateMsg,
};

pub const FID_DSPLY_NAME: i16 = 3;
pub const FID_TRDPRC_1: i16 = 6;
pub const FID_BID: i16 = 22;
pub const FID_ASK: i16 = 25;
pub const FID_BIDSIZE: i16 = 30;
pub const FID_ASKSIZE: i16 = 31;

/// Prices are carried in hundredths
const PRICE_SCALE: f64 = 100.0;

/// Field definitions for the fields the feed publishes
pub fn builtin_field_dictionary() -> FieldDictionary {
    let mut display = FieldDef::uint(FID_DSPLY_NAME, "DSPLY_NAME");
    display.field_type = "ALPHANUMERIC".into();
    display.length = 16;
    display.rwf_type = "RMTES_STRING".into();
    display.rwf_len = 16;

    let price = |fid, acronym: &str| {
        let mut def = FieldDef::uint(fid, acronym);
        def.field_type = "PRICE".into();
        def.length = 17;
        def.rwf_type = "REAL64".into();
        def.rwf_len = 7;
        def
    };

    FieldDictionary::from_fields([
        display,
        price(FID_TRDPRC_1, "TRDPRC_1"),
        price(FID_BID, "BID"),
        price(FID_ASK, "ASK"),
        FieldDef::uint(FID_BIDSIZE, "BIDSIZE"),
        FieldDef::uint(FID_ASKSIZE, "ASKSIZE"),
    ])
}

// ----------------------------------------------------------------------------
// Quotes
// ----------------------------------------------------------------------------

/// Generated market state of one item, in hundredths
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub name: String,
    pub domain: DomainType,
    pub bid: i64,
    pub ask: i64,
    pub bid_size: u64,
    pub ask_size: u64,
    ticks: u64,
}

impl Quote {
    /// Starting prices derive from the item name so restarts look the same
    pub fn new(name: &str, domain: DomainType) -> Self {
        let seed = name
            .bytes()
            .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let bid = 1_000 + (seed % 9_000) as i64;
        Self {
            name: name.to_string(),
            domain,
            bid,
            ask: bid + 5,
            bid_size: 100 + seed % 900,
            ask_size: 100 + (seed / 7) % 900,
            ticks: 0,
        }
    }

    /// Move the quote one step along a bounded zig-zag
    pub fn tick(&mut self) {
        self.ticks += 1;
        let step = match self.ticks % 4 {
            0 | 1 => 1,
            _ => -1,
        };
        self.bid = (self.bid + step).max(1);
        self.ask = self.bid + 5;
        self.bid_size = 100 + (self.bid_size + 10) % 900;
        self.ask_size = 100 + (self.ask_size + 20) % 900;
    }

    fn price(value: i64) -> FieldValue {
        FieldValue::Real(value as f64 / PRICE_SCALE)
    }

    /// Every field, as carried by a refresh
    pub fn image(&self) -> Payload {
        let mut fields = vec![FieldEntry::new(
            FID_DSPLY_NAME,
            FieldValue::Ascii(self.name.clone()),
        )];
        fields.extend(self.changes_fields());
        fields.push(FieldEntry::new(FID_TRDPRC_1, Self::price(self.bid)));
        Payload::FieldList(fields)
    }

    /// Fields that change on every tick
    pub fn changes(&self) -> Payload {
        Payload::FieldList(self.changes_fields())
    }

    fn changes_fields(&self) -> Vec<FieldEntry> {
        vec![
            FieldEntry::new(FID_BID, Self::price(self.bid)),
            FieldEntry::new(FID_ASK, Self::price(self.ask)),
            FieldEntry::new(FID_BIDSIZE, FieldValue::UInt(self.bid_size)),
            FieldEntry::new(FID_ASKSIZE, FieldValue::UInt(self.ask_size)),
        ]
    }
}

// ----------------------------------------------------------------------------
// Feed Client
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FeedState {
    items: BTreeMap<ItemHandle, (ChannelId, Quote)>,
    logins: u64,
    posts: u64,
}

/// Provider client serving the synthetic feed. Clones share state, so the
/// serve loop keeps one clone while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct FeedClient {
    state: Arc<Mutex<FeedState>>,
}

impl FeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Streaming items currently published
    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }

    pub fn login_count(&self) -> u64 {
        self.state().logins
    }

    pub fn post_count(&self) -> u64 {
        self.state().posts
    }

    /// Advance every quote and return the updates to publish
    pub fn tick(&self) -> Vec<(ItemHandle, UpdateMsg)> {
        let mut state = self.state();
        state
            .items
            .iter_mut()
            .map(|(handle, (_, quote))| {
                quote.tick();
                (*handle, UpdateMsg::new(quote.domain).payload(quote.changes()))
            })
            .collect()
    }

    /// Stop publishing to a handle the engine no longer knows
    pub fn forget(&self, handle: ItemHandle) {
        if self.state().items.remove(&handle).is_some() {
            debug!("Stopped publishing to {}", handle);
        }
    }

    fn accept_login(&self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        let user = request.key.name.clone().unwrap_or_default();
        let refresh = RefreshMsg::new(DomainType::LOGIN)
            .name(user.clone())
            .state(State::open_ok("Login accepted"));
        let handle = event.handle();
        match event.provider().submit_refresh(refresh, handle) {
            Ok(()) => {
                self.state().logins += 1;
                info!("Accepted login of {:?} on {}", user, event.channel());
            }
            Err(e) => warn!("Login refresh for {:?} failed: {}", user, e),
        }
    }

    fn open_item(&self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        let handle = event.handle();
        let Some(name) = request.key.name.clone() else {
            let status = StatusMsg::new(
                request.domain,
                State::new(
                    StreamState::Closed,
                    DataState::Suspect,
                    StatusCode::InvalidArgument,
                    "Item name required",
                ),
            );
            if let Err(e) = event.provider().submit_status(status, handle) {
                warn!("Reject of unnamed request failed: {}", e);
            }
            return;
        };

        let quote = Quote::new(&name, request.domain);
        let mut refresh = RefreshMsg::new(request.domain)
            .name(name.clone())
            .state(State::open_ok("Item refresh completed"))
            .payload(quote.image());
        refresh.key.service_id = request.key.service_id;
        refresh.service_name = request.service_name.clone();

        match event.provider().submit_refresh(refresh, handle) {
            Ok(()) if request.streaming => {
                debug!("Publishing {} on {}", name, handle);
                self.state().items.insert(handle, (event.channel(), quote));
            }
            Ok(()) => debug!("Snapshot of {} sent", name),
            Err(e) => warn!("Refresh of {} failed: {}", name, e),
        }
    }
}

impl ProviderClient for FeedClient {
    fn on_request(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        match request.domain {
            DomainType::LOGIN => self.accept_login(request, event),
            domain if domain.is_admin() => {
                debug!("Ignoring {:?} request handled by the engine", domain)
            }
            _ => self.open_item(request, event),
        }
    }

    fn on_reissue(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        let handle = event.handle();
        let quote = self.state().items.get(&handle).map(|(_, quote)| quote.clone());
        if let Some(quote) = quote {
            let refresh = RefreshMsg::new(quote.domain)
                .name(quote.name.clone())
                .state(State::open_ok("Item refresh completed"))
                .payload(quote.image());
            if let Err(e) = event.provider().submit_refresh(refresh, handle) {
                warn!("Reissue refresh of {} failed: {}", quote.name, e);
            }
        } else if !request.domain.is_admin() {
            self.open_item(request, event);
        }
    }

    fn on_close(&mut self, request: &RequestMsg, event: &mut ProviderEvent<'_>) {
        if request.domain == DomainType::LOGIN {
            // the session is gone along with every item on it
            let channel = event.channel();
            let mut state = self.state();
            state.items.retain(|_, (owner, _)| *owner != channel);
            info!("Login stream closed on {}", channel);
            return;
        }
        self.forget(event.handle());
    }

    fn on_post(&mut self, post: &PostMsg, event: &mut ProviderEvent<'_>) {
        self.state().posts += 1;
        debug!(
            "Post {:?} on {} ({})",
            post.post_id,
            event.handle(),
            post.payload.data_type()
        );
    }
}

/// Logs every publish API error
#[derive(Debug, Clone, Default)]
pub struct LoggingErrorClient;

impl ErrorClient for LoggingErrorClient {
    fn on_error(&mut self, error: &ProviderError) {
        warn!("Provider API error ({:?}): {}", error.kind(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdprov_core::testing::RecordingTransport;
    use mdprov_core::{
        BincodeCodec, ChannelId, ChannelInfo, Message, MessageCodec, MsgKey, ProviderConfig,
        ProviderEngine, ServiceId,
    };

    fn engine(client: FeedClient, transport: RecordingTransport) -> ProviderEngine {
        ProviderEngine::builder(ProviderConfig::testing())
            .transport(Box::new(transport))
            .client(Box::new(client))
            .field_dictionary(builtin_field_dictionary())
            .build()
            .unwrap()
    }

    fn send(engine: &mut ProviderEngine, channel: ChannelId, request: RequestMsg) {
        let bytes = BincodeCodec::new()
            .encode(&Message::Request(request))
            .unwrap();
        engine.on_message(channel, &bytes).unwrap();
    }

    fn logged_in(client: &FeedClient, transport: &RecordingTransport) -> (ProviderEngine, ChannelId) {
        let mut engine = engine(client.clone(), transport.clone());
        let channel = ChannelId::new(1);
        engine.on_channel_up(channel, ChannelInfo::default()).unwrap();
        send(
            &mut engine,
            channel,
            RequestMsg::new(1, DomainType::LOGIN, MsgKey::named("user")),
        );
        (engine, channel)
    }

    fn item(stream: i32, name: &str) -> RequestMsg {
        RequestMsg::new(
            stream,
            DomainType::MARKET_PRICE,
            MsgKey::named(name).with_service(ServiceId(1)),
        )
    }

    #[test]
    fn test_quote_is_stable_per_name() {
        assert_eq!(
            Quote::new("IBM.N", DomainType::MARKET_PRICE),
            Quote::new("IBM.N", DomainType::MARKET_PRICE)
        );
        let mut quote = Quote::new("IBM.N", DomainType::MARKET_PRICE);
        for _ in 0..100 {
            quote.tick();
            assert!(quote.bid >= 1);
            assert_eq!(quote.ask, quote.bid + 5);
        }
    }

    #[test]
    fn test_login_accepted() {
        let client = FeedClient::new();
        let transport = RecordingTransport::new();
        let (engine, channel) = logged_in(&client, &transport);

        assert_eq!(client.login_count(), 1);
        assert!(engine.session(channel).unwrap().is_logged_in());
    }

    #[test]
    fn test_streaming_item_published_until_closed() {
        let client = FeedClient::new();
        let transport = RecordingTransport::new();
        let (mut engine, channel) = logged_in(&client, &transport);

        send(&mut engine, channel, item(5, "IBM.N"));
        assert_eq!(client.item_count(), 1);
        match transport.sent_to(channel).last() {
            Some(Message::Refresh(refresh)) => {
                assert_eq!(refresh.key.name.as_deref(), Some("IBM.N"));
                assert!(matches!(refresh.payload, Payload::FieldList(ref f) if f.len() == 6));
            }
            other => panic!("expected refresh, got {:?}", other),
        }

        for (handle, update) in client.tick() {
            engine.submit_update(update, handle).unwrap();
        }
        assert!(matches!(
            transport.sent_to(channel).last(),
            Some(Message::Update(_))
        ));

        let close = Message::Close(mdprov_core::CloseMsg {
            stream_id: mdprov_core::StreamId(5),
            domain: DomainType::MARKET_PRICE,
        });
        let bytes = BincodeCodec::new().encode(&close).unwrap();
        engine.on_message(channel, &bytes).unwrap();
        assert_eq!(client.item_count(), 0);
    }

    #[test]
    fn test_snapshot_not_tracked() {
        let client = FeedClient::new();
        let transport = RecordingTransport::new();
        let (mut engine, channel) = logged_in(&client, &transport);

        send(&mut engine, channel, item(6, "VOD.L").snapshot());
        assert_eq!(client.item_count(), 0);
        assert!(matches!(
            transport.sent_to(channel).last(),
            Some(Message::Refresh(_))
        ));
    }

    #[test]
    fn test_channel_down_forgets_items() {
        let client = FeedClient::new();
        let transport = RecordingTransport::new();
        let (mut engine, channel) = logged_in(&client, &transport);

        send(&mut engine, channel, item(5, "IBM.N"));
        send(&mut engine, channel, item(7, "MSFT.O"));
        assert_eq!(client.item_count(), 2);

        engine.on_channel_down(channel, "test");
        assert_eq!(client.item_count(), 0);
    }
}
