//! Integration tests for inbound consumer conversations
//!
//! These tests drive the engine through login, directory, dictionary and item
//! requests and check what reaches the wire and the application client.


use mdprov_core::config::{DirectoryConfig, ServiceDefinition};
use mdprov_core::dictionary::FieldDef;
use mdprov_core::directory::{ServiceInfo, ServiceState};
use mdprov_core::message::{filter, CloseMsg, PostMsg, SeriesPayload, UpdateMsg};
use mdprov_core::testing::{ClientCall, RecordingClient};
use mdprov_core::*;
use test_utils::*;

fn two_service_config() -> ProviderConfig {
    let service = |id: u16, name: &str| ServiceDefinition {
        id,
        info: ServiceInfo {
            name: name.to_string(),
            capabilities: vec![DomainType::MARKET_PRICE],
            qos: vec![Qos::REALTIME_TICK_BY_TICK],
            ..ServiceInfo::default()
        },
        state: ServiceState::up(),
    };
    ProviderConfig::testing().with_directory(DirectoryConfig {
        services: vec![service(1, "FEED_A"), service(2, "FEED_B")],
        ..DirectoryConfig::default()
    })
}

// ----------------------------------------------------------------------------
// Login
// ----------------------------------------------------------------------------

#[test]
fn test_login_accepted_from_callback() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);

    let refreshes = h.refreshes(channel);
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].domain, DomainType::LOGIN);
    assert_eq!(refreshes[0].stream_id, StreamId(LOGIN_STREAM));
    assert!(refreshes[0].state.is_open_ok());
    assert_eq!(h.engine.open_items(DomainType::LOGIN).len(), 1);
    assert_eq!(h.engine.stats().login.requests, 1);
}

#[test]
fn test_second_login_stream_rejected() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);

    let mut second = login_request("other");
    second.stream_id = StreamId(2);
    h.request(channel, second);

    assert!(h.last_reject(channel).is_some());
    assert!(h.handle_of(channel, 2).is_none());
    assert_eq!(h.engine.open_items(DomainType::LOGIN).len(), 1);
}

#[test]
fn test_item_request_before_login_rejected() {
    let mut h = Harness::new();
    let channel = h.connect(1);
    h.request(channel, item_request(5, "TRI.N"));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Message rejected - there is no logged in user for this session.")
    );
    assert!(h.handle_of(channel, 5).is_none());
}

#[test]
fn test_closing_login_stream_logs_out() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.receive(
        channel,
        Message::Close(CloseMsg {
            stream_id: StreamId(LOGIN_STREAM),
            domain: DomainType::LOGIN,
        }),
    );

    assert!(!h.engine.session(channel).expect("session").is_logged_in());
    assert!(h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Close { request, .. } if request.domain == DomainType::LOGIN)));
}

// ----------------------------------------------------------------------------
// Directory
// ----------------------------------------------------------------------------

#[test]
fn test_directory_login_checked_before_filters() {
    let mut h = Harness::new();
    let channel = h.connect(1);
    h.request(channel, directory_request(2, filter::INFO));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Source directory request rejected - there is no logged in user for this session.")
    );
}

#[test]
fn test_directory_minimum_filters() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, directory_request(2, filter::INFO));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Source directory request rejected - request message must have both SERVICE_INFO_FILTER and SERVICE_STATE_FILTER filters")
    );
    assert!(h.handle_of(channel, 2).is_none());
}

#[test]
fn test_directory_minimum_filters_waived() {
    let mut config = ProviderConfig::testing();
    config.session.accept_dir_message_without_min_filters = true;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.request(channel, directory_request(2, filter::INFO));

    assert!(h.handle_of(channel, 2).is_some());
}

#[test]
fn test_directory_answered_from_store() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.transport.take();
    h.request(channel, directory_request(2, filter::INFO | filter::STATE));

    let refreshes = h.refreshes(channel);
    assert_eq!(refreshes.len(), 1);
    let services = refreshes[0].payload.directory().expect("directory map");
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service_id, 1);
    assert!(services[0].info.is_some());
    assert!(services[0].state.is_some());
    assert!(services[0].load.is_none());
    assert_eq!(refreshes[0].key.filter, Some(filter::INFO | filter::STATE));

    let handle = h.handle_of(channel, 2).expect("directory stream stays open");
    assert_eq!(h.engine.lookup(handle).map(ItemRecord::state), Some(ItemState::Open));
}

#[test]
fn test_directory_user_control_delivers_request() {
    let mut config = ProviderConfig::testing();
    config.directory.admin_control = AdminControl::User;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.transport.take();
    h.request(channel, full_directory_request(2));

    assert!(h.refreshes(channel).is_empty());
    assert_eq!(h.client.request_handles(DomainType::SOURCE).len(), 1);
}

// ----------------------------------------------------------------------------
// Items
// ----------------------------------------------------------------------------

#[test]
fn test_item_request_delivered_to_client() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));

    let handles = h.client.request_handles(DomainType::MARKET_PRICE);
    assert_eq!(handles.len(), 1);
    assert_eq!(h.handle_of(channel, 5), Some(handles[0]));
    let record = h.engine.lookup(handles[0]).expect("record");
    assert_eq!(record.service_name(), Some("DIRECT_FEED"));
    assert_eq!(record.state(), ItemState::Pending);
}

#[test]
fn test_item_request_by_service_name() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    let mut request = RequestMsg::new(5, DomainType::MARKET_PRICE, MsgKey::named("TRI.N"));
    request.service_name = Some("DIRECT_FEED".into());
    h.request(channel, request);

    let call = h
        .client
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ClientCall::Request { request, .. } if request.domain == DomainType::MARKET_PRICE => {
                Some(request)
            }
            _ => None,
        })
        .expect("request delivered");
    assert_eq!(call.key.service_id, Some(ServiceId(1)));
}

#[test]
fn test_item_request_unknown_service() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    let mut request = item_request(5, "TRI.N");
    request.key.service_id = Some(ServiceId(9));
    h.request(channel, request);

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Request Message rejected - the service Id = 9 does not exist in the source directory.")
    );

    let mut request = RequestMsg::new(6, DomainType::MARKET_PRICE, MsgKey::named("TRI.N"));
    request.service_name = Some("NOWHERE".into());
    h.request(channel, request);
    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Request Message rejected - the service name = NOWHERE does not exist in the source directory.")
    );
    assert!(h.engine.open_items(DomainType::MARKET_PRICE).is_empty());
}

#[test]
fn test_item_request_unsupported_qos() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    let delayed = Qos {
        timeliness: types::Timeliness::Delayed(5),
        rate: types::Rate::TickByTick,
    };
    h.request(channel, item_request(5, "TRI.N").qos(delayed, None));

    let text = h.last_reject(channel).expect("rejected");
    assert!(text.starts_with(
        "Request message rejected - the service Id = 1 does not support the specified QoS("
    ));
}

#[test]
fn test_duplicate_key_yields_one_record() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    h.request(channel, item_request(6, "TRI.N"));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Request Message rejected - Item already open with exact same message key on another stream.")
    );
    assert_eq!(h.engine.open_items(DomainType::MARKET_PRICE).len(), 1);
    assert!(h.handle_of(channel, 6).is_none());
}

#[test]
fn test_duplicate_keys_allowed_when_configured() {
    let mut config = ProviderConfig::testing();
    config.session.accept_message_same_key_but_diff_stream = true;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    h.request(channel, item_request(6, "TRI.N"));

    assert_eq!(h.engine.open_items(DomainType::MARKET_PRICE).len(), 2);
}

#[test]
fn test_item_close_notifies_with_last_key() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    let handle = h.handle_of(channel, 5).expect("open");

    h.receive(
        channel,
        Message::Close(CloseMsg {
            stream_id: StreamId(5),
            domain: DomainType::MARKET_PRICE,
        }),
    );

    assert!(h.engine.lookup(handle).is_none());
    assert!(h.handle_of(channel, 5).is_none());
    let close = h
        .client
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ClientCall::Close { handle: closed, request, .. } if closed == handle => Some(request),
            _ => None,
        })
        .expect("close delivered");
    assert_eq!(close.key.name.as_deref(), Some("TRI.N"));
}

#[test]
fn test_reissue_service_change_rejected() {
    let mut h = Harness::with_config(two_service_config());
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));

    let mut reissue = item_request(5, "TRI.N");
    reissue.key.service_id = Some(ServiceId(2));
    h.request(channel, reissue);

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Request Message rejected - Attempt to reissue the service Id from 1 to 2 while this is not supported.")
    );
    assert!(h.handle_of(channel, 5).is_none());
}

#[test]
fn test_reissue_unknown_service_name_rejected() {
    let mut h = Harness::with_config(two_service_config());
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    let handle = h.handle_of(channel, 5).expect("item open");

    let mut reissue = item_request(5, "TRI.N");
    reissue.service_name = Some("NOWHERE".to_string());
    h.request(channel, reissue);

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Request Message rejected - the service name = NOWHERE does not exist in the source directory.")
    );
    assert!(h.handle_of(channel, 5).is_none());
    assert!(h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Close { handle: closed, .. } if *closed == handle)));
    assert!(!h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Reissue { .. })));
}

#[test]
fn test_reissue_service_change_allowed() {
    let mut config = two_service_config();
    config.session.accept_message_that_changes_service = true;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));

    let mut reissue = item_request(5, "TRI.N");
    reissue.key.service_id = Some(ServiceId(2));
    h.request(channel, reissue);

    let handle = h.handle_of(channel, 5).expect("still open");
    let record = h.engine.lookup(handle).expect("record");
    assert_eq!(record.service_id(), Some(ServiceId(2)));
    assert_eq!(record.service_name(), Some("FEED_B"));
    assert!(h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Reissue { .. })));
}

#[test]
fn test_post_delivered_and_recorded() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    h.receive(
        channel,
        Message::Post(PostMsg {
            stream_id: StreamId(5),
            domain: DomainType::MARKET_PRICE,
            post_id: Some(77),
            ack_requested: true,
            ..PostMsg::default()
        }),
    );

    assert!(h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Post { post, .. } if post.post_id == Some(77))));
}

#[test]
fn test_post_after_logout_rejected() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N"));
    h.receive(
        channel,
        Message::Close(CloseMsg {
            stream_id: StreamId(LOGIN_STREAM),
            domain: DomainType::LOGIN,
        }),
    );
    assert!(!h.engine.session(channel).expect("session").is_logged_in());
    h.client.take();

    h.receive(
        channel,
        Message::Post(PostMsg {
            stream_id: StreamId(5),
            domain: DomainType::MARKET_PRICE,
            post_id: Some(78),
            ..PostMsg::default()
        }),
    );

    assert!(!h
        .client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Post { .. })));
    let status = h.statuses(channel).pop().expect("reject sent");
    assert_eq!(status.stream_id, StreamId(5));
    let state = status.state.expect("state");
    assert_eq!(state.code, StatusCode::NotAuthorized);
    assert_eq!(
        state.text,
        "Message rejected - there is no logged in user for this session."
    );
}

#[test]
fn test_dictionary_close_after_logout_rejected() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "RWFFld"));
    h.receive(
        channel,
        Message::Close(CloseMsg {
            stream_id: StreamId(LOGIN_STREAM),
            domain: DomainType::LOGIN,
        }),
    );

    h.receive(
        channel,
        Message::Close(CloseMsg {
            stream_id: StreamId(3),
            domain: DomainType::DICTIONARY,
        }),
    );

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Dictionary message rejected - there is no logged in user for this session.")
    );
}

#[test]
fn test_unhandled_message_without_stream_rejected() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.receive(
        channel,
        Message::Update(UpdateMsg {
            stream_id: StreamId(9),
            ..UpdateMsg::new(DomainType::MARKET_PRICE)
        }),
    );

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Message rejected - unhandled message type.")
    );
}

#[test]
fn test_undecodable_bytes_are_dropped() {
    let mut h = Harness::new();
    let channel = h.connect(1);
    h.engine
        .on_message(channel, &[0xff, 0xff, 0xff, 0xff, 0x01])
        .expect("decode errors stay inside the engine");
    assert_eq!(h.engine.stats().decode_errors, 1);
    assert_eq!(h.transport.sent_count(), 0);
}

// ----------------------------------------------------------------------------
// Channel Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_session_limit() {
    let mut config = ProviderConfig::testing();
    config.session.max_sessions = 1;
    let mut h = Harness::with_config(config);
    h.connect(1);

    let err = h
        .engine
        .on_channel_up(ChannelId::new(2), ChannelInfo::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Session(SessionError::MaxSessionsReached { max: 1, .. })
    ));
}

#[test]
fn test_channel_down_cascades() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, full_directory_request(2));
    h.request(channel, item_request(5, "TRI.N"));
    h.request(channel, item_request(6, "IBM.N"));
    let handles: Vec<ItemHandle> = [1, 2, 5, 6]
        .iter()
        .filter_map(|stream| h.handle_of(channel, *stream))
        .collect();
    assert_eq!(handles.len(), 4);
    h.client.take();

    h.engine.on_channel_down(channel, "peer reset");

    let calls = h.client.take();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], ClientCall::Close { request, .. } if request.domain == DomainType::LOGIN));
    for handle in handles {
        assert!(h.engine.lookup(handle).is_none());
    }
    assert!(h.engine.session(channel).is_none());
    assert_eq!(h.engine.open_handle_count(), 0);
    assert_eq!(h.engine.stats().channels_closed, 1);
}

#[test]
fn test_channels_are_isolated() {
    let mut h = Harness::new();
    let first = h.connect_logged_in(1);
    let second = h.connect_logged_in(2);
    h.request(first, item_request(5, "TRI.N"));
    h.request(second, item_request(5, "TRI.N"));

    assert_eq!(h.engine.open_items(DomainType::MARKET_PRICE).len(), 2);
    h.engine.on_channel_down(first, "gone");
    assert_eq!(h.engine.open_items(DomainType::MARKET_PRICE).len(), 1);
    assert!(h.handle_of(second, 5).is_some());
}

// ----------------------------------------------------------------------------
// Dictionary
// ----------------------------------------------------------------------------

fn dictionary_harness(config: ProviderConfig, fields: i16) -> Harness {
    Harness::build(config, RecordingClient::accepting_logins(), |builder| {
        builder
            .field_dictionary(field_dictionary(fields))
            .enum_tables(enum_tables(8))
    })
}

#[test]
fn test_dictionary_not_loaded() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "RWFFld"));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Dictionary request message rejected - dictionary is not loaded in provider.")
    );
}

#[test]
fn test_dictionary_unknown_name() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "Nope"));

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Dictionary request message rejected - the requesting dictionary name 'Nope' not found.")
    );
}

#[test]
fn test_dictionary_unknown_service() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    let mut request = dictionary_request(3, "RWFFld");
    request.key.service_id = Some(ServiceId(42));
    h.request(channel, request);

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Dictionary request message rejected - the service Id = 42 does not exist in the source directory")
    );
}

#[test]
fn test_dictionary_request_without_name() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    h.request(
        channel,
        RequestMsg::new(3, DomainType::DICTIONARY, MsgKey::default()),
    );

    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Dictionary message rejected - invalid dictionary domain message.")
    );
}

#[test]
fn test_small_dictionary_single_part() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    h.transport.take();
    h.request(channel, dictionary_request(3, "RWFEnum"));

    let refreshes = h.refreshes(channel);
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].complete);
    assert!(refreshes[0].clear_cache);
    assert!(refreshes[0].state.text.starts_with("Enum Type Dictionary Refresh"));
    assert!(h.engine.is_dictionary_delivered(channel, "RWFEnum"));
    assert_eq!(h.engine.pending_timer_count(), 0);
}

#[test]
fn test_large_dictionary_paced_by_timer() {
    let mut config = ProviderConfig::testing();
    config.dictionary.field_fragment_size = 4096;
    config.dictionary.part_delay_ms = 500;
    let mut h = dictionary_harness(config, 2000);
    let channel = h.connect_logged_in(1);
    h.transport.take();
    h.request(channel, dictionary_request(3, "RWFFld"));

    let first = h.refreshes(channel);
    assert_eq!(first.len(), 1);
    assert!(first[0].clear_cache);
    assert!(!first[0].complete);
    assert_eq!(h.engine.pending_timer_count(), 1);

    assert_eq!(h.engine.process_timers(), 0);
    h.clock.advance(499);
    assert_eq!(h.engine.process_timers(), 0);
    h.clock.advance(1);
    assert_eq!(h.engine.process_timers(), 1);

    h.drain_timers();
    let parts = h.refreshes(channel);
    assert!(parts.len() >= 2);
    assert!(parts[1..].iter().all(|part| !part.clear_cache));
    assert!(parts.last().map(|part| part.complete).unwrap_or(false));
    assert!(parts[..parts.len() - 1].iter().all(|part| !part.complete));

    let fields: usize = parts
        .iter()
        .filter_map(|part| match &part.payload {
            Payload::Series(SeriesPayload::Dictionary(part)) => Some(part.entries.len()),
            _ => None,
        })
        .sum();
    assert_eq!(fields, 2000);
    assert!(h.engine.is_dictionary_delivered(channel, "RWFFld"));
}

#[test]
fn test_blocked_dictionary_part_is_retried() {
    let mut config = ProviderConfig::testing();
    config.dictionary.field_fragment_size = 1024;
    config.dictionary.part_delay_ms = 500;
    let mut h = dictionary_harness(config, 2000);
    let channel = h.connect_logged_in(1);
    h.transport.take();
    h.request(channel, dictionary_request(3, "RWFFld"));
    assert_eq!(h.refreshes(channel).len(), 1);

    h.transport
        .fail_next(SubmitStatus::Retryable { reason: "queue full".into() });
    h.clock.advance(500);
    assert_eq!(h.engine.process_timers(), 1);
    assert_eq!(h.refreshes(channel).len(), 1);
    assert_eq!(h.engine.pending_timer_count(), 1);

    h.clock.advance(500);
    h.drain_timers();
    let parts = h.refreshes(channel);
    let starts: Vec<i32> = parts
        .iter()
        .filter_map(|part| match &part.payload {
            Payload::Series(SeriesPayload::Dictionary(part)) => Some(part.start),
            _ => None,
        })
        .collect();
    let mut unique = starts.clone();
    unique.dedup();
    assert_eq!(starts, unique);

    let fields: usize = parts
        .iter()
        .filter_map(|part| match &part.payload {
            Payload::Series(SeriesPayload::Dictionary(part)) => Some(part.entries.len()),
            _ => None,
        })
        .sum();
    assert_eq!(fields, 2000);
    assert!(h.engine.is_dictionary_delivered(channel, "RWFFld"));
}

#[test]
fn test_dictionary_frames_fit_part_buffer() {
    let mut config = ProviderConfig::testing();
    config.dictionary.field_fragment_size = 4096;
    config.dictionary.enum_fragment_size = 4096;
    config.dictionary.max_part_buffer = 4096;
    config.dictionary.part_delay_ms = 1;
    let fields = FieldDictionary::from_fields(
        (-17_232i16..=i16::MAX).map(|fid| FieldDef::uint(fid, format!("F{}", fid))),
    );
    let mut h = Harness::build(config, RecordingClient::accepting_logins(), |builder| {
        builder.field_dictionary(fields)
    });
    let channel = h.connect_logged_in(1);
    h.transport.take();

    h.request(channel, dictionary_request(3, "RWFFld"));
    h.clock.advance(1);
    h.drain_timers();

    let lengths = h.transport.frame_lengths();
    assert!(lengths.len() > 2);
    assert!(lengths.iter().all(|(_, len)| *len <= 4096));

    let parts = h.refreshes(channel);
    assert_eq!(parts.len(), lengths.len());
    let total: usize = parts
        .iter()
        .filter_map(|part| match &part.payload {
            Payload::Series(SeriesPayload::Dictionary(part)) => Some(part.entries.len()),
            _ => None,
        })
        .sum();
    assert_eq!(total, 50_000);
    assert!(h.engine.is_dictionary_delivered(channel, "RWFFld"));
}

#[test]
fn test_channel_down_cancels_dictionary_parts() {
    let mut config = ProviderConfig::testing();
    config.dictionary.field_fragment_size = 1024;
    config.dictionary.part_delay_ms = 500;
    let mut h = dictionary_harness(config, 2000);
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "RWFFld"));
    assert_eq!(h.engine.pending_timer_count(), 1);

    h.engine.on_channel_down(channel, "gone");
    assert_eq!(h.engine.pending_timer_count(), 0);
    h.clock.advance(1_000);
    let before = h.transport.sent_count();
    assert_eq!(h.engine.process_timers(), 0);
    assert_eq!(h.transport.sent_count(), before);
}

#[test]
fn test_dictionary_status_reaches_listeners() {
    let mut h = dictionary_harness(ProviderConfig::testing(), 10);
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "RWFFld"));
    assert!(h.handle_of(channel, 3).is_some());

    let notified = h
        .engine
        .notify_dictionary_status(
            "RWFFld",
            State::new(
                StreamState::ClosedRecover,
                DataState::Suspect,
                StatusCode::None,
                "Source dictionary closed",
            ),
        )
        .expect("status sent");
    assert_eq!(notified, 1);
    assert!(h.handle_of(channel, 3).is_none());
    assert_eq!(
        h.last_reject(channel).as_deref(),
        Some("Source dictionary closed")
    );
}
