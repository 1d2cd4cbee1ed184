//! Integration tests for application publishing
//!
//! Covers the usage checks applied to submitted messages, fan-out of
//! administrative domains, directory-driven invalidation and the record
//! post-conditions that follow a send.


use mdprov_core::directory::{FilterAction, MapAction, ServiceGroupState, ServiceLoad};
use mdprov_core::message::{filter, MapPayload};
use mdprov_core::*;
use test_utils::*;

fn directory_update(updates: Vec<ServiceUpdate>) -> UpdateMsg {
    UpdateMsg::new(DomainType::SOURCE).payload(Payload::Map(MapPayload::Directory(updates)))
}

fn closed_recover(text: &str) -> State {
    State::new(
        StreamState::ClosedRecover,
        DataState::Suspect,
        StatusCode::None,
        text,
    )
}

/// Logged-in channel with one pending item on stream 5
fn open_item(h: &mut Harness, id: u64, name: &str) -> (ChannelId, ItemHandle) {
    let channel = h.connect_logged_in(id);
    h.request(channel, item_request(5, name));
    let handle = h.handle_of(channel, 5).expect("item open");
    (channel, handle)
}

fn last_error(h: &Harness) -> (ErrorKind, String) {
    h.errors.errors().pop().expect("an error was reported")
}

// ----------------------------------------------------------------------------
// Usage Checks
// ----------------------------------------------------------------------------

#[test]
fn test_update_before_refresh_sends_nothing() {
    let mut h = Harness::new();
    let (_, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    let err = h
        .engine
        .submit_update(UpdateMsg::new(DomainType::MARKET_PRICE), handle)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidHandleState);
    assert_eq!(h.transport.sent_count(), 0);
    let (kind, text) = last_error(&h);
    assert_eq!(kind, ErrorKind::InvalidHandleState);
    assert!(text.contains(&format!(
        "Attempt to submit UpdateMsg while RefreshMsg was not submitted on this stream yet. Handle = {}.",
        handle
    )));
}

#[test]
fn test_update_before_refresh_allowed_when_relaxed() {
    let mut config = ProviderConfig::testing();
    config.session.refresh_first_required = false;
    let mut h = Harness::with_config(config);
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    h.engine
        .submit_update(UpdateMsg::new(DomainType::MARKET_PRICE), handle)
        .expect("update sent");
    assert_eq!(h.transport.sent_to(channel).len(), 1);
}

#[test]
fn test_refresh_then_update_reach_the_stream() {
    let mut h = Harness::new();
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    h.engine
        .submit_refresh(item_refresh("TRI.N"), handle)
        .expect("refresh sent");
    h.engine
        .submit_update(UpdateMsg::new(DomainType::MARKET_PRICE), handle)
        .expect("update sent");

    let sent = h.transport.sent_to(channel);
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|message| message.stream_id() == StreamId(5)));
    assert!(matches!(sent[1], Message::Update(_)));
    assert_eq!(
        h.engine.lookup(handle).map(ItemRecord::state),
        Some(ItemState::Open)
    );
}

#[test]
fn test_submit_to_unknown_handle() {
    let mut h = Harness::new();
    let result = h
        .engine
        .submit_refresh(item_refresh("TRI.N"), ItemHandle::new(999));

    assert!(result.unwrap_err().is_invalid_usage());
    assert_eq!(
        last_error(&h).1,
        "Invalid usage: Attempt to submit RefreshMsg with non existent Handle = 999."
    );
}

#[test]
fn test_item_domain_fanout_rejected() {
    let mut h = Harness::new();
    open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    let err = h
        .engine
        .submit_update(UpdateMsg::new(DomainType::MARKET_PRICE), ItemHandle::FANOUT)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Attempt to fanout UpdateMsg with domain type"));
    assert_eq!(h.transport.sent_count(), 0);
}

#[test]
fn test_login_update_rejected() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    let login = h.handle_of(channel, LOGIN_STREAM).expect("login stream");

    let err = h
        .engine
        .submit_update(UpdateMsg::new(DomainType::LOGIN), login)
        .unwrap_err();
    assert!(err.is_invalid_usage());
    assert!(err
        .to_string()
        .contains("Attempt to submit UpdateMsg with login domain while this is not supported."));
}

#[test]
fn test_dictionary_generic_rejected() {
    let mut h = Harness::new();
    let generic = GenericMsg {
        domain: Some(DomainType::DICTIONARY),
        ..GenericMsg::default()
    };
    let err = h
        .engine
        .submit_generic(generic, ItemHandle::FANOUT)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Attempt to submit GenericMsg with Dictionary domain while this is not supported."));
}

#[test]
fn test_directory_refresh_requires_map() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, full_directory_request(2));
    let handle = h.handle_of(channel, 2).expect("directory stream");

    let refresh = RefreshMsg::new(DomainType::SOURCE).payload(Payload::FieldList(Vec::new()));
    let err = h.engine.submit_refresh(refresh, handle).unwrap_err();
    assert!(err.to_string().contains(
        "Attempt to submit RefreshMsg with SourceDirectory domain using container with wrong data type. Expected container data type is MapEnum. Passed in is FieldListEnum"
    ));
}

#[test]
fn test_dictionary_refresh_requires_series() {
    let mut config = ProviderConfig::testing();
    config.dictionary.admin_control = AdminControl::User;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.request(channel, dictionary_request(3, "RWFFld"));
    let handle = h.handle_of(channel, 3).expect("dictionary stream");
    h.transport.take();

    let refresh = RefreshMsg::new(DomainType::DICTIONARY)
        .state(State::open_ok("ok"))
        .payload(Payload::FieldList(Vec::new()));
    let err = h.engine.submit_refresh(refresh, handle).unwrap_err();
    assert!(err.is_invalid_usage());
    assert!(err.to_string().contains(
        "Attempt to submit RefreshMsg with Dictionary domain using container with wrong data type. Expected container data type is SeriesEnum. Passed in is FieldListEnum"
    ));
    assert_eq!(h.transport.sent_count(), 0);
}

#[test]
fn test_unknown_service_name_on_submit() {
    let mut h = Harness::new();
    let (_, handle) = open_item(&mut h, 1, "TRI.N");

    let refresh = RefreshMsg::new(DomainType::MARKET_PRICE)
        .name("TRI.N")
        .service_name("NOWHERE")
        .state(State::open_ok("ok"));
    let err = h.engine.submit_refresh(refresh, handle).unwrap_err();
    assert!(err.to_string().contains(
        "Attempt to submit RefreshMsg with service name of NOWHERE that was not included in the SourceDirectory. Dropping this RefreshMsg."
    ));
}

#[test]
fn test_service_name_resolved_on_submit() {
    let mut h = Harness::new();
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    let refresh = RefreshMsg::new(DomainType::MARKET_PRICE)
        .name("TRI.N")
        .service_name("DIRECT_FEED")
        .state(State::open_ok("ok"));
    h.engine.submit_refresh(refresh, handle).expect("refresh sent");

    let sent = h.refreshes(channel);
    assert_eq!(sent[0].key.service_id, Some(ServiceId(1)));
}

#[test]
fn test_unsupported_consumer_calls() {
    let mut h = Harness::new();
    let request = item_request(5, "TRI.N");

    assert!(h.engine.register_client(&request).is_err());
    assert!(h.engine.reissue(&request, ItemHandle::new(1)).is_err());
    assert!(h.engine.unregister(ItemHandle::new(1)).is_err());

    let errors = h.errors.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|(kind, _)| *kind == ErrorKind::InvalidUsage));
    assert!(errors[0]
        .1
        .contains("Calling the ProviderEngine::register_client() method is not supported in this release."));
}

// ----------------------------------------------------------------------------
// Post-conditions
// ----------------------------------------------------------------------------

#[test]
fn test_terminal_status_removes_record() {
    let mut h = Harness::new();
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");

    let status = StatusMsg::new(DomainType::MARKET_PRICE, closed_recover("Item gone"));
    h.engine.submit_status(status, handle).expect("status sent");

    assert!(h.engine.lookup(handle).is_none());
    assert!(h.handle_of(channel, 5).is_none());
    assert_eq!(h.last_reject(channel).as_deref(), Some("Item gone"));
}

#[test]
fn test_snapshot_completes_on_final_refresh() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, item_request(5, "TRI.N").snapshot());
    let handle = h.handle_of(channel, 5).expect("open");

    h.engine
        .submit_refresh(item_refresh("TRI.N").complete(false), handle)
        .expect("first part");
    assert!(h.engine.lookup(handle).is_some());

    h.engine
        .submit_refresh(item_refresh("TRI.N").complete(true), handle)
        .expect("last part");
    assert!(h.engine.lookup(handle).is_none());
}

#[test]
fn test_closing_login_closes_channel() {
    let mut h = Harness::new();
    let (channel, item) = open_item(&mut h, 1, "TRI.N");
    let login = h.handle_of(channel, LOGIN_STREAM).expect("login stream");

    let status = StatusMsg::new(
        DomainType::LOGIN,
        State::new(
            StreamState::Closed,
            DataState::Suspect,
            StatusCode::NotAuthorized,
            "Logged out",
        ),
    );
    h.engine.submit_status(status, login).expect("status sent");

    assert_eq!(h.transport.closed(), vec![channel]);
    assert!(h.engine.session(channel).is_none());
    assert!(h.engine.lookup(item).is_none());
    assert_eq!(h.engine.open_handle_count(), 0);
}

// ----------------------------------------------------------------------------
// Acks
// ----------------------------------------------------------------------------

fn receive_post(h: &mut Harness, channel: ChannelId, post_id: u32) {
    h.receive(
        channel,
        Message::Post(PostMsg {
            stream_id: StreamId(5),
            domain: DomainType::MARKET_PRICE,
            post_id: Some(post_id),
            ack_requested: true,
            ..PostMsg::default()
        }),
    );
}

#[test]
fn test_ack_matches_received_post() {
    let mut config = ProviderConfig::testing();
    config.session.enforce_ack_id_validation = true;
    let mut h = Harness::with_config(config);
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");
    receive_post(&mut h, channel, 77);
    h.transport.take();

    h.engine.submit_ack(AckMsg::new(77), handle).expect("ack sent");
    let sent = h.transport.sent_to(channel);
    assert!(matches!(&sent[0], Message::Ack(ack) if ack.ack_id == 77 && ack.stream_id == StreamId(5)));

    let err = h.engine.submit_ack(AckMsg::new(77), handle).unwrap_err();
    assert!(err.to_string().contains(&format!(
        "Attempt to submit AckMsg with ack id 77 that does not match any PostMsg received on this stream. Handle = {}.",
        handle
    )));
}

#[test]
fn test_ack_unchecked_by_default() {
    let mut h = Harness::new();
    let (channel, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport.take();

    h.engine.submit_ack(AckMsg::new(5), handle).expect("ack sent");
    assert_eq!(h.transport.sent_to(channel).len(), 1);
}

// ----------------------------------------------------------------------------
// Transport Failures
// ----------------------------------------------------------------------------

#[test]
fn test_fatal_submit_reported() {
    let mut h = Harness::new();
    let (_, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport
        .fail_next(SubmitStatus::Fatal { reason: "connection reset".into() });

    let err = h
        .engine
        .submit_refresh(item_refresh("TRI.N"), handle)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(h.engine.stats().transport_failures, 1);
    assert_eq!(
        h.engine.lookup(handle).map(ItemRecord::state),
        Some(ItemState::Pending)
    );
    assert_eq!(last_error(&h).0, ErrorKind::TransportFailure);
}

#[test]
fn test_retryable_submit_is_would_block() {
    let mut h = Harness::new();
    let (_, handle) = open_item(&mut h, 1, "TRI.N");
    h.transport
        .fail_next(SubmitStatus::Retryable { reason: "queue full".into() });

    let err = h
        .engine
        .submit_refresh(item_refresh("TRI.N"), handle)
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Transport(TransportError::WouldBlock { .. })
    ));

    h.engine
        .submit_refresh(item_refresh("TRI.N"), handle)
        .expect("retry succeeds");
}

// ----------------------------------------------------------------------------
// Directory Fan-out
// ----------------------------------------------------------------------------

#[test]
fn test_directory_fanout_filtered_per_stream() {
    let mut h = Harness::new();
    let narrow = h.connect_logged_in(1);
    h.request(narrow, directory_request(2, filter::INFO | filter::STATE));
    let wide = h.connect_logged_in(2);
    h.request(wide, directory_request(2, filter::ALL));
    h.transport.take();

    let update = directory_update(vec![ServiceUpdate::new(1, MapAction::Update)
        .with_state(FilterAction::Set, ServiceState::up())
        .with_load(
            FilterAction::Set,
            ServiceLoad {
                open_limit: Some(100),
                ..ServiceLoad::default()
            },
        )]);
    h.engine
        .submit_update(update, ItemHandle::FANOUT)
        .expect("fan-out");

    let narrow_update = match &h.transport.sent_to(narrow)[0] {
        Message::Update(update) => update.clone(),
        other => panic!("unexpected {:?}", other),
    };
    let services = narrow_update.payload.directory().expect("directory map");
    assert!(services[0].state.is_some());
    assert!(services[0].load.is_none());
    assert_eq!(narrow_update.key.filter, Some(filter::INFO | filter::STATE));

    let wide_update = match &h.transport.sent_to(wide)[0] {
        Message::Update(update) => update.clone(),
        other => panic!("unexpected {:?}", other),
    };
    let services = wide_update.payload.directory().expect("directory map");
    assert!(services[0].load.is_some());
}

#[test]
fn test_service_delete_invalidates_items() {
    let mut h = Harness::new();
    let (first, first_item) = open_item(&mut h, 1, "TRI.N");
    let (second, second_item) = open_item(&mut h, 2, "IBM.N");
    h.request(first, full_directory_request(2));

    h.engine
        .submit_update(
            directory_update(vec![ServiceUpdate::delete(1)]),
            ItemHandle::FANOUT,
        )
        .expect("fan-out");

    assert!(h.engine.lookup(first_item).is_none());
    assert!(h.engine.lookup(second_item).is_none());
    assert!(h.handle_of(first, 2).is_some());
    assert!(h.handle_of(second, LOGIN_STREAM).is_some());
    assert!(h.engine.directory().service(ServiceId(1)).is_none());
}

#[test]
fn test_service_closed_recover_invalidates_items() {
    let mut h = Harness::new();
    let (first, first_item) = open_item(&mut h, 1, "TRI.N");
    let (second, second_item) = open_item(&mut h, 2, "IBM.N");

    let down = ServiceState {
        service_state: 0,
        accepting_requests: Some(false),
        status: Some(closed_recover("Service down")),
    };
    h.engine
        .submit_update(
            directory_update(vec![
                ServiceUpdate::new(1, MapAction::Update).with_state(FilterAction::Set, down)
            ]),
            ItemHandle::FANOUT,
        )
        .expect("fan-out");

    assert!(h.engine.lookup(first_item).is_none());
    assert!(h.engine.lookup(second_item).is_none());
    assert!(h.handle_of(first, 5).is_none());
    assert!(h.handle_of(second, 5).is_none());
    assert!(h.handle_of(first, LOGIN_STREAM).is_some());
    assert!(h.engine.directory().service(ServiceId(1)).is_some());
    assert!(!h.engine.directory().is_accepting_requests(ServiceId(1)));
}

#[test]
fn test_failed_directory_batch_changes_nothing() {
    let mut h = Harness::new();
    let channel = h.connect_logged_in(1);
    h.request(channel, full_directory_request(2));
    h.transport.take();

    let named = |name: &str| ServiceInfo {
        name: name.to_string(),
        ..ServiceInfo::default()
    };
    let updates = vec![
        ServiceUpdate::new(10, MapAction::Add)
            .with_info(named("NEW"))
            .with_state(FilterAction::Set, ServiceState::up()),
        ServiceUpdate::new(11, MapAction::Add).with_info(named("DIRECT_FEED")),
    ];
    let err = h
        .engine
        .submit_update(directory_update(updates), ItemHandle::FANOUT)
        .unwrap_err();

    assert!(err.is_invalid_usage());
    assert_eq!(h.transport.sent_count(), 0);
    assert!(h.engine.directory().service_id_by_name("NEW").is_none());
    assert!(h.engine.directory().service(ServiceId(10)).is_none());
    assert_eq!(h.engine.directory().len(), 1);
}

#[test]
fn test_group_merge_then_closed_recover() {
    let mut h = Harness::new();
    let (channel, item) = open_item(&mut h, 1, "TRI.N");
    h.request(channel, full_directory_request(2));
    h.engine
        .submit_refresh(item_refresh("TRI.N").group(&[1, 2]), item)
        .expect("refresh sent");
    assert_eq!(
        h.engine.lookup(item).and_then(ItemRecord::group),
        Some(&ItemGroupId::new(&[1, 2]))
    );

    let merge = ServiceGroupState {
        group: ItemGroupId::new(&[1, 2]),
        merged_to_group: Some(ItemGroupId::new(&[9])),
        status: None,
    };
    h.engine
        .submit_update(
            directory_update(vec![ServiceUpdate::new(1, MapAction::Update).with_group(merge)]),
            ItemHandle::FANOUT,
        )
        .expect("merge");
    assert_eq!(
        h.engine.lookup(item).and_then(ItemRecord::group),
        Some(&ItemGroupId::new(&[9]))
    );

    let close = ServiceGroupState {
        group: ItemGroupId::new(&[9]),
        merged_to_group: None,
        status: Some(closed_recover("Group down")),
    };
    h.engine
        .submit_update(
            directory_update(vec![ServiceUpdate::new(1, MapAction::Update).with_group(close)]),
            ItemHandle::FANOUT,
        )
        .expect("close group");
    assert!(h.engine.lookup(item).is_none());
    assert!(h.handle_of(channel, 2).is_some());
}

#[test]
fn test_update_fanout_skips_streams_without_refresh() {
    let mut config = ProviderConfig::testing();
    config.directory.admin_control = AdminControl::User;
    let mut h = Harness::with_config(config);
    let channel = h.connect_logged_in(1);
    h.request(channel, full_directory_request(2));
    h.transport.take();

    h.engine
        .submit_update(
            directory_update(vec![ServiceUpdate::new(1, MapAction::Update)
                .with_state(FilterAction::Set, ServiceState::up())]),
            ItemHandle::FANOUT,
        )
        .expect("nothing to send");
    assert_eq!(h.transport.sent_count(), 0);
}
