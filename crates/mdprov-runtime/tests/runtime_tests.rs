//! Runtime integration tests
//!
//! Exercise both dispatch models with an in-memory transport, and the TCP
//! transport end to end over a loopback socket.

use std::net::SocketAddr;
use std::time::Duration;

use mdprov_core::testing::{ClientCall, RecordingClient, RecordingTransport};
use mdprov_core::{
    BincodeCodec, ChannelId, ChannelInfo, DomainType, Message, MessageCodec, MsgKey,
    OperationModel, ProviderConfig, RefreshMsg, RequestMsg, ServiceId, State,
};
use mdprov_runtime::{read_frame, write_frame, RuntimeBuilder, RuntimeError, TransportEvent};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(5);

fn encode(message: Message) -> Vec<u8> {
    BincodeCodec::new().encode(&message).expect("encode")
}

fn decode(bytes: &[u8]) -> Message {
    BincodeCodec::new().decode(bytes).expect("decode")
}

fn login() -> Vec<u8> {
    encode(Message::Request(RequestMsg::new(
        1,
        DomainType::LOGIN,
        MsgKey::named("user"),
    )))
}

fn item_request(stream_id: i32, name: &str) -> Vec<u8> {
    encode(Message::Request(RequestMsg::new(
        stream_id,
        DomainType::MARKET_PRICE,
        MsgKey::named(name).with_service(ServiceId(1)),
    )))
}

fn user_dispatch_config() -> ProviderConfig {
    let mut config = ProviderConfig::testing();
    config.dispatch.operation_model = OperationModel::UserDispatch;
    config
}

/// Poll `check` until it holds or the wait runs out
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

// ----------------------------------------------------------------------------
// User Dispatch
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_user_dispatch_processes_injected_events() {
    let transport = RecordingTransport::new();
    let mut runtime = RuntimeBuilder::new(user_dispatch_config())
        .transport(Box::new(transport.clone()))
        .client(Box::new(RecordingClient::accepting_logins()))
        .build_and_start()
        .await
        .expect("runtime");

    let channel = ChannelId::new(7);
    let events = runtime.event_sender();
    events
        .send(TransportEvent::ChannelUp {
            channel,
            info: ChannelInfo::new("127.0.0.1", 5000),
        })
        .await
        .expect("send");
    events
        .send(TransportEvent::Message {
            channel,
            bytes: login(),
        })
        .await
        .expect("send");

    let processed = runtime
        .dispatch(Duration::from_millis(50))
        .await
        .expect("dispatch");
    assert_eq!(processed, 2);

    let engine = runtime.engine();
    assert!(engine
        .lock()
        .await
        .session(channel)
        .map(|session| session.is_logged_in())
        .unwrap_or(false));
    assert!(matches!(
        transport.sent_to(channel).first(),
        Some(Message::Refresh(refresh)) if refresh.state.is_open_ok()
    ));

    runtime.shutdown().await.expect("shutdown");
    assert!(!runtime.is_running());
    assert!(matches!(
        runtime.dispatch(Duration::from_millis(1)).await,
        Err(RuntimeError::Shutdown)
    ));
}

#[tokio::test]
async fn test_user_dispatch_drives_dictionary_timers() {
    let mut config = user_dispatch_config();
    config.dictionary.field_fragment_size = 512;
    config.dictionary.part_delay_ms = 1;
    let transport = RecordingTransport::new();
    let mut runtime = RuntimeBuilder::new(config)
        .transport(Box::new(transport.clone()))
        .client(Box::new(RecordingClient::accepting_logins()))
        .field_dictionary(mdprov_core::FieldDictionary::from_fields(
            (1..=300).map(|fid| mdprov_core::dictionary::FieldDef::uint(fid, format!("F{}", fid))),
        ))
        .build_and_start()
        .await
        .expect("runtime");

    let channel = ChannelId::new(1);
    let events = runtime.event_sender();
    events
        .send(TransportEvent::ChannelUp {
            channel,
            info: ChannelInfo::default(),
        })
        .await
        .expect("send");
    events
        .send(TransportEvent::Message { channel, bytes: login() })
        .await
        .expect("send");
    events
        .send(TransportEvent::Message {
            channel,
            bytes: encode(Message::Request(RequestMsg::new(
                3,
                DomainType::DICTIONARY,
                MsgKey::named("RWFFld").with_service(ServiceId(1)),
            ))),
        })
        .await
        .expect("send");

    let engine = runtime.engine();
    let mut rounds = 0;
    while !engine.lock().await.is_dictionary_delivered(channel, "RWFFld") {
        runtime
            .dispatch(Duration::from_millis(20))
            .await
            .expect("dispatch");
        rounds += 1;
        assert!(rounds < 1_000, "dictionary never completed");
    }

    let parts = transport
        .sent_to(channel)
        .into_iter()
        .filter(|message| matches!(message, Message::Refresh(r) if r.domain == DomainType::DICTIONARY))
        .count();
    assert!(parts >= 2);
    assert_eq!(engine.lock().await.pending_timer_count(), 0);
}

#[tokio::test]
async fn test_dispatch_unavailable_in_api_model() {
    let mut runtime = RuntimeBuilder::new(ProviderConfig::testing())
        .transport(Box::new(RecordingTransport::new()))
        .build_and_start()
        .await
        .expect("runtime");

    assert!(matches!(
        runtime.dispatch(Duration::from_millis(1)).await,
        Err(RuntimeError::InvalidOperation { .. })
    ));
    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_listen_requires_tcp_transport() {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let result = RuntimeBuilder::new(ProviderConfig::testing())
        .listen(addr)
        .transport(Box::new(RecordingTransport::new()))
        .build_and_start()
        .await;
    assert!(matches!(result, Err(RuntimeError::InvalidOperation { .. })));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = ProviderConfig::testing();
    config.session.max_sessions = 0;
    let result = RuntimeBuilder::new(config)
        .transport(Box::new(RecordingTransport::new()))
        .build_and_start()
        .await;
    assert!(matches!(result, Err(RuntimeError::Provider(_))));
}

// ----------------------------------------------------------------------------
// API Dispatch
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_api_dispatch_runs_in_background() {
    let client = RecordingClient::accepting_logins();
    let mut runtime = RuntimeBuilder::new(ProviderConfig::testing())
        .transport(Box::new(RecordingTransport::new()))
        .client(Box::new(client.clone()))
        .build_and_start()
        .await
        .expect("runtime");
    assert!(runtime.is_running());

    let channel = ChannelId::new(2);
    let events = runtime.event_sender();
    events
        .send(TransportEvent::ChannelUp {
            channel,
            info: ChannelInfo::default(),
        })
        .await
        .expect("send");
    events
        .send(TransportEvent::Message { channel, bytes: login() })
        .await
        .expect("send");
    events
        .send(TransportEvent::Message {
            channel,
            bytes: item_request(5, "TRI.N"),
        })
        .await
        .expect("send");

    assert!(
        eventually(|| {
            let client = client.clone();
            async move { client.request_handles(DomainType::MARKET_PRICE).len() == 1 }
        })
        .await
    );

    let handle = client.request_handles(DomainType::MARKET_PRICE)[0];
    runtime
        .submit_refresh(
            RefreshMsg::new(DomainType::MARKET_PRICE)
                .name("TRI.N")
                .service_id(1)
                .state(State::open_ok("ok")),
            handle,
        )
        .await
        .expect("refresh");

    events
        .send(TransportEvent::ChannelDown {
            channel,
            reason: "gone".into(),
        })
        .await
        .expect("send");
    let engine = runtime.engine();
    assert!(
        eventually(|| {
            let engine = engine.clone();
            async move { engine.lock().await.session(channel).is_none() }
        })
        .await
    );
    assert!(client
        .calls()
        .iter()
        .any(|call| matches!(call, ClientCall::Close { request, .. } if request.domain == DomainType::LOGIN)));

    runtime.shutdown().await.expect("shutdown");
}

// ----------------------------------------------------------------------------
// TCP
// ----------------------------------------------------------------------------

async fn read_message(stream: &mut TcpStream) -> Option<Message> {
    let frame = tokio::time::timeout(WAIT, read_frame(stream, ChannelId::new(0), 1 << 20))
        .await
        .expect("frame in time")
        .expect("frame");
    frame.map(|bytes| decode(&bytes))
}

#[tokio::test]
async fn test_tcp_login_and_publish() {
    let client = RecordingClient::accepting_logins();
    let mut runtime = RuntimeBuilder::new(ProviderConfig::testing())
        .listen("127.0.0.1:0".parse().expect("addr"))
        .client(Box::new(client.clone()))
        .build_and_start()
        .await
        .expect("runtime");
    let addr = runtime.local_addr().expect("listening");

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    write_frame(&mut stream, &login()).await.expect("login");
    match read_message(&mut stream).await {
        Some(Message::Refresh(refresh)) => {
            assert_eq!(refresh.domain, DomainType::LOGIN);
            assert!(refresh.state.is_open_ok());
        }
        other => panic!("expected login refresh, got {:?}", other),
    }
    assert_eq!(runtime.connections().len(), 1);

    write_frame(&mut stream, &item_request(5, "IBM.N"))
        .await
        .expect("item");
    assert!(
        eventually(|| {
            let client = client.clone();
            async move { !client.request_handles(DomainType::MARKET_PRICE).is_empty() }
        })
        .await
    );
    let handle = client.request_handles(DomainType::MARKET_PRICE)[0];
    runtime
        .submit_refresh(
            RefreshMsg::new(DomainType::MARKET_PRICE)
                .name("IBM.N")
                .service_id(1)
                .state(State::open_ok("ok")),
            handle,
        )
        .await
        .expect("refresh");

    match read_message(&mut stream).await {
        Some(Message::Refresh(refresh)) => {
            assert_eq!(refresh.stream_id.0, 5);
            assert_eq!(refresh.key.name.as_deref(), Some("IBM.N"));
        }
        other => panic!("expected item refresh, got {:?}", other),
    }

    runtime.shutdown().await.expect("shutdown");
    assert!(read_message(&mut stream).await.is_none());
    assert!(runtime.connections().is_empty());
}

#[tokio::test]
async fn test_tcp_disconnect_tears_down_session() {
    let mut runtime = RuntimeBuilder::new(ProviderConfig::testing())
        .listen("127.0.0.1:0".parse().expect("addr"))
        .client(Box::new(RecordingClient::accepting_logins()))
        .build_and_start()
        .await
        .expect("runtime");
    let addr = runtime.local_addr().expect("listening");

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    write_frame(&mut stream, &login()).await.expect("login");
    assert!(read_message(&mut stream).await.is_some());

    let engine = runtime.engine();
    assert_eq!(engine.lock().await.channels().len(), 1);
    drop(stream);

    assert!(
        eventually(|| {
            let engine = engine.clone();
            async move { engine.lock().await.channels().is_empty() }
        })
        .await
    );
    assert!(runtime.connections().is_empty());
    assert_eq!(engine.lock().await.stats().channels_closed, 1);

    runtime.shutdown().await.expect("shutdown");
}
