mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use common::{commentary, config, connected, send, settle, FeedTransport};
use matchfeed_rs::stream::ConnectionManager;
use matchfeed_rs::{ConnectionState, Error, StreamEvent, TransportKind};

#[tokio::test(start_paused = true)]
async fn subscribes_to_match_stream_endpoint() {
    let transport = FeedTransport::new();
    let _feed = transport.feed();
    let mut manager = ConnectionManager::new(config(), transport.clone());

    let handle = assert_ok!(manager.connect("65f1c0", |_| {}, |_| {}));
    settle().await;

    assert_eq!(
        handle.url().as_str(),
        "http://localhost:5000/api/commentary/stream/65f1c0"
    );
    assert_eq!(transport.urls(), vec![handle.url().to_string()]);
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn websocket_config_uses_ws_scheme() {
    let transport = FeedTransport::new();
    let _feed = transport.feed();
    let config = common::config().with_transport(TransportKind::WebSocket);
    let mut manager = ConnectionManager::new(config, transport.clone());

    let handle = assert_ok!(manager.connect("M1", |_| {}, |_| {}));
    assert_eq!(handle.url().scheme(), "ws");
}

#[tokio::test(start_paused = true)]
async fn events_are_dispatched_in_delivery_order() {
    let transport = FeedTransport::new();
    let feed = transport.feed();
    let mut manager = ConnectionManager::new(config(), transport.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    assert_ok!(manager.connect(
        "M1",
        move |event: &StreamEvent| sink.lock().push(event.type_name().to_string()),
        |_| {},
    ));

    send(&feed, &connected("M1"));
    send(&feed, r#"{"type":"score_update","score":{"runs":"10","overs":"1.2"}}"#);
    send(&feed, "garbage");
    send(&feed, r#"{"type":"over_summary","over":3}"#);
    send(&feed, &commentary(1, "Four!", None));
    send(&feed, r#"{"type":"wicket","score":{"runs":10,"wickets":1},"dismissal":{"type":"bowled"}}"#);
    settle().await;

    assert_eq!(
        *seen.lock(),
        vec!["connected", "score_update", "over_summary", "commentary", "wicket"]
    );
}

#[tokio::test(start_paused = true)]
async fn typed_listeners_only_see_their_event_type() {
    let transport = FeedTransport::new();
    let feed = transport.feed();
    let mut manager = ConnectionManager::new(config(), transport.clone());

    let texts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&texts);
    manager.add_event_listener(StreamEvent::COMMENTARY, move |event| {
        if let StreamEvent::Commentary(c) = event {
            sink.lock().push(c.commentary.text.clone());
        }
    });
    assert_ok!(manager.connect("M1", |_| {}, |_| {}));

    send(&feed, &connected("M1"));
    send(&feed, &commentary(1, "Dot ball", None));
    send(&feed, &commentary(2, "SIX!", None));
    settle().await;

    assert_eq!(*texts.lock(), vec!["Dot ball", "SIX!"]);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_reports_terminal_failure_once() {
    let transport = FeedTransport::new();
    let config = config()
        .with_max_reconnect_attempts(3)
        .with_reconnect_base_delay(Duration::from_millis(100));
    let mut manager = ConnectionManager::new(config, transport.clone());

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    assert_ok!(manager.connect("M1", |_| {}, move |err: &Error| {
        sink.lock().push(err.is_terminal());
    }));

    // 100 + 200 + 300 ms of backoff
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*errors.lock(), vec![false, false, false, false, true]);
    assert_eq!(transport.opens(), 4);

    let status = manager.reconnect_status();
    assert!(status.exhausted);
    assert!(!status.is_reconnecting);
    assert_eq!(manager.state(), ConnectionState::Errored);
}

#[tokio::test(start_paused = true)]
async fn disconnect_then_connect_starts_fresh() {
    let transport = FeedTransport::new();
    let mut manager = ConnectionManager::new(config(), transport.clone());

    assert_ok!(manager.connect("M1", |_| {}, |_| {}));
    settle().await;
    assert_eq!(manager.reconnect_status().attempts, 1);

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Closed);

    let _feed = transport.feed();
    let handle = assert_ok!(manager.connect("M1", |_| {}, |_| {}));
    settle().await;
    assert_eq!(handle.generation(), 2);
    assert_eq!(manager.reconnect_status().attempts, 0);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn empty_match_id_is_rejected() {
    let mut manager = ConnectionManager::new(config(), FeedTransport::new());
    let err = assert_err!(manager.connect("", |_| {}, |_| {}));
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert!(manager.current_match_id().is_none());
}
