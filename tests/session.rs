mod common;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use common::{commentary, config, connected, send, settle, FeedTransport, RecordingPlayer};
use matchfeed_rs::session::{CONNECTION_LOST_MESSAGE, RECONNECT_EXHAUSTED_MESSAGE};
use matchfeed_rs::{
    CommentaryId, CommentaryStream, ConnectionState, Error, LastScore, MatchId, MatchRefresher,
    Result, StreamConfig,
};

fn session(config: StreamConfig) -> (CommentaryStream, Arc<FeedTransport>, Arc<RecordingPlayer>) {
    let transport = FeedTransport::new();
    let player = RecordingPlayer::new();
    let stream = CommentaryStream::new(config, transport.clone(), player.clone()).unwrap();
    (stream, transport, player)
}

#[tokio::test(start_paused = true)]
async fn commentary_with_audio_reaches_buffer_and_queue() {
    let (mut stream, transport, player) = session(config());
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, &connected("M1"));
    send(&feed, &commentary(1, "Four!", Some("/a.mp3")));
    settle().await;

    let snapshot = stream.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Open);
    assert_eq!(snapshot.reconnect.attempts, 0);
    let head = snapshot.commentary.first().unwrap();
    assert_eq!(head.id, Some(CommentaryId::Number(1)));
    assert_eq!(snapshot.latest.as_ref(), Some(head));
    assert_eq!(player.log(), vec!["start /a.mp3"]);
}

#[tokio::test(start_paused = true)]
async fn narration_plays_in_arrival_order_and_skips_failures() {
    let transport = FeedTransport::new();
    let player = RecordingPlayer::failing(&["/b.mp3"]);
    let mut stream = CommentaryStream::new(config(), transport.clone(), player.clone()).unwrap();
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, &commentary(1, "one", Some("/a.mp3")));
    send(&feed, &commentary(2, "two", Some("/b.mp3")));
    send(&feed, &commentary(3, "three", Some("/c.mp3")));
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        player.log(),
        vec!["start /a.mp3", "end /a.mp3", "fail /b.mp3", "start /c.mp3", "end /c.mp3"]
    );
}

#[tokio::test(start_paused = true)]
async fn buffer_keeps_most_recent_items() {
    let (mut stream, transport, _) = session(config().with_buffer_size(50));
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    for n in 1..=60 {
        send(&feed, &commentary(n, &format!("ball {}", n), None));
    }
    settle().await;

    let snapshot = stream.snapshot();
    assert_eq!(snapshot.commentary.len(), 50);
    assert_eq!(snapshot.commentary[0].text, "ball 60");
    assert_eq!(snapshot.commentary[49].text, "ball 11");
}

#[tokio::test(start_paused = true)]
async fn score_and_wicket_update_the_score_slot_only() {
    let (mut stream, transport, _) = session(config());
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, r#"{"type":"score_update","score":{"runs":42,"wickets":2,"overs":6.4}}"#);
    settle().await;
    let snapshot = stream.snapshot();
    assert!(matches!(snapshot.last_score, Some(LastScore::Score(_))));
    assert!(snapshot.commentary.is_empty());

    send(
        &feed,
        r#"{"type":"wicket","score":{"runs":42,"wickets":3},"dismissal":{"type":"caught","batsman":"Kohli"}}"#,
    );
    settle().await;
    match stream.snapshot().last_score {
        Some(LastScore::Wicket(wicket)) => {
            assert_eq!(wicket.score.unwrap().wickets, 3);
            assert_eq!(wicket.dismissal.unwrap().batter_name.as_deref(), Some("Kohli"));
        }
        other => panic!("expected wicket, got {:?}", other),
    }
}

struct CountingRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl MatchRefresher for CountingRefresher {
    async fn refresh(&self, match_id: &MatchId) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 2 {
            return Err(Error::Api {
                status: 503,
                message: "busy".into(),
            });
        }
        Ok(json!({"id": match_id.as_str(), "refresh": n}))
    }
}

#[tokio::test(start_paused = true)]
async fn score_events_trigger_match_refresh() {
    let refresher = Arc::new(CountingRefresher {
        calls: AtomicUsize::new(0),
    });
    let transport = FeedTransport::new();
    let mut stream = CommentaryStream::new(config(), transport.clone(), RecordingPlayer::new())
        .unwrap()
        .with_refresher(refresher.clone());
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, r#"{"type":"score_update","score":{"runs":1}}"#);
    settle().await;
    assert_eq!(stream.snapshot().match_details, Some(json!({"id": "M1", "refresh": 1})));

    // a failed refresh keeps the previous details
    send(&feed, r#"{"type":"wicket","score":{"runs":1,"wickets":1}}"#);
    settle().await;
    assert_eq!(stream.snapshot().match_details, Some(json!({"id": "M1", "refresh": 1})));

    send(&feed, &commentary(1, "no refresh for commentary", None));
    settle().await;
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
}

/// Each refresh takes longer than the one after it
struct SlowFirstRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl MatchRefresher for SlowFirstRefresher {
    async fn refresh(&self, _match_id: &MatchId) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = if n == 1 { 2000 } else { 100 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(json!({"refresh": n}))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_older_refresh_does_not_overwrite_newer_details() {
    let transport = FeedTransport::new();
    let mut stream = CommentaryStream::new(config(), transport.clone(), RecordingPlayer::new())
        .unwrap()
        .with_refresher(Arc::new(SlowFirstRefresher {
            calls: AtomicUsize::new(0),
        }));
    let feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, r#"{"type":"score_update","score":{"runs":4}}"#);
    send(&feed, r#"{"type":"score_update","score":{"runs":10}}"#);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(stream.snapshot().match_details, Some(json!({"refresh": 2})));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(stream.snapshot().match_details, Some(json!({"refresh": 2})));
}

#[tokio::test(start_paused = true)]
async fn state_poll_publishes_open_without_server_event() {
    let config = config();
    let poll = config.state_poll_interval;
    let (mut stream, transport, _) = session(config);
    let _feed = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);
    let mut updates = stream.subscribe();

    // the transport is open but no application event has arrived
    settle().await;
    assert_eq!(transport.opens(), 1);
    assert_eq!(stream.snapshot().connection_state, ConnectionState::Connecting);
    assert!(!updates.has_changed().unwrap());

    tokio::time::sleep(poll).await;
    assert!(updates.has_changed().unwrap());
    let snapshot = updates.borrow_and_update().clone();
    assert_eq!(snapshot.connection_state, ConnectionState::Open);
    assert!(snapshot.connected);

    // nothing moved, so idle polls publish nothing
    tokio::time::sleep(poll * 5).await;
    assert!(!updates.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn exhaustion_then_manual_reconnect_recovers() {
    let config = config()
        .with_max_reconnect_attempts(2)
        .with_reconnect_base_delay(Duration::from_millis(100));
    let (mut stream, transport, _) = session(config);
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    settle().await;
    assert_eq!(stream.snapshot().last_error.as_deref(), Some(CONNECTION_LOST_MESSAGE));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = stream.snapshot();
    assert_eq!(snapshot.last_error.as_deref(), Some(RECONNECT_EXHAUSTED_MESSAGE));
    assert!(snapshot.reconnect.exhausted);
    assert_eq!(snapshot.connection_state, ConnectionState::Errored);
    assert_eq!(transport.opens(), 3);

    let feed = transport.feed();
    send(&feed, &connected("M1"));
    assert_ok!(stream.reconnect());
    settle().await;
    let snapshot = stream.snapshot();
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.connection_state, ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = stream.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Open);
    assert!(snapshot.connected);
    assert_eq!(snapshot.reconnect.attempts, 0);
    assert!(!snapshot.reconnect.exhausted);
    assert_eq!(transport.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_keeps_session_history() {
    let (mut stream, transport, _) = session(config());
    let first = transport.feed();
    let second = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);
    send(&first, &commentary(1, "before", None));
    settle().await;

    assert_ok!(stream.reconnect());
    send(&second, &commentary(2, "after", None));
    tokio::time::sleep(Duration::from_millis(600)).await;

    let texts: Vec<String> = stream.snapshot().commentary.into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["after", "before"]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_then_watch_starts_empty() {
    let (mut stream, transport, player) = session(config());
    let first = transport.feed();
    let second = transport.feed();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);
    send(&first, &commentary(1, "old", Some("/old-1.mp3")));
    send(&first, &commentary(2, "old", Some("/old-2.mp3")));
    settle().await;

    stream.disconnect().await;
    assert!(stream.snapshot().commentary.is_empty());
    assert_err!(stream.reconnect());

    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);
    let snapshot = stream.snapshot();
    assert!(snapshot.commentary.is_empty());
    assert!(snapshot.latest.is_none());

    send(&second, &commentary(3, "new", Some("/new.mp3")));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        player.log(),
        vec!["start /old-1.mp3", "start /new.mp3", "end /new.mp3"]
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_updates_are_observable() {
    let (mut stream, transport, _) = session(config());
    let feed = transport.feed();
    let mut updates = stream.subscribe();
    assert_ok!(stream.watch_match(Some(MatchId::from("M1"))).await);

    send(&feed, &connected("M1"));
    send(&feed, &commentary(1, "Four!", None));

    loop {
        assert_ok!(updates.changed().await);
        if updates.borrow_and_update().latest.is_some() {
            break;
        }
    }
    assert_eq!(stream.snapshot().latest.unwrap().text, "Four!");
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = StreamConfig::new("http://localhost:5000/api").with_buffer_size(0);
    let result = CommentaryStream::new(config, FeedTransport::new(), RecordingPlayer::new());
    assert!(matches!(result, Err(Error::Config(_))));
}
