#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use matchfeed_rs::audio::ClipPlayer;
use matchfeed_rs::stream::{PayloadStream, Transport};
use matchfeed_rs::{Error, Result, StreamConfig};

pub type Feed = mpsc::UnboundedSender<Result<String>>;

/// In-memory transport: each `open` takes the next prepared feed, and
/// refuses the connection once none are left.
#[derive(Default)]
pub struct FeedTransport {
    feeds: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String>>>>,
    urls: Mutex<Vec<String>>,
    opens: AtomicUsize,
}

impl FeedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Prepare the connection served by a later `open`
    pub fn feed(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().push_back(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Transport for FeedTransport {
    async fn open(&self, url: &Url) -> Result<PayloadStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());
        match self.feeds.lock().pop_front() {
            Some(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            None => Err(Error::Transport("connection refused".into())),
        }
    }
}

/// Records clip starts and ends; clips listed in `failing` error at once
#[derive(Default)]
pub struct RecordingPlayer {
    pub log: Mutex<Vec<String>>,
    pub failing: Vec<String>,
}

impl RecordingPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: paths.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl ClipPlayer for RecordingPlayer {
    async fn play(&self, url: &Url, _volume: f32) -> Result<()> {
        let path = url.path().to_string();
        if self.failing.contains(&path) {
            self.log.lock().push(format!("fail {}", path));
            return Err(Error::Playback("unsupported format".into()));
        }
        self.log.lock().push(format!("start {}", path));
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.log.lock().push(format!("end {}", path));
        Ok(())
    }

    fn set_volume(&self, _volume: f32) {}
}

pub fn config() -> StreamConfig {
    StreamConfig::new("http://localhost:5000/api")
}

pub fn send(feed: &Feed, payload: &str) {
    feed.send(Ok(payload.to_string())).expect("feed closed");
}

pub fn connected(match_id: &str) -> String {
    format!(r#"{{"type":"connected","matchId":"{}"}}"#, match_id)
}

pub fn commentary(id: u32, text: &str, audio: Option<&str>) -> String {
    let mut item = serde_json::json!({"id": id, "text": text, "eventType": "OTHER"});
    if let Some(audio) = audio {
        item["audioUrl"] = audio.into();
    }
    serde_json::json!({"type": "commentary", "commentary": item}).to_string()
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
