use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::player::ClipPlayer;
use crate::error::{Error, Result};

struct QueueState {
    pending: VecDeque<Url>,
    current: Option<Url>,
    volume: f32,
    worker: Option<JoinHandle<()>>,
    /// Bumped by `clear`; a worker from an older generation must exit
    generation: u64,
}

/// FIFO of narration clips, played strictly one at a time.
///
/// A single worker task drains the queue through the [`ClipPlayer`], so two
/// clips can never overlap. When a clip ends or fails the worker moves on to
/// the next one; an empty queue just leaves the worker idle.
pub struct AudioPlaybackQueue {
    player: Arc<dyn ClipPlayer>,
    media_base: Url,
    state: Arc<Mutex<QueueState>>,
}

impl AudioPlaybackQueue {
    /// Create a queue that resolves relative clip URLs against `media_base`
    pub fn new(player: Arc<dyn ClipPlayer>, media_base: Url) -> Self {
        Self {
            player,
            media_base,
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                current: None,
                volume: 1.0,
                worker: None,
                generation: 0,
            })),
        }
    }

    /// Resolve a clip reference: absolute `http(s)` URLs pass through,
    /// anything else is appended to the media base.
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Playback("empty clip URL".to_string()));
        }
        let lower = raw.to_ascii_lowercase();
        let url = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(raw)
        } else {
            self.media_base.join(raw.trim_start_matches('/'))
        };
        url.map_err(|e| Error::Playback(format!("cannot resolve clip URL {}: {}", raw, e)))
    }

    /// Append a clip; starts playback at once if nothing is playing.
    ///
    /// Returns `false` when the URL could not be resolved; that clip is
    /// logged and skipped.
    pub fn enqueue(&self, raw_url: &str) -> bool {
        let url = match self.resolve(raw_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "skipping narration clip");
                return false;
            }
        };

        let mut state = self.state.lock();
        debug!(url = %url, queued = state.pending.len() + 1, "queueing narration clip");
        state.pending.push_back(url);

        if state.worker.is_none() {
            let worker = Worker {
                player: Arc::clone(&self.player),
                state: Arc::clone(&self.state),
                generation: state.generation,
            };
            state.worker = Some(tokio::spawn(worker.run()));
        }
        true
    }

    /// Stop the current clip and discard everything pending
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        let dropped = state.pending.len();
        state.pending.clear();
        state.current = None;
        if let Some(worker) = state.worker.take() {
            worker.abort();
        }
        debug!(dropped, "audio queue cleared");
    }

    /// Set the session volume (clamped to `0.0..=1.0`) for the current clip
    /// and every later one
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        let playing = {
            let mut state = self.state.lock();
            state.volume = volume;
            state.current.is_some()
        };
        if playing {
            self.player.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn current(&self) -> Option<Url> {
        self.state.lock().current.clone()
    }

    /// Number of clips waiting behind the current one
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.current.is_none() && state.pending.is_empty()
    }
}

impl Drop for AudioPlaybackQueue {
    fn drop(&mut self) {
        if let Some(worker) = self.state.lock().worker.take() {
            worker.abort();
        }
    }
}

struct Worker {
    player: Arc<dyn ClipPlayer>,
    state: Arc<Mutex<QueueState>>,
    generation: u64,
}

impl Worker {
    async fn run(self) {
        loop {
            let (url, volume) = {
                let mut state = self.state.lock();
                if state.generation != self.generation {
                    return;
                }
                match state.pending.pop_front() {
                    Some(url) => {
                        state.current = Some(url.clone());
                        (url, state.volume)
                    }
                    None => {
                        state.current = None;
                        state.worker = None;
                        debug!("audio queue idle");
                        return;
                    }
                }
            };

            info!(url = %url, "playing narration clip");
            match self.player.play(&url, volume).await {
                Ok(()) => debug!(url = %url, "narration clip finished"),
                Err(e) => warn!(url = %url, error = %e, "narration playback failed, advancing"),
            }
        }
    }
}
