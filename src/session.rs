//! Per-match session state for consumers.
//!
//! [`CommentaryStream`] bundles a [`ConnectionManager`], a
//! [`CommentaryBuffer`] and an [`AudioPlaybackQueue`] for the match being
//! watched and publishes an immutable [`StreamSnapshot`] after every change.
//! Each session runs as one actor task; switching matches drops the whole
//! session and builds a new one, so nothing from the previous match leaks.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audio::{AudioPlaybackQueue, ClipPlayer};
use crate::client::MatchRefresher;
use crate::commentary::CommentaryBuffer;
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::stream::{ConnectionManager, ReconnectStatus, SubscriptionHandle, Transport};
use crate::types::{
    CommentaryItem, ConnectionState, LastScore, MatchId, ServerErrorEvent, Severity, StreamEvent,
};

/// Error text shown while automatic reconnection is in progress
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Reconnecting…";
/// Error text shown once automatic reconnection gave up
pub const RECONNECT_EXHAUSTED_MESSAGE: &str = "Failed to connect after multiple attempts";

/// Point-in-time view of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    pub match_id: Option<MatchId>,
    pub connection_state: ConnectionState,
    pub connected: bool,
    /// Newest first, at most `buffer_size` items
    pub commentary: Vec<CommentaryItem>,
    pub latest: Option<CommentaryItem>,
    pub last_score: Option<LastScore>,
    pub last_error: Option<String>,
    pub reconnect: ReconnectStatus,
    /// Latest result of the match refresher, if one is configured
    pub match_details: Option<Value>,
}

#[derive(Debug)]
enum Command {
    Reconnect,
    ClearCommentary,
    SetVolume(f32),
}

/// Manager callbacks, forwarded into the session task
#[derive(Debug)]
enum Inbound {
    Event(StreamEvent),
    Failure { terminal: bool, message: String },
}

/// Inbound message tagged with the subscription generation that sent it
type Tagged = (u64, Inbound);

struct SessionHandle {
    match_id: MatchId,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Live commentary for one match at a time.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use matchfeed_rs::audio::SilentPlayer;
/// use matchfeed_rs::stream::transport_for;
/// use matchfeed_rs::{CommentaryStream, MatchId, StreamConfig};
///
/// #[tokio::main]
/// async fn main() -> matchfeed_rs::Result<()> {
///     let config = StreamConfig::from_env()?;
///     let transport = transport_for(&config);
///     let mut stream = CommentaryStream::new(config, transport, Arc::new(SilentPlayer))?;
///
///     let mut updates = stream.subscribe();
///     stream.watch_match(Some(MatchId::from("M1"))).await?;
///     while updates.changed().await.is_ok() {
///         let snapshot = updates.borrow().clone();
///         println!("{} items, state {}", snapshot.commentary.len(), snapshot.connection_state);
///     }
///     Ok(())
/// }
/// ```
pub struct CommentaryStream {
    config: StreamConfig,
    media_base: url::Url,
    transport: Arc<dyn Transport>,
    player: Arc<dyn ClipPlayer>,
    refresher: Option<Arc<dyn MatchRefresher>>,
    volume: f32,
    snapshot_tx: watch::Sender<StreamSnapshot>,
    session: Option<SessionHandle>,
}

impl CommentaryStream {
    pub fn new(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        player: Arc<dyn ClipPlayer>,
    ) -> Result<Self> {
        config.validate()?;
        let media_base = config.media_base()?;
        let (snapshot_tx, _) = watch::channel(StreamSnapshot {
            reconnect: ReconnectStatus {
                max_attempts: config.max_reconnect_attempts,
                ..ReconnectStatus::default()
            },
            ..StreamSnapshot::default()
        });
        Ok(Self {
            config,
            media_base,
            transport,
            player,
            refresher: None,
            volume: 1.0,
            snapshot_tx,
            session: None,
        })
    }

    /// Refresh match details through `refresher` after score-bearing events
    pub fn with_refresher(mut self, refresher: Arc<dyn MatchRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Switch the watched match.
    ///
    /// The previous session is torn down completely (subscription, buffered
    /// commentary, pending audio) before the new one starts. Watching the
    /// match already being watched does nothing; `None` just disconnects.
    pub async fn watch_match(&mut self, match_id: Option<MatchId>) -> Result<()> {
        let current = self.session.as_ref().map(|s| &s.match_id);
        if current == match_id.as_ref() {
            debug!(match_id = ?match_id, "already watching match");
            return Ok(());
        }

        self.teardown().await;

        let Some(match_id) = match_id else {
            return Ok(());
        };

        let audio = AudioPlaybackQueue::new(Arc::clone(&self.player), self.media_base.clone());
        audio.set_volume(self.volume);

        let (mut session, inbound_rx) = Session::new(
            match_id.clone(),
            self.config.clone(),
            Arc::clone(&self.transport),
            audio,
            self.refresher.clone(),
            self.snapshot_tx.clone(),
        )?;
        session.publish();

        let (commands, command_rx) = mpsc::unbounded_channel();

        info!(match_id = %match_id, "watching match");
        let task = tokio::spawn(session.run(command_rx, inbound_rx));
        self.session = Some(SessionHandle {
            match_id,
            commands,
            task,
        });
        Ok(())
    }

    /// Stop watching; clears the buffer and any pending audio
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!(match_id = %session.match_id, "closing session");
        session.task.abort();
        // the manager, queue and refresh tasks are dropped with the task
        if let Err(e) = session.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "session task failed");
            }
        }
        self.snapshot_tx.send_replace(StreamSnapshot {
            reconnect: ReconnectStatus {
                max_attempts: self.config.max_reconnect_attempts,
                ..ReconnectStatus::default()
            },
            ..StreamSnapshot::default()
        });
    }

    /// Drop the subscription and open a fresh one shortly after, with the
    /// reconnect counters reset. Works after retries were exhausted.
    pub fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect)
    }

    /// Empty the commentary history of the current session
    pub fn clear_commentary(&self) {
        if self.session.is_some() {
            if let Err(e) = self.send(Command::ClearCommentary) {
                debug!(error = %e, "clear commentary not delivered");
            }
        }
    }

    /// Session-wide narration volume, also carried over to later sessions
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        if self.session.is_some() {
            if let Err(e) = self.send(Command::SetVolume(self.volume)) {
                debug!(error = %e, "volume change not delivered");
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn current_match(&self) -> Option<&MatchId> {
        self.session.as_ref().map(|s| &s.match_id)
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn send(&self, command: Command) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("no match is being watched".to_string()))?;
        session
            .commands
            .send(command)
            .map_err(|_| Error::InvalidParameter("session has stopped".to_string()))
    }
}

impl Drop for CommentaryStream {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

/// Connect `manager`, routing its callbacks into the session inbox under
/// `generation`
fn subscribe(
    manager: &mut ConnectionManager,
    match_id: &MatchId,
    generation: u64,
    inbound: &mpsc::UnboundedSender<Tagged>,
) -> Result<SubscriptionHandle> {
    let events = inbound.clone();
    let failures = inbound.clone();
    manager.connect(
        match_id.clone(),
        move |event: &StreamEvent| {
            // the receiver is gone only once the session task has stopped
            let _ = events.send((generation, Inbound::Event(event.clone())));
        },
        move |err: &Error| {
            let _ = failures.send((
                generation,
                Inbound::Failure {
                    terminal: err.is_terminal(),
                    message: err.to_string(),
                },
            ));
        },
    )
}

/// Resolves at `at`, or never
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// State owned by one session task
struct Session {
    match_id: MatchId,
    config: StreamConfig,
    manager: ConnectionManager,
    buffer: CommentaryBuffer,
    audio: AudioPlaybackQueue,
    refresher: Option<Arc<dyn MatchRefresher>>,
    refreshes: JoinSet<(u64, Result<Value>)>,
    /// Sequence of the last refresh spawned and of the last one applied
    refresh_seq: u64,
    applied_refresh: u64,
    /// Bumped on every manual reconnect; older inbound messages are stale
    generation: u64,
    inbound_tx: mpsc::UnboundedSender<Tagged>,
    snapshot_tx: watch::Sender<StreamSnapshot>,
    snapshot: StreamSnapshot,
    warning_deadline: Option<Instant>,
    resume_at: Option<Instant>,
}

impl Session {
    /// Build the session for `match_id` and open its subscription
    fn new(
        match_id: MatchId,
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        audio: AudioPlaybackQueue,
        refresher: Option<Arc<dyn MatchRefresher>>,
        snapshot_tx: watch::Sender<StreamSnapshot>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Tagged>)> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let mut manager = ConnectionManager::new(config.clone(), transport);
        subscribe(&mut manager, &match_id, 0, &inbound_tx)?;

        let session = Session {
            buffer: CommentaryBuffer::new(config.buffer_size),
            snapshot: StreamSnapshot {
                match_id: Some(match_id.clone()),
                ..StreamSnapshot::default()
            },
            match_id,
            config,
            manager,
            audio,
            refresher,
            refreshes: JoinSet::new(),
            refresh_seq: 0,
            applied_refresh: 0,
            generation: 0,
            inbound_tx,
            snapshot_tx,
            warning_deadline: None,
            resume_at: None,
        };
        Ok((session, inbound_rx))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Tagged>,
    ) {
        let mut poll = tokio::time::interval(self.config.state_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some((generation, message)) = inbound.recv() => self.on_inbound(generation, message),
                _ = poll.tick() => self.reconcile(),
                _ = deadline(self.warning_deadline) => self.expire_warning(),
                _ = deadline(self.resume_at) => self.resume(),
                Some(joined) = self.refreshes.join_next(), if !self.refreshes.is_empty() => {
                    self.on_refreshed(joined)
                }
            }
        }
        debug!(match_id = %self.match_id, "session task exited");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Reconnect => {
                info!(match_id = %self.match_id, "manual reconnect requested");
                self.generation += 1;
                self.clear_error();
                self.manager.disconnect();
                self.resume_at = Some(Instant::now() + self.config.manual_reconnect_delay);
                self.publish();
            }
            Command::ClearCommentary => {
                self.buffer.clear();
                self.publish();
            }
            Command::SetVolume(volume) => self.audio.set_volume(volume),
        }
    }

    fn on_inbound(&mut self, generation: u64, message: Inbound) {
        if generation != self.generation {
            debug!(
                match_id = %self.match_id,
                generation,
                current = self.generation,
                "dropping message from replaced subscription"
            );
            return;
        }
        match message {
            Inbound::Event(event) => self.on_event(event),
            Inbound::Failure { terminal, message } => self.on_failure(terminal, &message),
        }
    }

    fn on_event(&mut self, event: StreamEvent) {
        if event.is_success() {
            self.clear_error();
        }

        match event {
            StreamEvent::Connected(connected) => {
                info!(match_id = %connected.match_id, "connected to match");
            }
            StreamEvent::ScoreUpdate(update) => {
                self.snapshot.last_score = Some(LastScore::Score(update));
                self.refresh();
            }
            StreamEvent::Wicket(wicket) => {
                self.snapshot.last_score = Some(LastScore::Wicket(wicket));
                self.refresh();
            }
            StreamEvent::Commentary(event) => {
                let item = event.commentary;
                match item.narration_url() {
                    Some(url) => {
                        self.audio.enqueue(url);
                    }
                    None => debug!(match_id = %self.match_id, "commentary has no narration"),
                }
                self.buffer.push(item);
            }
            StreamEvent::Error(err) => self.on_server_error(err),
            StreamEvent::Unknown { .. } => {}
        }
        self.publish();
    }

    fn on_server_error(&mut self, err: ServerErrorEvent) {
        match err.severity {
            Severity::Error => {
                warn!(match_id = %self.match_id, message = %err.message, "server error");
                self.snapshot.last_error = Some(err.message);
                self.warning_deadline = None;
            }
            Severity::Warning => {
                warn!(match_id = %self.match_id, message = %err.message, "server warning");
                self.snapshot.last_error = Some(err.message);
                self.warning_deadline = Some(Instant::now() + self.config.warning_clear_delay);
            }
            Severity::Other(severity) => {
                debug!(match_id = %self.match_id, severity = %severity, "ignoring server error with unknown severity");
            }
        }
    }

    fn on_failure(&mut self, terminal: bool, message: &str) {
        let shown = if terminal {
            RECONNECT_EXHAUSTED_MESSAGE
        } else {
            CONNECTION_LOST_MESSAGE
        };
        debug!(match_id = %self.match_id, error = %message, terminal, "stream failure");
        self.snapshot.last_error = Some(shown.to_string());
        self.warning_deadline = None;
        self.publish();
    }

    fn clear_error(&mut self) {
        self.snapshot.last_error = None;
        self.warning_deadline = None;
    }

    fn expire_warning(&mut self) {
        self.warning_deadline = None;
        self.snapshot.last_error = None;
        self.publish();
    }

    fn resume(&mut self) {
        self.resume_at = None;
        if let Err(e) = subscribe(&mut self.manager, &self.match_id, self.generation, &self.inbound_tx) {
            warn!(match_id = %self.match_id, error = %e, "manual reconnect failed");
            self.snapshot.last_error = Some(e.to_string());
        }
        self.publish();
    }

    fn refresh(&mut self) {
        let Some(refresher) = self.refresher.clone() else {
            return;
        };
        let match_id = self.match_id.clone();
        self.refresh_seq += 1;
        let seq = self.refresh_seq;
        self.refreshes
            .spawn(async move { (seq, refresher.refresh(&match_id).await) });
    }

    /// Apply a refresh result unless a newer one was already applied
    fn on_refreshed(&mut self, joined: std::result::Result<(u64, Result<Value>), JoinError>) {
        match joined {
            Ok((seq, Ok(_))) if seq < self.applied_refresh => {
                debug!(match_id = %self.match_id, seq, applied = self.applied_refresh, "discarding outdated match refresh");
            }
            Ok((seq, Ok(details))) => {
                self.applied_refresh = seq;
                self.snapshot.match_details = Some(details);
                self.publish();
            }
            Ok((_, Err(e))) => warn!(match_id = %self.match_id, error = %e, "match refresh failed"),
            Err(e) => warn!(match_id = %self.match_id, error = %e, "match refresh task failed"),
        }
    }

    /// Publish only if the manager's view moved since the last snapshot
    fn reconcile(&mut self) {
        let state = self.manager.state();
        let reconnect = self.manager.reconnect_status();
        if state != self.snapshot.connection_state
            || state.is_open() != self.snapshot.connected
            || reconnect != self.snapshot.reconnect
        {
            debug!(match_id = %self.match_id, state = %state, "connection state changed");
            self.publish();
        }
    }

    fn publish(&mut self) {
        let state = self.manager.state();
        self.snapshot.connection_state = state;
        self.snapshot.connected = state.is_open();
        self.snapshot.reconnect = self.manager.reconnect_status();
        self.snapshot.commentary = self.buffer.to_vec();
        self.snapshot.latest = self.buffer.latest().cloned();
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}
