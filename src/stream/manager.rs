use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::codec::{preview, EventCodec};
use super::machine::{Directive, ReconnectMachine, ReconnectPolicy, ReconnectStatus, Signal};
use super::transport::{PayloadStream, Transport};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::types::{ConnectionState, MatchId, StreamEvent};

/// Callback receiving every decoded event
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Callback receiving transport failures and the terminal
/// [`Error::ReconnectExhausted`]
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Identifies a listener registered with
/// [`ConnectionManager::add_event_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Handle to the live subscription of a [`ConnectionManager`].
///
/// Connecting again to the same match returns an equal handle; a new
/// generation means a new transport was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    match_id: MatchId,
    url: Url,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

type ListenerMap = HashMap<String, Vec<(ListenerId, EventCallback)>>;

struct ActiveSubscription {
    handle: SubscriptionHandle,
    machine: Arc<Mutex<ReconnectMachine>>,
    on_event: EventCallback,
    on_error: ErrorCallback,
    task: JoinHandle<()>,
}

/// Owns at most one live subscription to one match.
///
/// The subscription runs on a spawned driver task that opens the transport,
/// decodes payloads, dispatches events and carries out the reconnect state
/// machine. All methods must be called from within a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use matchfeed_rs::stream::{transport_for, ConnectionManager};
/// use matchfeed_rs::StreamConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = StreamConfig::from_env()?;
///     let mut manager = ConnectionManager::new(config.clone(), transport_for(&config));
///
///     manager.connect(
///         "M1",
///         |event| println!("{}: {:?}", event.type_name(), event),
///         |err| eprintln!("stream error: {}", err),
///     )?;
///
///     tokio::signal::ctrl_c().await?;
///     manager.disconnect();
///     Ok(())
/// }
/// ```
pub struct ConnectionManager {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    listeners: Arc<Mutex<ListenerMap>>,
    next_listener: AtomicU64,
    next_generation: u64,
    active: Option<ActiveSubscription>,
}

impl ConnectionManager {
    pub fn new(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
            next_generation: 0,
            active: None,
        }
    }

    fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.config.max_reconnect_attempts,
            self.config.reconnect_base_delay,
        )
    }

    /// Subscribe to the event stream of `match_id`.
    ///
    /// If this manager is already subscribed to `match_id` the existing
    /// handle is returned and no transport is opened; the new callbacks are
    /// ignored. A subscription to a different match is torn down first.
    pub fn connect<E, R>(
        &mut self,
        match_id: impl Into<MatchId>,
        on_event: E,
        on_error: R,
    ) -> Result<SubscriptionHandle>
    where
        E: Fn(&StreamEvent) + Send + Sync + 'static,
        R: Fn(&Error) + Send + Sync + 'static,
    {
        let match_id = match_id.into();

        if let Some(active) = &self.active {
            if active.handle.match_id == match_id {
                debug!(match_id = %match_id, "already subscribed, skipping duplicate connection");
                return Ok(active.handle.clone());
            }
            info!(
                from = %active.handle.match_id,
                to = %match_id,
                "switching matches, closing existing subscription"
            );
            self.disconnect();
        }

        self.start(match_id, Arc::new(on_event), Arc::new(on_error), Signal::Connect)
    }

    /// Tear down the current subscription and open a fresh one for the same
    /// match, with the reconnect counters reset. Works in every state,
    /// including after automatic retries were exhausted.
    pub fn reconnect(&mut self) -> Result<SubscriptionHandle> {
        let Some(active) = self.active.take() else {
            return Err(Error::InvalidParameter(
                "no subscription to reconnect".to_string(),
            ));
        };
        info!(match_id = %active.handle.match_id, "manual reconnect requested");
        active.machine.lock().handle(Signal::Disconnect);
        active.task.abort();

        self.start(
            active.handle.match_id,
            active.on_event,
            active.on_error,
            Signal::ManualReconnect,
        )
    }

    /// Intentionally close the subscription.
    ///
    /// Cancels any pending reconnect timer, releases the transport, clears
    /// the reconnect counters and every registered listener. Safe to call
    /// in any state.
    pub fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            info!(match_id = %active.handle.match_id, "disconnecting stream");
            active.machine.lock().handle(Signal::Disconnect);
            active.task.abort();
        }
        self.listeners.lock().clear();
    }

    fn start(
        &mut self,
        match_id: MatchId,
        on_event: EventCallback,
        on_error: ErrorCallback,
        signal: Signal,
    ) -> Result<SubscriptionHandle> {
        let url = self.config.stream_url(&match_id)?;

        let mut machine = ReconnectMachine::new(self.policy());
        let directive = machine.handle(signal);
        let machine = Arc::new(Mutex::new(machine));

        self.next_generation += 1;
        let handle = SubscriptionHandle {
            match_id: match_id.clone(),
            url: url.clone(),
            generation: self.next_generation,
        };

        info!(match_id = %match_id, url = %url, "connecting to stream");

        let driver = Driver {
            match_id,
            url,
            transport: Arc::clone(&self.transport),
            machine: Arc::clone(&machine),
            listeners: Arc::clone(&self.listeners),
            on_event: Arc::clone(&on_event),
            on_error: Arc::clone(&on_error),
        };
        let task = tokio::spawn(driver.run(directive));

        self.active = Some(ActiveSubscription {
            handle: handle.clone(),
            machine,
            on_event,
            on_error,
            task,
        });
        Ok(handle)
    }

    /// Register a callback for one event type (the wire `type`, e.g.
    /// `"commentary"`). Registrations are cleared by [`disconnect`](Self::disconnect).
    pub fn add_event_listener<F>(&self, event_type: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event_type.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let mut removed = false;
        for callbacks in listeners.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(listener, _)| *listener != id);
            removed |= callbacks.len() != before;
        }
        listeners.retain(|_, callbacks| !callbacks.is_empty());
        removed
    }

    pub fn state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|active| active.machine.lock().state())
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn current_match_id(&self) -> Option<&MatchId> {
        self.active.as_ref().map(|active| &active.handle.match_id)
    }

    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    pub fn reconnect_status(&self) -> ReconnectStatus {
        match &self.active {
            Some(active) => active.machine.lock().status(),
            None => ReconnectStatus {
                max_attempts: self.config.max_reconnect_attempts,
                ..ReconnectStatus::default()
            },
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.machine.lock().handle(Signal::Disconnect);
            active.task.abort();
        }
    }
}

/// State moved into the subscription driver task
struct Driver {
    match_id: MatchId,
    url: Url,
    transport: Arc<dyn Transport>,
    machine: Arc<Mutex<ReconnectMachine>>,
    listeners: Arc<Mutex<ListenerMap>>,
    on_event: EventCallback,
    on_error: ErrorCallback,
}

impl Driver {
    async fn run(self, mut directive: Directive) {
        let mut last_error = String::from("no connection attempt completed");

        loop {
            match directive {
                Directive::Open => {
                    let failure = match self.transport.open(&self.url).await {
                        Ok(stream) => {
                            self.signal(Signal::Opened);
                            info!(match_id = %self.match_id, "stream connection opened");
                            self.pump(stream).await
                        }
                        Err(e) => e,
                    };
                    if self.is_stopped() {
                        debug!(match_id = %self.match_id, "intentional disconnect, not reconnecting");
                        return;
                    }
                    warn!(match_id = %self.match_id, error = %failure, "stream connection error");
                    last_error = failure.to_string();
                    directive = self.signal(Signal::TransportError);
                    self.notify_error(&failure);
                }
                Directive::Wait(delay) => {
                    let status = self.machine.lock().status();
                    info!(
                        match_id = %self.match_id,
                        attempt = status.attempts,
                        max_attempts = status.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    tokio::time::sleep(delay).await;
                    directive = self.signal(Signal::RetryElapsed);
                }
                Directive::Exhausted { attempts } => {
                    error!(match_id = %self.match_id, attempts, "max reconnect attempts reached");
                    self.notify_error(&Error::ReconnectExhausted {
                        attempts,
                        last_error,
                    });
                    return;
                }
                Directive::Halt | Directive::None => return,
            }
        }
    }

    fn signal(&self, signal: Signal) -> Directive {
        self.machine.lock().handle(signal)
    }

    fn is_stopped(&self) -> bool {
        self.machine.lock().state() == ConnectionState::Closed
    }

    /// Forward payloads until the transport fails; returns the failure
    async fn pump(&self, mut stream: PayloadStream) -> Error {
        while let Some(item) = stream.next().await {
            match item {
                Ok(payload) => self.on_payload(&payload),
                Err(e) => return e,
            }
            if self.is_stopped() {
                return Error::ConnectionClosed;
            }
        }
        Error::ConnectionClosed
    }

    fn on_payload(&self, payload: &str) {
        match EventCodec::decode_frame(payload) {
            Ok(Some(event)) => self.dispatch(&event),
            Ok(None) => {}
            Err(e) => warn!(
                match_id = %self.match_id,
                error = %e,
                payload = %preview(payload),
                "dropping malformed stream payload"
            ),
        }
    }

    fn dispatch(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Connected(connected) => {
                self.signal(Signal::Opened);
                debug!(match_id = %connected.match_id, "server confirmed subscription");
            }
            StreamEvent::Unknown { event_type, .. } => {
                debug!(match_id = %self.match_id, event_type = %event_type, "unknown event type");
            }
            _ => debug!(match_id = %self.match_id, event_type = event.type_name(), "event received"),
        }

        isolate("on_event", || (self.on_event)(event));

        let callbacks: Vec<EventCallback> = self
            .listeners
            .lock()
            .get(event.type_name())
            .map(|registered| registered.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in callbacks {
            isolate(event.type_name(), || callback(event));
        }
    }

    fn notify_error(&self, err: &Error) {
        isolate("on_error", || (self.on_error)(err));
    }
}

/// Run a consumer callback, containing any panic it raises
fn isolate<F: FnOnce()>(name: &str, callback: F) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(callback = name, "stream callback panicked");
    }
}
