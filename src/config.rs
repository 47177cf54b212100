//! Client configuration.
//!
//! Every knob has a documented fallback; [`StreamConfig::from_env`] reads the
//! `MATCHFEED_*` environment variables on top of those fallbacks.

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::types::MatchId;

/// Which push transport carries the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Server-sent events over HTTP
    #[default]
    Sse,
    /// WebSocket, text frames only
    WebSocket,
}

impl std::str::FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sse" | "eventsource" => Ok(TransportKind::Sse),
            "ws" | "wss" | "websocket" => Ok(TransportKind::WebSocket),
            other => Err(Error::Config(format!("unknown transport: {}", other))),
        }
    }
}

/// Configuration for a commentary stream client
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// REST API base, e.g. `http://localhost:5000/api`
    pub api_base_url: String,
    /// Base for relative narration clip URLs. Falls back to the API base with
    /// a trailing `/api` segment removed.
    pub media_base_url: Option<String>,
    /// Push transport used for the event stream
    pub transport: TransportKind,
    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Linear backoff unit: attempt `n` waits `n * reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    /// Maximum number of commentary items kept
    pub buffer_size: usize,
    /// How long a `warning` severity error stays visible
    pub warning_clear_delay: Duration,
    /// Interval of the connection state reconciliation poll
    pub state_poll_interval: Duration,
    /// Pause between teardown and reconnect on a manual reconnect
    pub manual_reconnect_delay: Duration,
}

impl StreamConfig {
    pub const DEFAULT_API_URL: &'static str = "http://localhost:5000/api";
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
    pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(2000);
    pub const DEFAULT_BUFFER_SIZE: usize = 50;
    pub const DEFAULT_WARNING_CLEAR_DELAY: Duration = Duration::from_secs(5);
    pub const DEFAULT_STATE_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MANUAL_RECONNECT_DELAY: Duration = Duration::from_millis(500);

    /// Create a configuration for the given API base with default tuning
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            media_base_url: None,
            transport: TransportKind::default(),
            max_reconnect_attempts: Self::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: Self::DEFAULT_RECONNECT_BASE_DELAY,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            warning_clear_delay: Self::DEFAULT_WARNING_CLEAR_DELAY,
            state_poll_interval: Self::DEFAULT_STATE_POLL_INTERVAL,
            manual_reconnect_delay: Self::DEFAULT_MANUAL_RECONNECT_DELAY,
        }
    }

    /// Build a configuration from `MATCHFEED_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `MATCHFEED_API_URL` | `api_base_url` |
    /// | `MATCHFEED_MEDIA_URL` | `media_base_url` |
    /// | `MATCHFEED_TRANSPORT` | `transport` (`sse` or `ws`) |
    /// | `MATCHFEED_MAX_RECONNECT_ATTEMPTS` | `max_reconnect_attempts` |
    /// | `MATCHFEED_RECONNECT_DELAY_MS` | `reconnect_base_delay` |
    /// | `MATCHFEED_BUFFER_SIZE` | `buffer_size` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = lookup("MATCHFEED_API_URL").unwrap_or_else(|| Self::DEFAULT_API_URL.to_string());
        let mut config = Self::new(api);

        if let Some(media) = lookup("MATCHFEED_MEDIA_URL") {
            config.media_base_url = Some(media);
        }
        if let Some(transport) = lookup("MATCHFEED_TRANSPORT") {
            config.transport = transport.parse()?;
        }
        if let Some(raw) = lookup("MATCHFEED_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = parse_number("MATCHFEED_MAX_RECONNECT_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("MATCHFEED_RECONNECT_DELAY_MS") {
            let ms: u64 = parse_number("MATCHFEED_RECONNECT_DELAY_MS", &raw)?;
            config.reconnect_base_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("MATCHFEED_BUFFER_SIZE") {
            config.buffer_size = parse_number("MATCHFEED_BUFFER_SIZE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_media_base_url(mut self, url: impl Into<String>) -> Self {
        self.media_base_url = Some(url.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_warning_clear_delay(mut self, delay: Duration) -> Self {
        self.warning_clear_delay = delay;
        self
    }

    pub fn with_state_poll_interval(mut self, interval: Duration) -> Self {
        self.state_poll_interval = interval;
        self
    }

    pub fn with_manual_reconnect_delay(mut self, delay: Duration) -> Self {
        self.manual_reconnect_delay = delay;
        self
    }

    /// Check the configuration for values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be at least 1".to_string()));
        }
        if self.state_poll_interval.is_zero() {
            return Err(Error::Config(
                "state_poll_interval must be non-zero".to_string(),
            ));
        }
        self.api_base()?;
        self.media_base()?;
        Ok(())
    }

    /// Parsed API base, always ending in `/` so joins append rather than replace
    pub fn api_base(&self) -> Result<Url> {
        parse_base(&self.api_base_url)
    }

    /// Parsed base for relative narration clip URLs
    pub fn media_base(&self) -> Result<Url> {
        match &self.media_base_url {
            Some(media) => parse_base(media),
            None => {
                let api = self.api_base_url.trim_end_matches('/');
                let server = api.strip_suffix("/api").unwrap_or(api);
                parse_base(server)
            }
        }
    }

    /// Stream endpoint for a match: `{api}/commentary/stream/{matchId}`.
    ///
    /// For [`TransportKind::WebSocket`] the scheme is switched to `ws`/`wss`.
    pub fn stream_url(&self, match_id: &MatchId) -> Result<Url> {
        if match_id.as_str().is_empty() {
            return Err(Error::InvalidParameter("match id is empty".to_string()));
        }
        let mut url = self.api_base()?;
        url.path_segments_mut()
            .map_err(|_| Error::Config("API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["commentary", "stream", match_id.as_str()]);

        if self.transport == TransportKind::WebSocket {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            url.set_scheme(scheme)
                .map_err(|_| Error::Config(format!("cannot switch {} to {}", url, scheme)))?;
        }
        Ok(url)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_API_URL)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw)))
}
