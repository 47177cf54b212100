use thiserror::Error;

/// Result type for matchfeed-rs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for matchfeed-rs
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be parsed or joined
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// API error response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A stream payload could not be decoded into an event
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Stream transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stream closed by the server
    #[error("Stream connection closed")]
    ConnectionClosed,

    /// Automatic reconnection gave up
    #[error("Reconnection failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// Narration clip failed to play
    #[error("Playback error: {0}")]
    Playback(String),
}

impl Error {
    /// Whether this error should drive the reconnect state machine.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ConnectionClosed | Error::Http(_) | Error::Api { .. }
        )
    }

    /// Whether this error requires an explicit manual reconnect.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::ReconnectExhausted { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
