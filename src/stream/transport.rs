use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::pin::Pin;
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::sse;
use crate::config::{StreamConfig, TransportKind};
use crate::error::{Error, Result};

/// Raw event payloads delivered by an open subscription.
///
/// An `Err` item or the end of the stream means the connection is gone.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A server-to-client push channel.
///
/// `open` resolves once the server has accepted the subscription; that is
/// the "transport open" signal for the reconnect state machine.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<PayloadStream>;
}

/// Build the transport selected by the configuration
pub fn transport_for(config: &StreamConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Sse => Arc::new(SseTransport::new()),
        TransportKind::WebSocket => Arc::new(WsTransport::new()),
    }
}

/// Server-sent events over a long-lived HTTP response
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (cookies, proxies, TLS roots)
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, url: &Url) -> Result<PayloadStream> {
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(sse::payload_stream(response.bytes_stream()))
    }
}

/// WebSocket carrying one JSON event per text frame
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url) -> Result<PayloadStream> {
        let (ws_stream, _) = connect_async(url.as_str()).await?;

        // Server push only; the write half is never used
        let (_write, read) = ws_stream.split();

        let stream = read.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(Some(frame))) => Some(Err(Error::Transport(format!(
                    "Connection closed: code={}, reason={}",
                    frame.code, frame.reason
                )))),
                Ok(Message::Close(None)) => Some(Err(Error::ConnectionClosed)),
                // Ping/pong frames are answered by tungstenite
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Ok(Message::Binary(_)) => Some(Err(Error::Transport(
                    "Unexpected binary message".to_string(),
                ))),
                Err(e) => Some(Err(Error::from(e))),
            }
        });

        Ok(Box::pin(stream))
    }
}
