use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::types::{CommentaryItem, EventType, MatchId};

/// Fetches fresh match details after a score-bearing event
#[async_trait]
pub trait MatchRefresher: Send + Sync {
    async fn refresh(&self, match_id: &MatchId) -> Result<Value>;
}

/// Client for the match and commentary REST endpoints
///
/// Only the read endpoints the stream client depends on are covered; match
/// scoring and commentary generation stay on the server side.
#[derive(Debug, Clone)]
pub struct MatchClient {
    http: reqwest::Client,
    base: Url,
}

impl MatchClient {
    /// Create a new MatchClient
    ///
    /// # Arguments
    /// * `api_base_url` - The API base (e.g., "http://localhost:5000/api")
    pub fn new(api_base_url: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), api_base_url)
    }

    /// Create a MatchClient sharing an existing reqwest client
    pub fn with_client(http: reqwest::Client, api_base_url: &str) -> Result<Self> {
        let mut base = Url::parse(api_base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    /// Create a MatchClient for the API base of a stream configuration
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::new(&config.api_base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// List all matches
    pub async fn get_matches(&self) -> Result<Value> {
        let url = self.endpoint(&["matches"])?;
        self.get(url).await
    }

    /// Get a single match.
    ///
    /// Servers wrap the match as `{"match": {...}}`; the inner object is
    /// returned when present, the whole body otherwise.
    pub async fn get_match(&self, match_id: &MatchId) -> Result<Value> {
        let url = self.endpoint(&["matches", match_id.as_str()])?;
        let body: Value = self.get(url).await?;
        Ok(match body {
            Value::Object(mut map) if map.contains_key("match") => {
                map.remove("match").unwrap_or_default()
            }
            other => other,
        })
    }

    /// Get recent commentary for a match, newest first
    ///
    /// # Arguments
    /// * `match_id` - The match to query
    /// * `limit` - Maximum number of items (the server defaults to 20)
    /// * `event_type` - Optional filter on the commentary event type
    pub async fn get_match_commentary(
        &self,
        match_id: &MatchId,
        limit: u32,
        event_type: Option<EventType>,
    ) -> Result<Vec<CommentaryItem>> {
        let mut url = self.endpoint(&["commentary", "match", match_id.as_str()])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(event_type) = &event_type {
                query.append_pair("eventType", event_type.as_str());
            }
        }
        let body: Value = self.get(url).await?;
        commentary_from_body(body)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidParameter("empty path segment".to_string()));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = api_message(&text).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_string()
            });
            warn!(url = %url, status = status.as_u16(), message = %message, "API request failed");
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MatchRefresher for MatchClient {
    async fn refresh(&self, match_id: &MatchId) -> Result<Value> {
        self.get_match(match_id).await
    }
}

/// Pull `message` out of a JSON error body, falling back to the raw text
fn api_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}

/// Accepts a bare array or an object wrapping it under `commentary` or `data`
fn commentary_from_body(body: Value) -> Result<Vec<CommentaryItem>> {
    let list = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("commentary")
            .or_else(|| map.remove("data"))
            .ok_or_else(|| Error::MalformedPayload("no commentary list in response".to_string()))?,
        other => {
            return Err(Error::MalformedPayload(format!(
                "unexpected commentary response: {}",
                other
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}
