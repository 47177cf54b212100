use serde::{Deserialize, Serialize};

use super::commentary::CommentaryItem;
use super::enums::Severity;
use super::primitives::MatchId;
use super::serde_helpers::{f64_lenient, u32_lenient};

/// One decoded stream event.
///
/// Decoded by [`EventCodec`](crate::stream::EventCodec) from the `type`
/// discriminant. Unrecognised discriminants are preserved as
/// [`StreamEvent::Unknown`] rather than treated as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected(ConnectedEvent),
    ScoreUpdate(ScoreUpdateEvent),
    Wicket(WicketEvent),
    Commentary(CommentaryEvent),
    Error(ServerErrorEvent),
    Unknown {
        event_type: String,
        payload: serde_json::Value,
    },
}

impl StreamEvent {
    pub const CONNECTED: &'static str = "connected";
    pub const SCORE_UPDATE: &'static str = "score_update";
    pub const WICKET: &'static str = "wicket";
    pub const COMMENTARY: &'static str = "commentary";
    pub const ERROR: &'static str = "error";

    /// Wire discriminant of this event
    pub fn type_name(&self) -> &str {
        match self {
            StreamEvent::Connected(_) => Self::CONNECTED,
            StreamEvent::ScoreUpdate(_) => Self::SCORE_UPDATE,
            StreamEvent::Wicket(_) => Self::WICKET,
            StreamEvent::Commentary(_) => Self::COMMENTARY,
            StreamEvent::Error(_) => Self::ERROR,
            StreamEvent::Unknown { event_type, .. } => event_type,
        }
    }

    /// Whether this event confirms the stream is healthy
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StreamEvent::Connected(_)
                | StreamEvent::ScoreUpdate(_)
                | StreamEvent::Wicket(_)
                | StreamEvent::Commentary(_)
        )
    }
}

/// `connected`: the server accepted the subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedEvent {
    pub match_id: MatchId,
}

/// Innings score carried by `score_update` and `wicket`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    #[serde(default, deserialize_with = "u32_lenient")]
    pub runs: u32,
    #[serde(default, deserialize_with = "u32_lenient")]
    pub wickets: u32,
    #[serde(default, deserialize_with = "f64_lenient")]
    pub overs: f64,
    #[serde(default, deserialize_with = "f64_lenient")]
    pub run_rate: f64,
    #[serde(default, deserialize_with = "u32_lenient")]
    pub fours: u32,
    #[serde(default, deserialize_with = "u32_lenient")]
    pub sixes: u32,
}

/// `score_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateEvent {
    pub score: Score,
}

/// How a batter got out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dismissal {
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub dismissal_type: Option<String>,
    #[serde(default, alias = "batsman", skip_serializing_if = "Option::is_none")]
    pub batter_name: Option<String>,
    #[serde(default, alias = "bowler", skip_serializing_if = "Option::is_none")]
    pub bowler_name: Option<String>,
    #[serde(default, alias = "fielder", skip_serializing_if = "Option::is_none")]
    pub fielder_name: Option<String>,
}

/// `wicket`: score fields plus dismissal details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WicketEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissal: Option<Dismissal>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `commentary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryEvent {
    pub commentary: CommentaryItem,
}

/// `error`: a server-side problem reported in-band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerErrorEvent {
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Most recent score-bearing event, kept apart from the commentary log
#[derive(Debug, Clone, PartialEq)]
pub enum LastScore {
    Score(ScoreUpdateEvent),
    Wicket(WicketEvent),
}

impl LastScore {
    /// Score carried by the event, if the server included one
    pub fn score(&self) -> Option<&Score> {
        match self {
            LastScore::Score(update) => Some(&update.score),
            LastScore::Wicket(wicket) => wicket.score.as_ref(),
        }
    }
}
