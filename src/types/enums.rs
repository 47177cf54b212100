use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a match subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Errored => "ERRORED",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ball outcome a commentary item describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Six,
    Four,
    Wicket,
    DotBall,
    Wide,
    NoBall,
    #[default]
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Six => "SIX",
            EventType::Four => "FOUR",
            EventType::Wicket => "WICKET",
            EventType::DotBall => "DOT_BALL",
            EventType::Wide => "WIDE",
            EventType::NoBall => "NO_BALL",
            EventType::Other => "OTHER",
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "SIX" => EventType::Six,
            "FOUR" => EventType::Four,
            "WICKET" => EventType::Wicket,
            "DOT_BALL" => EventType::DotBall,
            "WIDE" => EventType::Wide,
            "NO_BALL" => EventType::NoBall,
            _ => EventType::Other,
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// Display priority of a commentary item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    /// Sent as `"none"` or omitted
    #[default]
    Unranked,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Unranked => "none",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            _ => Priority::Unranked,
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.as_str().to_string()
    }
}

/// Severity of a server-sent `error` event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    /// Unrecognised severity, kept verbatim and otherwise ignored
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Other(s) => s,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Other(value),
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.as_str().to_string()
    }
}
