use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{EventType, Priority};
use super::primitives::CommentaryId;
use super::serde_helpers::{opt_string_or_number, opt_timestamp_lenient};

/// A narrated description of a ball or match occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryItem {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<CommentaryId>,
    pub text: String,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(
        default,
        deserialize_with = "opt_timestamp_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,
    #[serde(default, rename = "isAIGenerated", skip_serializing_if = "Option::is_none")]
    pub is_ai_generated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<EventData>,
}

impl CommentaryItem {
    /// Create a bare item with the given text and outcome
    pub fn new(text: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: None,
            text: text.into(),
            event_type,
            priority: Priority::default(),
            created_at: None,
            audio_url: None,
            has_audio: None,
            is_ai_generated: None,
            event_data: None,
        }
    }

    /// Whether the text was machine generated. Defaults to `true` when the
    /// server omits the flag.
    pub fn is_ai_generated(&self) -> bool {
        self.is_ai_generated.unwrap_or(true)
    }

    /// Narration clip to queue for this item, if any.
    ///
    /// `hasAudio: false` suppresses a clip even when `audioUrl` is present.
    pub fn narration_url(&self) -> Option<&str> {
        if self.has_audio == Some(false) {
            return None;
        }
        self.audio_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

/// Display-only match context attached to a commentary item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_score: Option<String>,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub over_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bowler_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_item() {
        let json = r#"{
            "id": 1,
            "text": "Four!",
            "eventType": "FOUR",
            "priority": "high",
            "createdAt": "2024-03-10T14:22:05.120Z",
            "audioUrl": "/a.mp3",
            "isAIGenerated": false,
            "eventData": {"teamScore": "120/3", "overNumber": 14.2, "batterName": "Rohit", "ballSpeed": 141}
        }"#;
        let item: CommentaryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, Some(CommentaryId::Number(1)));
        assert_eq!(item.event_type, EventType::Four);
        assert_eq!(item.priority, Priority::High);
        assert!(item.created_at.is_some());
        assert!(!item.is_ai_generated());
        let data = item.event_data.unwrap();
        assert_eq!(data.team_score.as_deref(), Some("120/3"));
        assert_eq!(data.over_number.as_deref(), Some("14.2"));
        assert_eq!(data.extra.get("ballSpeed"), Some(&serde_json::json!(141)));
    }

    #[test]
    fn test_defaults_for_minimal_item() {
        let item: CommentaryItem = serde_json::from_str(r#"{"text":"Dot ball."}"#).unwrap();
        assert!(item.id.is_none());
        assert_eq!(item.event_type, EventType::Other);
        assert_eq!(item.priority, Priority::Unranked);
        assert!(item.is_ai_generated());
        assert!(item.narration_url().is_none());
    }

    #[test]
    fn test_has_audio_false_suppresses_narration() {
        let mut item = CommentaryItem::new("Six!", EventType::Six);
        item.audio_url = Some("/audio/six.mp3".into());
        assert_eq!(item.narration_url(), Some("/audio/six.mp3"));
        item.has_audio = Some(false);
        assert!(item.narration_url().is_none());
    }
}
