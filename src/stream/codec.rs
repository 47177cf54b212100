use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::StreamEvent;

/// Decoder for the tagged stream protocol.
///
/// Every payload is a JSON object whose `type` field selects the event shape.
/// A payload either decodes into exactly one [`StreamEvent`] or fails with
/// [`Error::MalformedPayload`]; nothing is ever guessed from a broken payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec;

impl EventCodec {
    /// Decode one raw payload into a typed event
    pub fn decode(payload: &str) -> Result<StreamEvent> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| Error::MalformedPayload(format!("invalid JSON: {}", e)))?;
        Self::decode_value(value)
    }

    /// Decode one transport frame.
    ///
    /// Returns `Ok(None)` for frames that carry no event: blank payloads,
    /// text keep-alives (`ping`/`pong`) and empty arrays. Some servers wrap
    /// events in an array; the first element is taken.
    pub fn decode_frame(payload: &str) -> Result<Option<StreamEvent>> {
        let trimmed = payload.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("ping")
            || trimmed.eq_ignore_ascii_case("pong")
        {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| Error::MalformedPayload(format!("invalid JSON: {}", e)))?;

        match value {
            Value::Array(mut events) => {
                if events.is_empty() {
                    Ok(None)
                } else {
                    Self::decode_value(events.swap_remove(0)).map(Some)
                }
            }
            other => Self::decode_value(other).map(Some),
        }
    }

    fn decode_value(value: Value) -> Result<StreamEvent> {
        let Value::Object(mut fields) = value else {
            return Err(Error::MalformedPayload(
                "payload is not a JSON object".to_string(),
            ));
        };

        let event_type = match fields.remove("type") {
            Some(Value::String(t)) => t,
            Some(_) => {
                return Err(Error::MalformedPayload(
                    "`type` is not a string".to_string(),
                ))
            }
            None => return Err(Error::MalformedPayload("missing `type`".to_string())),
        };

        let body = Value::Object(fields);
        let event = match event_type.as_str() {
            StreamEvent::CONNECTED => StreamEvent::Connected(shape(&event_type, body)?),
            StreamEvent::SCORE_UPDATE => StreamEvent::ScoreUpdate(shape(&event_type, body)?),
            StreamEvent::WICKET => StreamEvent::Wicket(shape(&event_type, body)?),
            StreamEvent::COMMENTARY => StreamEvent::Commentary(shape(&event_type, body)?),
            StreamEvent::ERROR => StreamEvent::Error(shape(&event_type, body)?),
            _ => StreamEvent::Unknown {
                event_type,
                payload: body,
            },
        };
        Ok(event)
    }
}

fn shape<T: DeserializeOwned>(event_type: &str, body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| Error::MalformedPayload(format!("bad `{}` event: {}", event_type, e)))
}

/// First 200 characters of a payload, for log lines
pub(crate) fn preview(payload: &str) -> String {
    payload.chars().take(200).collect()
}
