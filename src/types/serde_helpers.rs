//! Lenient deserializers for fields the server formats inconsistently.
//!
//! Score counters and rates arrive either as JSON numbers or as numeric
//! strings (`"7.50"`), and over numbers may be either as well. Timestamps
//! come as RFC 3339 strings, epoch milliseconds or looser date strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

/// Deserialize an `f64` from a number, a numeric string, or null (as 0.0).
pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(NumberOrString::Number(n)) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("number out of range")),
        Some(NumberOrString::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid number: {}", s)))
        }
    }
}

/// Deserialize a `u32` counter from a number, a numeric string, or null (as 0).
pub fn u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NumberOrString::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid counter: {}", n))),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| de::Error::custom(format!("invalid counter: {}", s))),
    }
}

/// Deserialize an optional display string from a string or a number.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<NumberOrString>::deserialize(deserializer)?.map(|v| match v {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s,
        }),
    )
}

/// Deserialize an optional display timestamp.
///
/// Accepts RFC 3339, epoch milliseconds (number or numeric string) and the
/// common `YYYY-MM-DD[ HH:MM:SS[.f]]` forms, read as UTC. Anything else,
/// including out-of-range values, becomes `None` instead of an error.
pub fn opt_timestamp_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().and_then(from_epoch_millis),
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis.trunc() as i64).single()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    raw.parse::<f64>().ok().and_then(from_epoch_millis)
}
