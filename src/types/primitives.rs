use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a live match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a commentary item, unique within a match.
///
/// Servers send either numeric or string ids. Any JSON number is accepted:
/// integral values become `Number`, anything else keeps its JSON text.
/// Items that arrive without one are assigned a local `Text("local-{n}")` id
/// by the [`CommentaryBuffer`](crate::commentary::CommentaryBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum CommentaryId {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for CommentaryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Ok(CommentaryId::Text(s)),
            Raw::Number(n) => {
                if let Some(v) = n.as_i64() {
                    return Ok(CommentaryId::Number(v));
                }
                let integral = n
                    .as_f64()
                    .filter(|v| v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64);
                Ok(match integral {
                    Some(v) => CommentaryId::Number(v as i64),
                    None => CommentaryId::Text(n.to_string()),
                })
            }
        }
    }
}

impl CommentaryId {
    pub(crate) fn local(ordinal: u64) -> Self {
        CommentaryId::Text(format!("local-{}", ordinal))
    }
}

impl fmt::Display for CommentaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentaryId::Number(n) => write!(f, "{}", n),
            CommentaryId::Text(s) => f.write_str(s),
        }
    }
}
