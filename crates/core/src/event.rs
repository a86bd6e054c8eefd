//! Upload lifecycle events and the conversion from the uploader's
//! loosely-typed payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventError;

/// Event names used by the external uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    #[serde(rename = "PREUPLOAD")]
    PreUpload,
    PrePage,
    AfterPage,
    PreChunk,
    AfterChunk,
    Completed,
    Failed,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::PreUpload,
        EventKind::PrePage,
        EventKind::AfterPage,
        EventKind::PreChunk,
        EventKind::AfterChunk,
        EventKind::Completed,
        EventKind::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PreUpload => "PREUPLOAD",
            EventKind::PrePage => "PRE_PAGE",
            EventKind::AfterPage => "AFTER_PAGE",
            EventKind::PreChunk => "PRE_CHUNK",
            EventKind::AfterChunk => "AFTER_CHUNK",
            EventKind::Completed => "COMPLETED",
            EventKind::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// A single lifecycle event emitted by an uploader during one session.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    PreUpload,
    PrePage { page_number: Option<u32> },
    AfterPage { page_number: Option<u32> },
    PreChunk { total_chunks: Option<u64> },
    AfterChunk { percentage: Option<f64> },
    Completed,
    Failed { error: Option<String> },
}

impl UploadEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UploadEvent::PreUpload => EventKind::PreUpload,
            UploadEvent::PrePage { .. } => EventKind::PrePage,
            UploadEvent::AfterPage { .. } => EventKind::AfterPage,
            UploadEvent::PreChunk { .. } => EventKind::PreChunk,
            UploadEvent::AfterChunk { .. } => EventKind::AfterChunk,
            UploadEvent::Completed => EventKind::Completed,
            UploadEvent::Failed { .. } => EventKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Completed | UploadEvent::Failed { .. })
    }

    /// Build a typed event from the uploader's payload mapping. Absent or
    /// mistyped keys become `None`; a non-object payload is treated as empty.
    pub fn from_payload(kind: EventKind, payload: &Value) -> Self {
        match kind {
            EventKind::PreUpload => UploadEvent::PreUpload,
            EventKind::PrePage => UploadEvent::PrePage {
                page_number: page_number(payload),
            },
            EventKind::AfterPage => UploadEvent::AfterPage {
                page_number: page_number(payload),
            },
            EventKind::PreChunk => UploadEvent::PreChunk {
                total_chunks: payload.get("total").and_then(Value::as_u64),
            },
            EventKind::AfterChunk => UploadEvent::AfterChunk {
                percentage: payload.get("percentage").and_then(Value::as_f64),
            },
            EventKind::Completed => UploadEvent::Completed,
            EventKind::Failed => UploadEvent::Failed {
                error: payload.get("error").and_then(|e| match e {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                }),
            },
        }
    }

    /// Payload mapping in the uploader's shape; inverse of `from_payload`.
    pub fn to_payload(&self) -> Value {
        let mut map = serde_json::Map::new();
        match self {
            UploadEvent::PrePage { page_number: Some(n) }
            | UploadEvent::AfterPage { page_number: Some(n) } => {
                map.insert("page_number".into(), (*n).into());
            }
            UploadEvent::PreChunk { total_chunks: Some(t) } => {
                map.insert("total".into(), (*t).into());
            }
            UploadEvent::AfterChunk { percentage: Some(p) } => {
                map.insert("percentage".into(), (*p).into());
            }
            UploadEvent::Failed { error: Some(e) } => {
                map.insert("error".into(), e.clone().into());
            }
            _ => {}
        }
        Value::Object(map)
    }
}

fn page_number(payload: &Value) -> Option<u32> {
    payload
        .get("page_number")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn kind_parses_uploader_names() {
        assert_eq!("PREUPLOAD".parse::<EventKind>().unwrap(), EventKind::PreUpload);
        assert_eq!("after_chunk".parse::<EventKind>().unwrap(), EventKind::AfterChunk);
        assert!(matches!(
            "UPLOADING".parse::<EventKind>(),
            Err(EventError::UnknownKind(_))
        ));
    }

    #[test]
    fn kind_serde_matches_as_str() {
        for kind in EventKind::ALL {
            let s = serde_json::to_string(&kind).unwrap();
            assert_eq!(s, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn empty_payload_yields_none_fields() {
        assert_eq!(
            UploadEvent::from_payload(EventKind::PrePage, &json!({})),
            UploadEvent::PrePage { page_number: None }
        );
        assert_eq!(
            UploadEvent::from_payload(EventKind::Failed, &json!(null)),
            UploadEvent::Failed { error: None }
        );
        assert_eq!(
            UploadEvent::from_payload(EventKind::AfterChunk, &json!({"percentage": "12"})),
            UploadEvent::AfterChunk { percentage: None }
        );
    }

    #[test]
    fn payload_fields_are_extracted() {
        assert_eq!(
            UploadEvent::from_payload(EventKind::AfterChunk, &json!({"percentage": 42.5})),
            UploadEvent::AfterChunk { percentage: Some(42.5) }
        );
        assert_eq!(
            UploadEvent::from_payload(EventKind::PreChunk, &json!({"total": 12})),
            UploadEvent::PreChunk { total_chunks: Some(12) }
        );
        assert_eq!(
            UploadEvent::from_payload(EventKind::Failed, &json!({"error": {"code": 21001}})),
            UploadEvent::Failed { error: Some("{\"code\":21001}".to_string()) }
        );
    }

    #[test]
    fn terminal_events() {
        assert!(UploadEvent::Completed.is_terminal());
        assert!(UploadEvent::Failed { error: None }.is_terminal());
        assert!(!UploadEvent::AfterChunk { percentage: Some(1.0) }.is_terminal());
    }
}
