//! Replays a recorded event log through the regular event boundary.
//!
//! The log is JSON lines. Event lines carry the uploader's event name and
//! its raw payload; a result line supplies the identifiers returned on
//! success:
//!
//! ```text
//! {"event": "PREUPLOAD"}
//! {"event": "AFTER_CHUNK", "data": {"percentage": 12.5}}
//! {"event": "COMPLETED"}
//! {"result": {"aid": 1, "bvid": "BV1xx411c7mD", "cid": 2}}
//! ```
//!
//! A `COMPLETED` event is only replayed when the log also has a result
//! line; otherwise the replay stops there with `MissingResult`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{EventError, UploadError};
use crate::event::{EventKind, UploadEvent};
use crate::uploader::{EventSink, UploadRequest, UploadResult, Uploader};

#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Event(UploadEvent),
    Result(UploadResult),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLine {
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
    Result {
        result: UploadResult,
    },
}

/// Parse a JSON-lines event log. Blank lines are skipped.
pub fn parse_event_log(text: &str) -> Result<Vec<LogEntry>, EventError> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawLine = serde_json::from_str(line).map_err(|e| EventError::Malformed {
            line: index + 1,
            detail: e.to_string(),
        })?;
        entries.push(match raw {
            RawLine::Event { event, data } => {
                let kind: EventKind = event.parse()?;
                LogEntry::Event(UploadEvent::from_payload(kind, &data))
            }
            RawLine::Result { result } => LogEntry::Result(result),
        });
    }
    Ok(entries)
}

pub struct ReplayUploader {
    path: PathBuf,
    pace: Duration,
}

impl ReplayUploader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pace: Duration::ZERO,
        }
    }

    /// Wait between events so time-based cadences can fire.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl Uploader for ReplayUploader {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start(
        &mut self,
        _request: &UploadRequest,
        events: &mut dyn EventSink,
    ) -> Result<UploadResult, UploadError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let entries = parse_event_log(&text)?;
        tracing::debug!(path = %self.path.display(), entries = entries.len(), "replaying event log");

        let has_result = entries.iter().any(|e| matches!(e, LogEntry::Result(_)));
        let mut result = None;
        for entry in entries {
            match entry {
                LogEntry::Event(UploadEvent::Completed) if !has_result => {
                    tracing::warn!(path = %self.path.display(), "event log completes without a result line");
                    return Err(UploadError::MissingResult);
                }
                LogEntry::Event(event) => {
                    let failure = match &event {
                        UploadEvent::Failed { error } => {
                            Some(error.clone().unwrap_or_else(|| "unknown error".to_string()))
                        }
                        _ => None,
                    };
                    events.emit(event);
                    if let Some(message) = failure {
                        return Err(UploadError::Rejected(message));
                    }
                    if !self.pace.is_zero() {
                        tokio::time::sleep(self.pace).await;
                    }
                }
                LogEntry::Result(r) => result = Some(r),
            }
        }
        result.ok_or(UploadError::MissingResult)
    }
}
