//! Video metadata and pages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ConfigurationError, ResourceNotFoundError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Copyright {
    #[default]
    Original,
    Reprint,
}

impl Copyright {
    /// Platform code: 1 original, 2 reprint.
    pub fn code(self) -> u8 {
        match self {
            Copyright::Original => 1,
            Copyright::Reprint => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "original" | "1" => Some(Copyright::Original),
            "reprint" | "2" => Some(Copyright::Reprint),
            _ => None,
        }
    }
}

/// Submission metadata for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub title: String,
    pub desc: String,
    /// Category (zone) id.
    pub tid: u32,
    pub tags: Vec<String>,
    pub copyright: Copyright,
    /// Original source, required for reprints.
    pub source: String,
    pub no_reprint: bool,
    pub open_elec: bool,
    /// Text posted to followers' feeds.
    pub dynamic: String,
}

impl VideoMeta {
    pub fn new(title: impl Into<String>, desc: impl Into<String>, tid: u32) -> Self {
        Self {
            title: title.into(),
            desc: desc.into(),
            tid,
            tags: Vec::new(),
            copyright: Copyright::Original,
            source: String::new(),
            no_reprint: true,
            open_elec: true,
            dynamic: String::new(),
        }
    }

    /// Add a tag unless it is blank or already present.
    pub fn push_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for t in tags {
            self.push_tag(t.as_ref());
        }
        self
    }

    pub fn tag_string(&self) -> String {
        self.tags.join(",")
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.title.trim().is_empty() {
            return Err(ConfigurationError::InvalidMeta("title is empty".to_string()));
        }
        if self.copyright == Copyright::Reprint && self.source.trim().is_empty() {
            return Err(ConfigurationError::InvalidMeta(
                "a reprint needs a source".to_string(),
            ));
        }
        Ok(())
    }

    /// Meta mapping in the platform's shape.
    pub fn to_payload(&self) -> Value {
        json!({
            "title": self.title,
            "desc": self.desc,
            "tid": self.tid,
            "tag": self.tag_string(),
            "copyright": self.copyright.code(),
            "source": self.source,
            "no_reprint": u8::from(self.no_reprint),
            "open_elec": u8::from(self.open_elec),
            "dynamic": self.dynamic,
        })
    }
}

/// Split a comma-separated tag list.
pub fn split_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// One part of a (possibly multi-part) video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPage {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub size_bytes: u64,
}

impl VideoPage {
    pub fn prepare(path: &Path, title: &str, description: &str) -> Result<Self, ResourceNotFoundError> {
        let meta = std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .ok_or_else(|| ResourceNotFoundError::Video(path.to_path_buf()))?;
        let size_bytes = meta.len();
        tracing::info!(
            "preparing video file {}, {} bytes ({:.2} MB)",
            path.display(),
            size_bytes,
            size_bytes as f64 / 1024.0 / 1024.0
        );
        Ok(Self {
            path: path.to_path_buf(),
            title: title.to_string(),
            description: description.to_string(),
            size_bytes,
        })
    }
}
