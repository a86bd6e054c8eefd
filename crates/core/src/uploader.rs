//! Uploader contract. The transport lives behind [`Uploader`]; this crate
//! ships a local dry-run implementation and an event-log replayer.

pub mod dry_run;
pub mod replay;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::UploadError;
use crate::event::UploadEvent;
use crate::meta::{VideoMeta, VideoPage};

/// Receives lifecycle events from an uploader, in order, on one thread.
pub trait EventSink {
    fn emit(&mut self, event: UploadEvent);
}

impl EventSink for Vec<UploadEvent> {
    fn emit(&mut self, event: UploadEvent) {
        self.push(event);
    }
}

/// Everything an uploader needs to publish one video.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub credential: Credential,
    pub pages: Vec<VideoPage>,
    pub meta: VideoMeta,
    pub cover: Option<PathBuf>,
}

impl UploadRequest {
    pub fn total_bytes(&self) -> u64 {
        self.pages.iter().map(|p| p.size_bytes).sum()
    }
}

/// Identifiers assigned by the platform on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub aid: u64,
    pub bvid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<u64>,
}

/// An upload backend. `start` drives the whole upload, emitting events into
/// `events` as it goes, and resolves once the platform has accepted or
/// rejected the video.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    fn name(&self) -> &str;

    async fn start(
        &mut self,
        request: &UploadRequest,
        events: &mut dyn EventSink,
    ) -> Result<UploadResult, UploadError>;
}
