//! One upload session: locate the video, assemble the request, run the
//! uploader with a progress reporter attached, and persist the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::cover::find_cover;
use crate::credential::Credential;
use crate::error::{error_chain, BiliError, ResourceNotFoundError};
use crate::meta::{Copyright, VideoMeta, VideoPage};
use crate::progress::{ProgressHandler, ProgressReporter};
use crate::record::ResultRecord;
use crate::template::{render, stem_tag};
use crate::uploader::{UploadRequest, UploadResult, Uploader};
use crate::zones::zone_name;

/// Where a video lives: `<videos_root>/<folder>/<file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLocation {
    pub folder_name: String,
    pub file_name: String,
    pub folder: PathBuf,
    pub video: PathBuf,
}

impl VideoLocation {
    pub fn resolve(videos_root: &Path, folder_name: &str, file_name: &str) -> Self {
        let folder = videos_root.join(folder_name);
        let video = folder.join(file_name);
        Self {
            folder_name: folder_name.to_string(),
            file_name: file_name.to_string(),
            folder,
            video,
        }
    }
}

/// Per-run values that take precedence over `[meta]` config.
#[derive(Debug, Clone, Default)]
pub struct MetaOverrides {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tid: Option<u32>,
    /// Marks the upload as a reprint of this source.
    pub reprint_source: Option<String>,
    pub allow_reprint: bool,
    pub no_elec: bool,
    pub dynamic: Option<String>,
    pub cover: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub result: UploadResult,
    pub record: ResultRecord,
    pub record_path: PathBuf,
    pub elapsed_secs: f64,
}

pub struct UploadSession<'a> {
    config: &'a AppConfig,
    location: VideoLocation,
    overrides: MetaOverrides,
}

impl<'a> UploadSession<'a> {
    pub fn new(config: &'a AppConfig, location: VideoLocation, overrides: MetaOverrides) -> Self {
        Self {
            config,
            location,
            overrides,
        }
    }

    pub fn location(&self) -> &VideoLocation {
        &self.location
    }

    /// Load credentials, check the files, and build the request.
    pub fn prepare(&self) -> Result<UploadRequest, BiliError> {
        let credential = Credential::load_cookie_file(&self.config.paths.cookie_file)?;
        let cover = self.cover();
        credential.ensure_complete()?;

        if !self.location.folder.is_dir() {
            return Err(ResourceNotFoundError::Folder(self.location.folder.clone()).into());
        }
        if !self.location.video.is_file() {
            return Err(ResourceNotFoundError::Video(self.location.video.clone()).into());
        }

        let m = &self.config.meta;
        let video = &self.location.video;
        let folder = &self.location.folder_name;
        let page = VideoPage::prepare(
            video,
            &render(&m.page_title_template, video, folder),
            &render(&m.page_desc_template, video, folder),
        )?;
        let meta = self.build_meta();
        meta.validate()?;

        Ok(UploadRequest {
            credential,
            pages: vec![page],
            meta,
            cover,
        })
    }

    fn cover(&self) -> Option<PathBuf> {
        match &self.overrides.cover {
            Some(p) if p.is_file() => {
                tracing::info!(cover = %p.display(), "using cover file");
                Some(p.clone())
            }
            Some(p) => {
                tracing::warn!(cover = %p.display(), "cover file does not exist, uploading without a cover");
                None
            }
            None => find_cover(&self.location.video),
        }
    }

    pub fn build_meta(&self) -> VideoMeta {
        let m = &self.config.meta;
        let o = &self.overrides;
        let video = &self.location.video;
        let folder = &self.location.folder_name;

        let title = o
            .title
            .clone()
            .unwrap_or_else(|| render(&m.title_template, video, folder));
        let desc = o
            .desc
            .clone()
            .unwrap_or_else(|| render(&m.desc_template, video, folder));
        let tid = o.tid.unwrap_or(m.tid);

        let mut meta = VideoMeta::new(title, desc, tid)
            .with_tags(o.tags.as_ref().unwrap_or(&m.tags))
            .with_tags([stem_tag(video)]);
        meta.copyright = m.copyright;
        meta.source = m.source.clone();
        if let Some(source) = &o.reprint_source {
            meta.copyright = Copyright::Reprint;
            meta.source = source.clone();
        }
        meta.no_reprint = m.no_reprint && !o.allow_reprint;
        meta.open_elec = m.open_elec && !o.no_elec;
        meta.dynamic = o.dynamic.clone().unwrap_or_else(|| m.dynamic.clone());

        match zone_name(tid) {
            Some(zone) => tracing::info!(
                "video meta: title='{}', zone={} ({}), tags='{}'",
                meta.title,
                tid,
                zone,
                meta.tag_string()
            ),
            None => tracing::warn!(tid, "unknown zone id, the platform may reject it"),
        }
        tracing::debug!(payload = %meta.to_payload(), "video meta payload");
        meta
    }

    /// Run the upload. Writes the result record on success; a failed
    /// session writes nothing.
    pub async fn run<U, H, C>(
        &self,
        uploader: &mut U,
        reporter: &mut ProgressReporter<H, C>,
    ) -> Result<SessionOutcome, BiliError>
    where
        U: Uploader,
        H: ProgressHandler,
        C: Clock,
    {
        let request = self.prepare()?;

        let started = reporter.clock().now();
        reporter.on_session_start();
        tracing::info!(uploader = uploader.name(), "starting upload...");

        let result = match uploader.start(&request, reporter).await {
            Ok(result) => result,
            Err(e) => {
                if reporter.is_active() {
                    reporter.on_failed(Some(&e.to_string()));
                }
                tracing::error!("error during upload: {}", e);
                tracing::error!("details:\n{}", error_chain(&e));
                return Err(e.into());
            }
        };
        let elapsed = reporter.clock().now().saturating_duration_since(started);
        tracing::info!("upload finished, total {:.1}s", elapsed.as_secs_f64());

        self.finish(result, request.cover.as_deref(), elapsed)
    }

    fn finish(
        &self,
        result: UploadResult,
        cover: Option<&Path>,
        elapsed: Duration,
    ) -> Result<SessionOutcome, BiliError> {
        tracing::info!("=== upload result ===");
        tracing::info!("AV: {}", result.aid);
        tracing::info!("BV: {}", result.bvid);
        if let Some(cid) = result.cid {
            tracing::info!("CID: {}", cid);
        }

        let record = ResultRecord::new(result.clone(), &self.location.video, cover, elapsed);
        let record_path = ResultRecord::path_for(&self.config.paths.logs_dir, &self.location.file_name);
        record.write_to(&record_path)?;
        tracing::info!(path = %record_path.display(), "wrote result record");

        Ok(SessionOutcome {
            result,
            record,
            record_path,
            elapsed_secs: elapsed.as_secs_f64(),
        })
    }
}
