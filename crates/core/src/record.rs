//! Per-video result record written after a successful upload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::uploader::UploadResult;

#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub uploaded_at: DateTime<Local>,
    #[serde(flatten)]
    pub result: UploadResult,
    pub video_path: PathBuf,
    pub cover_path: Option<PathBuf>,
    pub elapsed_secs: f64,
}

impl ResultRecord {
    pub fn new(
        result: UploadResult,
        video_path: &Path,
        cover_path: Option<&Path>,
        elapsed: Duration,
    ) -> Self {
        Self {
            uploaded_at: Local::now(),
            result,
            video_path: video_path.to_path_buf(),
            cover_path: cover_path.map(Path::to_path_buf),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    /// `<logs_dir>/<video_file>_result.txt`
    pub fn path_for(logs_dir: &Path, video_file: &str) -> PathBuf {
        logs_dir.join(format!("{}_result.txt", video_file))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Uploaded at: {}\n", self.uploaded_at.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("AV: {}\n", self.result.aid));
        out.push_str(&format!("BV: {}\n", self.result.bvid));
        if let Some(cid) = self.result.cid {
            out.push_str(&format!("CID: {}\n", cid));
        }
        out.push_str(&format!("Video file: {}\n", self.video_path.display()));
        match &self.cover_path {
            Some(p) => out.push_str(&format!("Cover file: {}\n", p.display())),
            None => out.push_str("Cover file: none\n"),
        }
        out.push_str(&format!("Elapsed: {:.1}s\n", self.elapsed_secs));
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())
    }
}
