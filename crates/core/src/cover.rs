//! Find a cover image next to a video file.
//!
//! Covers follow the naming convention `<video-stem>_cover.<ext>`.

use std::path::{Path, PathBuf};

/// Image extensions tried, in priority order.
pub const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// All candidate cover paths for a video, in priority order.
pub fn cover_candidates(video_path: &Path) -> Vec<PathBuf> {
    let dir = video_path.parent().unwrap_or(Path::new("."));
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    COVER_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}_cover.{}", stem, ext)))
        .collect()
}

/// First existing cover for the video, if any.
pub fn find_cover(video_path: &Path) -> Option<PathBuf> {
    match cover_candidates(video_path).into_iter().find(|p| p.is_file()) {
        Some(cover) => {
            tracing::info!(cover = %cover.display(), "found cover file");
            Some(cover)
        }
        None => {
            tracing::warn!(video = %video_path.display(), "no cover file found for video");
            None
        }
    }
}
