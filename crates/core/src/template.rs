//! Title/description templating.
//! Format: `{placeholder}`, e.g. `{stem} ({folder})`.

use std::path::Path;

/// Render a template for a video. Placeholders: `{file}` (file name),
/// `{stem}` (file name without extension), `{folder}` (video folder name).
/// Unknown placeholders are left as they are.
pub fn render(template: &str, video_path: &Path, folder: &str) -> String {
    let file = video_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    template
        .replace("{file}", file)
        .replace("{stem}", stem)
        .replace("{folder}", folder)
}

/// The tag derived from a file name: everything before the first dot.
pub fn stem_tag(video_path: &Path) -> String {
    video_path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split('.').next())
        .unwrap_or("")
        .to_string()
}
