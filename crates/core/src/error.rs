use std::path::PathBuf;

/// Top-level error type. All public API functions return this.
#[derive(Debug, thiserror::Error)]
pub enum BiliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Not found: {0}")]
    NotFound(#[from] ResourceNotFoundError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Cannot read cookie file {path}: {source}")]
    CookieFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cookie file {path} is not valid JSON: {source}")]
    CookieFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Incomplete credentials, missing: {}", missing.join(", "))]
    IncompleteCredentials { missing: Vec<&'static str> },

    #[error("Invalid video metadata: {0}")]
    InvalidMeta(String),

    #[error("Config file error: {0}")]
    ConfigFile(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceNotFoundError {
    #[error("video file does not exist: {}", .0.display())]
    Video(PathBuf),

    #[error("video folder does not exist: {}", .0.display())]
    Folder(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Upload ended without a result")]
    MissingResult,

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Malformed event log line {line}: {detail}")]
    Malformed { line: usize, detail: String },
}

/// Render an error and its sources, one per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}
