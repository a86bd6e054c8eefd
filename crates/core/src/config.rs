//! Config file parsing for `~/.config/bili-upload/config.toml`.
//!
//! `BILI_UPLOAD_CONFIG` overrides the location. A missing or unreadable
//! file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::meta::Copyright;
use crate::progress::Cadence;

pub const CONFIG_ENV: &str = "BILI_UPLOAD_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub reporter: Cadence,
    #[serde(default)]
    pub dry_run: DryRunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding one folder per video.
    pub videos_root: PathBuf,
    /// Upload logs and result records.
    pub logs_dir: PathBuf,
    /// JSON cookie export with the account credentials.
    pub cookie_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            videos_root: PathBuf::from("../videos"),
            logs_dir: PathBuf::from("../logs"),
            cookie_file: PathBuf::from("bili_cookie.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub tid: u32,
    pub tags: Vec<String>,
    pub title_template: String,
    pub desc_template: String,
    pub page_title_template: String,
    pub page_desc_template: String,
    pub copyright: Copyright,
    pub source: String,
    pub no_reprint: bool,
    pub open_elec: bool,
    pub dynamic: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            tid: 17,
            tags: Vec::new(),
            title_template: "{stem}".to_string(),
            desc_template: "Uploaded with bili-upload ({file})".to_string(),
            page_title_template: "{stem}".to_string(),
            page_desc_template: String::new(),
            copyright: Copyright::Original,
            source: String::new(),
            no_reprint: true,
            open_elec: true,
            dynamic: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DryRunConfig {
    pub chunk_size_kb: u64,
    pub chunk_delay_ms: u64,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            chunk_size_kb: 4096,
            chunk_delay_ms: 0,
        }
    }
}

/// Load config from the default path. Falls back to defaults.
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };
    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if path.exists() {
                tracing::warn!(path = %path.display(), "ignoring config file: {}", e);
            }
            AppConfig::default()
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigurationError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::ConfigFile(format!("{}: {}", path.display(), e)))?;
    let cfg = toml::from_str::<AppConfig>(&content)
        .map_err(|e| ConfigurationError::ConfigFile(format!("{}: {}", path.display(), e)))?;
    cfg.reporter.validate()?;
    Ok(cfg)
}

pub fn save_config(cfg: &AppConfig, path: &Path) -> Result<(), ConfigurationError> {
    let text = toml::to_string_pretty(cfg).map_err(|e| ConfigurationError::ConfigFile(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigurationError::ConfigFile(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, text)
        .map_err(|e| ConfigurationError::ConfigFile(format!("{}: {}", path.display(), e)))
}

/// Return the config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(p));
    }
    dirs::config_dir().map(|mut p| {
        p.push("bili-upload");
        p.push("config.toml");
        p
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
[meta]
tid = 188
copyright = "reprint"

[reporter]
detailed_interval_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(cfg.meta.tid, 188);
        assert_eq!(cfg.meta.copyright, Copyright::Reprint);
        assert!(cfg.meta.open_elec);
        assert_eq!(cfg.reporter.detailed_interval, Duration::from_secs(5));
        assert_eq!(cfg.reporter.summary_interval, Duration::from_secs(60));
        assert_eq!(cfg.paths.cookie_file, PathBuf::from("bili_cookie.txt"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.meta.tags = vec!["test".into(), "rust".into()];
        cfg.dry_run.chunk_size_kb = 64;
        save_config(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.meta.tags, vec!["test", "rust"]);
        assert_eq!(loaded.dry_run.chunk_size_kb, 64);
        assert_eq!(loaded.reporter.percent_step, 1.0);
    }

    #[test]
    fn non_finite_percent_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reporter]\npercent_step = nan\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("percent_step"));
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[meta]\ntid = \"music\"\n").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigurationError::ConfigFile(_))
        ));
    }
}
