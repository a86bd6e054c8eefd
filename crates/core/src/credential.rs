//! Account credentials read from a browser cookie export.

use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::error::ConfigurationError;

pub const SESSDATA: &str = "SESSDATA";
pub const BILI_JCT: &str = "bili_jct";
pub const BUVID3: &str = "buvid3";
pub const DEDEUSERID: &str = "DedeUserID";

/// The four cookie values the platform needs. Token formats are opaque.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub sessdata: String,
    pub bili_jct: String,
    pub buvid3: String,
    pub dedeuserid: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "<empty>" } else { "<redacted>" };
        f.debug_struct("Credential")
            .field("sessdata", &mask(&self.sessdata))
            .field("bili_jct", &mask(&self.bili_jct))
            .field("buvid3", &mask(&self.buvid3))
            .field("dedeuserid", &self.dedeuserid)
            .finish()
    }
}

impl Credential {
    /// Read a JSON object of cookie values. Missing keys become empty strings;
    /// numeric values (DedeUserID is often exported as a number) are kept as text.
    pub fn from_cookie_json(json: &Value) -> Self {
        let get = |key: &str| match json.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Self {
            sessdata: get(SESSDATA),
            bili_jct: get(BILI_JCT),
            buvid3: get(BUVID3),
            dedeuserid: get(DEDEUSERID),
        }
    }

    pub fn load_cookie_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::CookieFile {
            path: path.to_path_buf(),
            source,
        })?;
        let json: Value = serde_json::from_str(&text).map_err(|source| ConfigurationError::CookieFormat {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded cookie file");
        Ok(Self::from_cookie_json(&json))
    }

    /// Names of the cookie keys that are empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (SESSDATA, &self.sessdata),
            (BILI_JCT, &self.bili_jct),
            (BUVID3, &self.buvid3),
            (DEDEUSERID, &self.dedeuserid),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect()
    }

    pub fn ensure_complete(&self) -> Result<(), ConfigurationError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::IncompleteCredentials { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reads_all_four_keys() {
        let c = Credential::from_cookie_json(&json!({
            "SESSDATA": "s", "bili_jct": "j", "buvid3": "b", "DedeUserID": 12345, "other": "x"
        }));
        assert_eq!(c.dedeuserid, "12345");
        assert!(c.ensure_complete().is_ok());
    }

    #[test]
    fn incomplete_credentials_name_missing_keys() {
        let c = Credential::from_cookie_json(&json!({"SESSDATA": "s", "buvid3": "  "}));
        assert_eq!(c.missing(), vec![BILI_JCT, BUVID3, DEDEUSERID]);
        let err = c.ensure_complete().unwrap_err();
        assert!(err.to_string().contains("bili_jct, buvid3, DedeUserID"));
    }

    #[test]
    fn debug_redacts_tokens() {
        let c = Credential {
            sessdata: "secret".into(),
            ..Default::default()
        };
        let shown = format!("{:?}", c);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<empty>"));
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(matches!(
            Credential::load_cookie_file(&missing),
            Err(ConfigurationError::CookieFile { .. })
        ));

        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "SESSDATA=abc").unwrap();
        assert!(matches!(
            Credential::load_cookie_file(&bad),
            Err(ConfigurationError::CookieFormat { .. })
        ));

        let good = dir.path().join("bili_cookie.txt");
        std::fs::write(&good, r#"{"SESSDATA": "a", "bili_jct": "b", "buvid3": "c", "DedeUserID": "d"}"#).unwrap();
        let c = Credential::load_cookie_file(&good).unwrap();
        assert_eq!(c.bili_jct, "b");
    }
}
