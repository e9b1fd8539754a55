//! Run configuration for the Piwik reporting client.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "PIWIK_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Overrides `token` from the config file.
pub const TOKEN_ENV: &str = "PIWIK_TOKEN_AUTH";

/// Where the spreadsheet lands. Overwritten on every run.
pub const OUTPUT_PATH: &str = "meetaura-stats.xlsx";

const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Endpoint and reporting window, resolved once per run.
///
/// Stored as a JSON object on disk:
/// ```json
/// {
///   "piwik_uri": "https://stats.example.com/index.php",
///   "token": "0123456789abcdef",
///   "idSite": 3,
///   "period": "range",
///   "date": "2017-05-01,2017-05-31"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub piwik_uri: String,
    pub token: String,
    #[serde(rename = "idSite", deserialize_with = "site_id")]
    pub id_site: String,
    pub period: String,
    pub date: String,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

// Piwik configs carry the site id as either a number or a string.
fn site_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SiteId {
        Num(u64),
        Text(String),
    }

    Ok(match SiteId::deserialize(deserializer)? {
        SiteId::Num(n) => n.to_string(),
        SiteId::Text(s) => s,
    })
}

impl ReportConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: ReportConfig = serde_json::from_str(content)?;
        config.max_concurrent_requests = config.max_concurrent_requests.max(1);
        Ok(config)
    }

    /// Loads from `$PIWIK_CONFIG_PATH` (or `config.json`) and applies
    /// `$PIWIK_TOKEN_AUTH` when set.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                config.token = token;
            }
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_minimal() {
        let config = ReportConfig::from_json(
            r#"{"piwik_uri":"https://stats.example.com/index.php","token":"abc",
                "idSite":3,"period":"day","date":"yesterday"}"#,
        )
        .unwrap();

        assert_eq!(config.id_site, "3");
        assert_eq!(config.period, "day");
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_from_json_string_site_and_overrides() {
        let config = ReportConfig::from_json(
            r#"{"piwik_uri":"http://localhost/","token":"abc","idSite":"7",
                "period":"range","date":"2017-05-01,2017-05-31",
                "max_concurrent_requests":0,"request_timeout_secs":20}"#,
        )
        .unwrap();

        assert_eq!(config.id_site, "7");
        // clamped so the semaphore always hands out a permit
        assert_eq!(config.max_concurrent_requests, 1);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_from_json_missing_token() {
        let result = ReportConfig::from_json(
            r#"{"piwik_uri":"http://localhost/","idSite":1,"period":"day","date":"today"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("piwik_visit_report_no_such_config.json");
        let _ = std::fs::remove_file(&path);
        assert!(ReportConfig::load(&path).is_err());
    }
}
