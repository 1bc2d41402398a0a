//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream wiki endpoints and HTTP behavior
    #[serde(default)]
    pub wiki: WikiConfig,

    /// Representative image selection and download
    #[serde(default)]
    pub image: ImageConfig,

    /// Content-addressed image cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Ban rule storage
    #[serde(default)]
    pub rules: RulesConfig,

    /// Batch processing
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.wiki.api_root)
            .map_err(|e| AppError::validation(format!("wiki.api_root: {e}")))?;
        url::Url::parse(&self.wiki.page_root)
            .map_err(|e| AppError::validation(format!("wiki.page_root: {e}")))?;
        if self.wiki.user_agent.trim().is_empty() {
            return Err(AppError::validation("wiki.user_agent is empty"));
        }
        if self.wiki.timeout_secs == 0 {
            return Err(AppError::validation("wiki.timeout_secs must be > 0"));
        }
        if self.pipeline.max_concurrent == 0 {
            return Err(AppError::validation("pipeline.max_concurrent must be > 0"));
        }
        if self.pipeline.window_minutes == 0 {
            return Err(AppError::validation("pipeline.window_minutes must be > 0"));
        }
        if self.pipeline.deadline_secs == 0 {
            return Err(AppError::validation("pipeline.deadline_secs must be > 0"));
        }
        if self.cache.root.as_os_str().is_empty() {
            return Err(AppError::validation("cache.root is empty"));
        }
        if self.rules.banned_category.trim().is_empty() {
            return Err(AppError::validation("rules.banned_category is empty"));
        }
        self.image.header_map()?;
        Ok(())
    }
}

/// Upstream wiki endpoints and HTTP client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// `api.php` endpoint used for metadata and recent-changes queries
    #[serde(default = "defaults::api_root")]
    pub api_root: String,

    /// Public page root; a title is appended to form the page URL
    #[serde(default = "defaults::page_root")]
    pub page_root: String,

    /// User-Agent header for API and page requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt, transport failures only
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries in milliseconds
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl WikiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            api_root: defaults::api_root(),
            page_root: defaults::page_root(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
        }
    }
}

/// Representative image selection and download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Candidate `<img>` must be strictly wider than this
    #[serde(default = "defaults::min_width")]
    pub min_width: u32,

    /// Candidate `<img>` must be strictly taller than this
    #[serde(default = "defaults::min_height")]
    pub min_height: u32,

    /// Header bundle sent with image downloads
    #[serde(default = "defaults::image_headers")]
    pub headers: BTreeMap<String, String>,
}

impl ImageConfig {
    /// Build the download header bundle, rejecting invalid names or values.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::validation(format!("image.headers name '{name}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| AppError::validation(format!("image.headers '{name}' value: {e}")))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_width: defaults::min_width(),
            min_height: defaults::min_height(),
            headers: defaults::image_headers(),
        }
    }
}

/// Content-addressed cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `{md5}.{ext}` entries
    #[serde(default = "defaults::cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: defaults::cache_root(),
        }
    }
}

/// Ban rule storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// JSON file holding the rule list
    #[serde(default = "defaults::rules_path")]
    pub path: PathBuf,

    /// Category that always blocks a page, regardless of stored rules
    #[serde(default = "defaults::banned_category")]
    pub banned_category: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: defaults::rules_path(),
            banned_category: defaults::banned_category(),
        }
    }
}

/// Batch processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Titles processed concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Recent-changes window length in minutes, ending now
    #[serde(default = "defaults::window_minutes")]
    pub window_minutes: u32,

    /// Upper bound on a whole run in seconds
    #[serde(default = "defaults::deadline")]
    pub deadline_secs: u64,
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            window_minutes: defaults::window_minutes(),
            deadline_secs: defaults::deadline(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    // Wiki defaults
    pub fn api_root() -> String {
        "https://zh.moegirl.org/api.php".into()
    }
    pub fn page_root() -> String {
        "https://zh.moegirl.org/".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; koushihime/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        2
    }
    pub fn retry_backoff() -> u64 {
        500
    }

    // Image defaults
    pub fn min_width() -> u32 {
        200
    }
    pub fn min_height() -> u32 {
        100
    }
    pub fn image_headers() -> BTreeMap<String, String> {
        [
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("accept-language", "zh-CN,zh;q=0.8,zh-TW;q=0.6,en;q=0.4"),
            ("cache-control", "max-age=0"),
            (
                "cookie",
                "__cfduid=dfc6b63939d0f061541f2368f5233734b1461485677",
            ),
            ("if-none-match", "56a5edcc-8cb9"),
            ("upgrade-insecure-requests", "1"),
            (
                "user-agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/48.0.2564.109 Safari/537.36",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    // Storage defaults
    pub fn cache_root() -> PathBuf {
        PathBuf::from("imgcache")
    }
    pub fn rules_path() -> PathBuf {
        PathBuf::from("rules.json")
    }
    pub fn banned_category() -> String {
        "Category:屏蔽更新姬推送的条目".into()
    }

    // Pipeline defaults
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn window_minutes() -> u32 {
        60
    }
    pub fn deadline() -> u64 {
        300
    }
}
