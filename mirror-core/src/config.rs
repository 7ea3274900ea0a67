use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MirrorError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub languages: LanguageConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language the remote feed is published in.
    pub default_language: String,
    /// Languages the translator is enabled for.
    pub supported: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_base_articles: usize,
    pub memo_capacity: usize,
    pub articles_per_page: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    /// Run a cycle as soon as the scheduler starts instead of one interval later.
    pub sync_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub feed_url: String,
    pub translate_url: String,
    pub translate_api_key: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Articles translated in parallel while building a language pack.
    pub concurrency: usize,
    /// Consecutive service failures after which a pack download is abandoned.
    pub max_consecutive_failures: usize,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default_language: "ar".into(),
            supported: ["en", "fr", "es", "de", "ja", "tr", "ur", "id"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_base_articles: 500,
            memo_capacity: 50,
            articles_per_page: 25,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            sync_on_start: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://www.collepedia.com/feeds/posts/default".into(),
            translate_url: "http://localhost:5000/translate".into(),
            translate_api_key: None,
            user_agent: concat!("feed-mirror/", env!("CARGO_PKG_VERSION")).into(),
            request_timeout_secs: 15,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_consecutive_failures: 5,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl LanguageConfig {
    /// Configured codes are only honoured when they are safe to use as a
    /// file name component.
    pub fn is_supported(&self, lang: &str) -> bool {
        is_plain_code(lang) && self.supported.iter().any(|code| code == lang)
    }

    /// The default language or one of the supported ones.
    pub fn is_known(&self, lang: &str) -> bool {
        (is_plain_code(lang) && lang == self.default_language) || self.is_supported(lang)
    }
}

fn is_plain_code(lang: &str) -> bool {
    !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl MirrorConfig {
    /// Platform data directory, e.g. `~/.local/share/feed-mirror` on Linux.
    pub fn default_data_dir() -> PathBuf {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("feed-mirror")
    }

    pub fn config_file_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join("config.json")
    }

    /// Loads `config.json` from `dir`, or falls back to defaults and tries to
    /// write them back so the user has a file to edit.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let path = Self::config_file_path(dir);
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "unable to load config, using defaults");
                let config = Self::default();
                if let Err(save_err) = config.save_to(&path) {
                    warn!(error = %save_err, "unable to save default config");
                }
                config
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MirrorError::persistence(path, e))?;
        serde_json::from_str(&content).map_err(|source| MirrorError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::persistence(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MirrorError::persistence(path, std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(|e| MirrorError::persistence(path, e))
    }
}
