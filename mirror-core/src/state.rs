use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{MirrorError, Result};
use crate::feed::Article;
use crate::storage::{self, StoragePaths};

/// Process-wide settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub current_language: String,
    pub downloaded_languages: Vec<String>,
    pub last_seen_article_id: Option<String>,
}

impl Settings {
    pub fn new(default_language: &str) -> Self {
        Self {
            current_language: default_language.to_owned(),
            downloaded_languages: Vec::new(),
            last_seen_article_id: None,
        }
    }

    pub fn is_downloaded(&self, lang: &str) -> bool {
        self.downloaded_languages.iter().any(|code| code == lang)
    }
}

/// State shared by every component: the base listing and the settings record.
///
/// Constructed once with [`MirrorState::load`] and flushed with
/// [`MirrorState::flush`] on shutdown. Settings are only changed through
/// [`MirrorState::update_settings`], which persists while still holding the
/// lock so concurrent writers cannot interleave.
pub struct MirrorState {
    paths: StoragePaths,
    default_language: String,
    settings: Mutex<Settings>,
    base: RwLock<Arc<Vec<Article>>>,
}

impl MirrorState {
    pub async fn load(dir: impl AsRef<Path>, default_language: &str) -> Result<Self> {
        let paths = StoragePaths::new(dir.as_ref());
        tokio::fs::create_dir_all(paths.root())
            .await
            .map_err(|e| MirrorError::persistence(paths.root(), e))?;

        let base: Vec<Article> = storage::read_record(&paths.base_cache())
            .await?
            .unwrap_or_default();
        let stored: Option<Settings> = storage::read_record(&paths.settings()).await?;
        let had_settings = stored.is_some();
        let mut settings = stored.unwrap_or_else(|| Settings::new(default_language));

        let before = settings.clone();
        reconcile(&mut settings, &paths, default_language).await;
        if !had_settings || settings != before {
            storage::write_record(&paths.settings(), &settings).await?;
        }

        info!(
            articles = base.len(),
            current = %settings.current_language,
            downloaded = ?settings.downloaded_languages,
            "mirror state loaded"
        );

        Ok(Self {
            paths,
            default_language: default_language.to_owned(),
            settings: Mutex::new(settings),
            base: RwLock::new(Arc::new(base)),
        })
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    pub async fn current_language(&self) -> String {
        self.settings.lock().await.current_language.clone()
    }

    /// Applies `change` and persists the result. The in-memory record is only
    /// replaced once the write succeeded.
    pub async fn update_settings<R>(&self, change: impl FnOnce(&mut Settings) -> R) -> Result<R> {
        let mut guard = self.settings.lock().await;
        let mut next = guard.clone();
        let out = change(&mut next);
        if next != *guard {
            storage::write_record(&self.paths.settings(), &next).await?;
            *guard = next;
        }
        Ok(out)
    }

    pub async fn base(&self) -> Arc<Vec<Article>> {
        self.base.read().await.clone()
    }

    /// Persists and installs a new base listing. Callers hold the base
    /// store's fetch lock.
    pub(crate) async fn replace_base(&self, articles: Vec<Article>) -> Result<()> {
        storage::write_record(&self.paths.base_cache(), &articles).await?;
        self.set_base(articles).await;
        Ok(())
    }

    /// Installs a listing that is already on disk.
    pub(crate) async fn set_base(&self, articles: Vec<Article>) {
        *self.base.write().await = Arc::new(articles);
    }

    /// Rewrites the settings file. The listing has its own writer,
    /// [`BaseStore::flush`](crate::base::BaseStore::flush).
    pub async fn flush(&self) -> Result<()> {
        let settings = self.settings.lock().await;
        storage::write_record(&self.paths.settings(), &*settings).await?;
        debug!("settings flushed");
        Ok(())
    }
}

/// Drops registrations whose pack file is gone and resets an unusable current
/// language to the default.
async fn reconcile(settings: &mut Settings, paths: &StoragePaths, default_language: &str) {
    let mut kept = Vec::with_capacity(settings.downloaded_languages.len());
    for lang in std::mem::take(&mut settings.downloaded_languages) {
        if lang == default_language || kept.contains(&lang) {
            continue;
        }
        if storage::record_exists(&paths.language_cache(&lang)).await {
            kept.push(lang);
        } else {
            warn!(%lang, "language pack file missing, unregistering");
        }
    }
    settings.downloaded_languages = kept;

    if settings.current_language != default_language
        && !settings.is_downloaded(&settings.current_language)
    {
        warn!(lang = %settings.current_language, "current language unavailable, resetting");
        settings.current_language = default_language.to_owned();
    }
}
