use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MirrorError, Result};
use crate::feed::Article;
use crate::language::LanguagePackManager;
use crate::offline::{OfflineRecord, OfflineStore};
use crate::storage::{self, StoragePaths};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FavoriteKey {
    pub url: String,
    pub lang: String,
}

impl FavoriteKey {
    pub fn new(url: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            lang: lang.into(),
        }
    }
}

/// A favorite resolved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteEntry {
    /// Still present in the listing for its language.
    Live(Article),
    /// Gone from the listing; described by the stored offline copy.
    Offline(OfflineRecord),
    /// Neither listed nor stored, e.g. after the offline copies were cleared.
    Missing(FavoriteKey),
}

impl FavoriteEntry {
    pub fn url(&self) -> &str {
        match self {
            Self::Live(article) => &article.link,
            Self::Offline(record) => &record.url,
            Self::Missing(key) => &key.url,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Live(article) => &article.title,
            Self::Offline(record) => &record.title,
            Self::Missing(_) => "",
        }
    }

    pub fn snippet(&self) -> &str {
        match self {
            Self::Live(article) => &article.snippet,
            Self::Offline(record) => &record.snippet,
            Self::Missing(_) => "",
        }
    }
}

pub struct FavoritesRegistry {
    path: std::path::PathBuf,
    offline: Arc<OfflineStore>,
    languages: Arc<LanguagePackManager>,
    entries: Mutex<Vec<FavoriteKey>>,
}

impl FavoritesRegistry {
    pub async fn load(
        paths: &StoragePaths,
        offline: Arc<OfflineStore>,
        languages: Arc<LanguagePackManager>,
    ) -> Result<Self> {
        let path = paths.favorites();
        let entries: Vec<FavoriteKey> = storage::read_record(&path).await?.unwrap_or_default();
        debug!(count = entries.len(), "favorites loaded");
        Ok(Self {
            path,
            offline,
            languages,
            entries: Mutex::new(entries),
        })
    }

    /// Marks `(url, lang)`; requires a stored offline copy.
    pub async fn add(&self, url: &str, lang: &str) -> Result<()> {
        if !self.offline.exists(url, lang).await {
            return Err(MirrorError::MissingOfflineCopy {
                url: url.to_owned(),
                lang: lang.to_owned(),
            });
        }
        let key = FavoriteKey::new(url, lang);
        let mut entries = self.entries.lock().await;
        if entries.contains(&key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.push(key);
        storage::write_record(&self.path, &next).await?;
        *entries = next;
        info!(%url, %lang, "favorite added");
        Ok(())
    }

    /// Unmarks `(url, lang)`. The offline copy is kept.
    pub async fn remove(&self, url: &str, lang: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let next: Vec<FavoriteKey> = entries
            .iter()
            .filter(|key| !(key.url == url && key.lang == lang))
            .cloned()
            .collect();
        if next.len() == entries.len() {
            return Ok(false);
        }
        storage::write_record(&self.path, &next).await?;
        *entries = next;
        info!(%url, %lang, "favorite removed");
        Ok(true)
    }

    pub async fn is_favorite(&self, url: &str, lang: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|key| key.url == url && key.lang == lang)
    }

    /// Favorites of `lang` in the order they were added.
    pub async fn list(&self, lang: &str) -> Result<Vec<FavoriteEntry>> {
        let keys: Vec<FavoriteKey> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|key| key.lang == lang)
            .cloned()
            .collect();
        let listing = self.languages.display_cache(lang).await;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(article) = listing.iter().find(|a| a.link == key.url) {
                out.push(FavoriteEntry::Live(article.clone()));
                continue;
            }
            match self.offline.load(&key.url, &key.lang).await {
                Ok(Some(record)) => out.push(FavoriteEntry::Offline(record)),
                Ok(None) => out.push(FavoriteEntry::Missing(key)),
                Err(e) => {
                    warn!(url = %key.url, %lang, error = %e, "unreadable offline copy");
                    out.push(FavoriteEntry::Missing(key));
                }
            }
        }
        Ok(out)
    }
}
