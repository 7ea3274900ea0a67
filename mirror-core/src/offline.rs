use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LanguageConfig;
use crate::error::{MirrorError, Result};
use crate::feed::Article;
use crate::guard::InProgress;
use crate::memo::TranslationMemo;
use crate::services::{BodyFetcher, Translator};
use crate::storage::{self, StoragePaths};

/// Full copy of one article in one language, readable without the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfflineRecord {
    pub url: String,
    pub lang: String,
    pub title: String,
    pub snippet: String,
    pub body: String,
    pub image_url: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    Fetching,
    Translating,
    Writing,
}

pub struct OfflineStore {
    paths: StoragePaths,
    fetcher: Arc<dyn BodyFetcher>,
    translator: Arc<dyn Translator>,
    memo: Arc<TranslationMemo>,
    languages: LanguageConfig,
    running: Mutex<HashSet<(String, String)>>,
}

impl OfflineStore {
    pub fn new(
        paths: StoragePaths,
        fetcher: Arc<dyn BodyFetcher>,
        translator: Arc<dyn Translator>,
        memo: Arc<TranslationMemo>,
        languages: LanguageConfig,
    ) -> Self {
        Self {
            paths,
            fetcher,
            translator,
            memo,
            languages,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Language codes become directory names; anything unknown is refused.
    fn check_language(&self, lang: &str) -> Result<()> {
        if self.languages.is_known(lang) {
            Ok(())
        } else {
            Err(MirrorError::UnsupportedLanguage(lang.to_owned()))
        }
    }

    pub async fn save(
        &self,
        url: &str,
        lang: &str,
        on_progress: impl Fn(SaveStage) + Send + Sync,
    ) -> Result<OfflineRecord> {
        self.save_with_metadata(url, lang, None, on_progress).await
    }

    /// Fetches, translates and stores the body of `url` for `lang`, replacing
    /// any earlier copy. `source` supplies title and snippet kept alongside the
    /// body for when the article has left the listing.
    pub async fn save_with_metadata(
        &self,
        url: &str,
        lang: &str,
        source: Option<&Article>,
        on_progress: impl Fn(SaveStage) + Send + Sync,
    ) -> Result<OfflineRecord> {
        self.check_language(lang)?;
        let _running = InProgress::acquire(&self.running, (url.to_owned(), lang.to_owned()), || {
            format!("saving {url} ({lang})")
        })?;

        on_progress(SaveStage::Fetching);
        let fetched = self.fetcher.fetch_body(url).await?;

        let mut title = source.map(|a| a.title.clone()).unwrap_or_default();
        let mut snippet = source.map(|a| a.snippet.clone()).unwrap_or_default();
        let default = self.languages.default_language.as_str();
        let mut body = fetched.body;
        if lang != default {
            on_progress(SaveStage::Translating);
            body = self.translator.translate(&body, lang).await?;
            for field in [&mut title, &mut snippet] {
                match self
                    .memo
                    .translate(self.translator.as_ref(), field, lang, default)
                    .await
                {
                    Ok(text) => *field = text,
                    Err(e) => warn!(%url, %lang, error = %e, "keeping untranslated metadata"),
                }
            }
        }

        on_progress(SaveStage::Writing);
        let record = OfflineRecord {
            url: url.to_owned(),
            lang: lang.to_owned(),
            title,
            snippet,
            body,
            image_url: fetched
                .image_url
                .or_else(|| source.and_then(|a| a.image_url.clone())),
            saved_at: Utc::now(),
        };
        storage::write_record(&self.paths.offline_article(url, lang), &record).await?;
        info!(%url, %lang, chars = record.body.len(), "article saved offline");
        Ok(record)
    }

    /// Local lookup only.
    pub async fn load(&self, url: &str, lang: &str) -> Result<Option<OfflineRecord>> {
        self.check_language(lang)?;
        storage::read_record(&self.paths.offline_article(url, lang)).await
    }

    pub async fn exists(&self, url: &str, lang: &str) -> bool {
        self.check_language(lang).is_ok()
            && storage::record_exists(&self.paths.offline_article(url, lang)).await
    }

    /// Deletes every stored body and returns how many there were. Favorites
    /// pointing at them are left alone.
    pub async fn clear(&self) -> Result<usize> {
        let dir = self.paths.offline_dir();
        let mut langs = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MirrorError::persistence(&dir, e)),
        };

        let mut removed = 0;
        while let Some(lang_dir) = langs
            .next_entry()
            .await
            .map_err(|e| MirrorError::persistence(&dir, e))?
        {
            let lang_path = lang_dir.path();
            if !lang_path.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(&lang_path)
                .await
                .map_err(|e| MirrorError::persistence(&lang_path, e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| MirrorError::persistence(&lang_path, e))?
            {
                let path = file.path();
                let is_record = path.extension().is_some_and(|ext| ext == "json");
                if storage::remove_record(&path).await? && is_record {
                    removed += 1;
                }
            }
            if let Err(e) = tokio::fs::remove_dir(&lang_path).await {
                debug!(path = %lang_path.display(), error = %e, "left offline directory in place");
            }
        }
        info!(removed, "offline articles cleared");
        Ok(removed)
    }
}
