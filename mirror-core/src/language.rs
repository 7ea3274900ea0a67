use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::base::BaseStore;
use crate::config::{LanguageConfig, TranslationConfig};
use crate::error::{MirrorError, Result};
use crate::feed::Article;
use crate::guard::InProgress;
use crate::memo::TranslationMemo;
use crate::services::Translator;
use crate::state::MirrorState;
use crate::storage;

/// Placeholder stored for a field whose translation failed.
pub const TRANSLATION_FAILED: &str = "(Translation Failed)";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LanguagePackRecord {
    lang: String,
    generated_at: DateTime<Utc>,
    articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub lang: String,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    Active,
    Base,
    Downloaded,
    Available,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageStatus {
    pub code: String,
    pub status: PackStatus,
    pub can_download: bool,
    pub can_delete: bool,
}

/// Builds, serves and removes translated copies of the base listing.
pub struct LanguagePackManager {
    state: Arc<MirrorState>,
    base: Arc<BaseStore>,
    translator: Arc<dyn Translator>,
    memo: Arc<TranslationMemo>,
    languages: LanguageConfig,
    translation: TranslationConfig,
    packs: RwLock<HashMap<String, Arc<Vec<Article>>>>,
    running: Mutex<HashSet<String>>,
}

impl LanguagePackManager {
    /// Loads every registered pack. Packs that cannot be read are unregistered.
    pub async fn load(
        state: Arc<MirrorState>,
        base: Arc<BaseStore>,
        translator: Arc<dyn Translator>,
        memo: Arc<TranslationMemo>,
        languages: LanguageConfig,
        translation: TranslationConfig,
    ) -> Result<Self> {
        let mut packs = HashMap::new();
        let mut broken = Vec::new();
        for lang in state.settings().await.downloaded_languages {
            let path = state.paths().language_cache(&lang);
            match storage::read_record::<LanguagePackRecord>(&path).await {
                Ok(Some(record)) => {
                    debug!(%lang, articles = record.articles.len(), "language pack loaded");
                    packs.insert(lang, Arc::new(record.articles));
                }
                Ok(None) => broken.push(lang),
                Err(e) => {
                    warn!(%lang, error = %e, "unreadable language pack");
                    broken.push(lang);
                }
            }
        }
        if !broken.is_empty() {
            let default = state.default_language().to_owned();
            state
                .update_settings(|settings| {
                    settings.downloaded_languages.retain(|l| !broken.contains(l));
                    if broken.contains(&settings.current_language) {
                        settings.current_language = default;
                    }
                })
                .await?;
        }

        Ok(Self {
            state,
            base,
            translator,
            memo,
            languages,
            translation,
            packs: RwLock::new(packs),
            running: Mutex::new(HashSet::new()),
        })
    }

    fn default_language(&self) -> &str {
        self.state.default_language()
    }

    /// Translates the current base listing into `lang` and registers the pack.
    ///
    /// A field that fails to translate gets [`TRANSLATION_FAILED`] and the
    /// download goes on. The download is abandoned, writing nothing, when no
    /// article could be translated or when too many service failures happen in
    /// a row.
    pub async fn download(
        &self,
        lang: &str,
        on_progress: impl Fn(DownloadProgress) + Send + Sync,
    ) -> Result<usize> {
        if lang == self.default_language() {
            return Err(MirrorError::AlreadyDownloaded(lang.to_owned()));
        }
        if !self.languages.is_supported(lang) {
            return Err(MirrorError::UnsupportedLanguage(lang.to_owned()));
        }
        let _running = InProgress::acquire(&self.running, lang.to_owned(), || {
            format!("language pack '{lang}' is being downloaded")
        })?;
        if self.state.settings().await.is_downloaded(lang) {
            return Err(MirrorError::AlreadyDownloaded(lang.to_owned()));
        }

        let snapshot = self.base.all().await;
        let total = snapshot.len();
        info!(%lang, total, "downloading language pack");

        let mut results = stream::iter(snapshot.iter().cloned())
            .map(|article| self.translate_article(article, lang))
            .buffered(self.translation.concurrency.max(1));

        let mut translated = Vec::with_capacity(total);
        let mut succeeded = 0usize;
        let mut consecutive = 0usize;
        let mut last_error = None;
        while let Some((article, failure)) = results.next().await {
            match failure {
                None => {
                    succeeded += 1;
                    consecutive = 0;
                }
                Some(e) => {
                    warn!(%lang, id = %article.id, error = %e, "article translation failed");
                    if e.is_service_failure() {
                        consecutive += 1;
                        if consecutive >= self.translation.max_consecutive_failures.max(1) {
                            warn!(%lang, consecutive, "translation service unavailable, aborting");
                            return Err(e);
                        }
                    } else {
                        consecutive = 0;
                    }
                    last_error = Some(e);
                }
            }
            translated.push(article);
            on_progress(DownloadProgress {
                lang: lang.to_owned(),
                done: translated.len(),
                total,
            });
        }
        drop(results);

        if succeeded == 0 {
            if let Some(e) = last_error {
                warn!(%lang, "no article could be translated, aborting");
                return Err(e);
            }
        }

        let path = self.state.paths().language_cache(lang);
        let record = LanguagePackRecord {
            lang: lang.to_owned(),
            generated_at: Utc::now(),
            articles: translated,
        };
        storage::write_record(&path, &record).await?;
        let registered = self
            .state
            .update_settings(|settings| {
                if !settings.is_downloaded(lang) {
                    settings.downloaded_languages.push(lang.to_owned());
                }
            })
            .await;
        if let Err(e) = registered {
            let _ = storage::remove_record(&path).await;
            return Err(e);
        }

        let count = record.articles.len();
        self.packs
            .write()
            .await
            .insert(lang.to_owned(), Arc::new(record.articles));
        info!(%lang, count, "language pack ready");
        Ok(count)
    }

    /// Translates title and snippet; failed fields carry the sentinel and the
    /// first error is handed back.
    async fn translate_article(
        &self,
        mut article: Article,
        lang: &str,
    ) -> (Article, Option<MirrorError>) {
        let default = self.default_language();
        let mut failure = None;
        for field in [&mut article.title, &mut article.snippet] {
            match self
                .memo
                .translate(self.translator.as_ref(), field, lang, default)
                .await
            {
                Ok(text) => *field = text,
                Err(e) => {
                    *field = TRANSLATION_FAILED.to_owned();
                    failure.get_or_insert(e);
                }
            }
        }
        (article, failure)
    }

    pub async fn delete(&self, lang: &str) -> Result<()> {
        if lang == self.default_language() {
            return Err(MirrorError::DefaultLanguage(lang.to_owned()));
        }
        let _running = InProgress::acquire(&self.running, lang.to_owned(), || {
            format!("language pack '{lang}' is being downloaded")
        })?;
        if !self.state.settings().await.is_downloaded(lang) {
            return Err(MirrorError::NotDownloaded(lang.to_owned()));
        }

        let default = self.default_language().to_owned();
        self.state
            .update_settings(|settings| {
                settings.downloaded_languages.retain(|l| l != lang);
                if settings.current_language == lang {
                    settings.current_language = default;
                }
            })
            .await?;
        self.packs.write().await.remove(lang);
        let path = self.state.paths().language_cache(lang);
        if let Err(e) = storage::remove_record(&path).await {
            // Unregistered already; the orphaned file is overwritten on the next download.
            warn!(%lang, error = %e, "failed to remove language pack file");
        }
        info!(%lang, "language pack deleted");
        Ok(())
    }

    /// The listing to show for `lang`: its pack when one is installed, the base
    /// listing otherwise.
    pub async fn display_cache(&self, lang: &str) -> Arc<Vec<Article>> {
        if lang != self.default_language() {
            if let Some(pack) = self.packs.read().await.get(lang) {
                return pack.clone();
            }
        }
        self.base.all().await
    }

    pub async fn select(&self, lang: &str) -> Result<()> {
        let lang = lang.to_owned();
        let default = self.default_language().to_owned();
        self.state
            .update_settings(|settings| {
                if lang != default && !settings.is_downloaded(&lang) {
                    return Err(MirrorError::NotDownloaded(lang));
                }
                settings.current_language = lang;
                Ok(())
            })
            .await?
    }

    pub async fn downloaded(&self) -> Vec<String> {
        self.state.settings().await.downloaded_languages
    }

    /// Every known language with its state, the active one first, then the ones
    /// usable offline, then the rest; alphabetical within each group.
    pub async fn statuses(&self, filter: &str) -> Vec<LanguageStatus> {
        let settings = self.state.settings().await;
        let default = self.default_language();
        let filter = filter.trim().to_lowercase();

        let mut codes: Vec<&str> = std::iter::once(default)
            .chain(self.languages.supported.iter().map(String::as_str))
            .chain(settings.downloaded_languages.iter().map(String::as_str))
            .collect();
        codes.sort_unstable();
        codes.dedup();

        let mut out: Vec<LanguageStatus> = codes
            .into_iter()
            .filter(|code| filter.is_empty() || code.contains(filter.as_str()))
            .map(|code| {
                let is_base = code == default;
                let downloaded = settings.is_downloaded(code);
                let status = if code == settings.current_language {
                    PackStatus::Active
                } else if is_base {
                    PackStatus::Base
                } else if downloaded {
                    PackStatus::Downloaded
                } else {
                    PackStatus::Available
                };
                LanguageStatus {
                    code: code.to_owned(),
                    status,
                    can_download: !is_base && !downloaded && self.languages.is_supported(code),
                    can_delete: !is_base && downloaded,
                }
            })
            .collect();
        out.sort_by_key(|entry| {
            let group = match entry.status {
                PackStatus::Active => 0,
                PackStatus::Base | PackStatus::Downloaded => 1,
                PackStatus::Available => 2,
            };
            (group, entry.code.clone())
        });
        out
    }
}
