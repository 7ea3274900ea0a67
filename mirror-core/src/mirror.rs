use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::base::BaseStore;
use crate::config::MirrorConfig;
use crate::error::Result;
use crate::favorites::FavoritesRegistry;
use crate::feed::Article;
use crate::http::{build_client, HttpBodyFetcher, HttpFeedFetcher, HttpTranslator, RetryPolicy};
use crate::language::LanguagePackManager;
use crate::memo::TranslationMemo;
use crate::offline::{OfflineStore, SaveStage};
use crate::poller::{Event, SchedulerHandle, SyncScheduler};
use crate::services::{BodyFetcher, FeedFetcher, Translator};
use crate::state::MirrorState;

/// The remote collaborators a [`Mirror`] talks to.
#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedFetcher>,
    pub body: Arc<dyn BodyFetcher>,
    pub translator: Arc<dyn Translator>,
}

impl Services {
    /// HTTP-backed collaborators sharing one client.
    pub fn http(config: &MirrorConfig) -> Result<Self> {
        let client = build_client(&config.http)?;
        let retry = RetryPolicy::from_config(&config.http);
        Ok(Self {
            feed: Arc::new(HttpFeedFetcher::new(
                client.clone(),
                config.http.feed_url.clone(),
                retry,
            )),
            body: Arc::new(HttpBodyFetcher::new(client.clone(), retry)),
            translator: Arc::new(HttpTranslator::new(
                client,
                &config.http.translate_url,
                config.http.translate_api_key.clone(),
                retry,
            )?),
        })
    }
}

/// Article text ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleView {
    pub url: String,
    pub lang: String,
    pub title: String,
    pub body: String,
    pub offline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added,
    Removed,
}

/// Every component of the mirror, built over one data directory.
pub struct Mirror {
    config: MirrorConfig,
    services: Services,
    pub state: Arc<MirrorState>,
    pub memo: Arc<TranslationMemo>,
    pub base: Arc<BaseStore>,
    pub languages: Arc<LanguagePackManager>,
    pub offline: Arc<OfflineStore>,
    pub favorites: Arc<FavoritesRegistry>,
}

impl Mirror {
    /// Loads persisted state from `dir`. With an empty listing a first fetch is
    /// attempted; its failure is logged and the mirror opens empty.
    pub async fn open(dir: impl AsRef<Path>, config: MirrorConfig, services: Services) -> Result<Self> {
        let default_language = config.languages.default_language.clone();
        let state = Arc::new(MirrorState::load(dir, &default_language).await?);
        let memo = Arc::new(TranslationMemo::new(config.cache.memo_capacity));
        let base = Arc::new(BaseStore::new(
            state.clone(),
            services.feed.clone(),
            config.cache.max_base_articles,
        ));
        let languages = Arc::new(
            LanguagePackManager::load(
                state.clone(),
                base.clone(),
                services.translator.clone(),
                memo.clone(),
                config.languages.clone(),
                config.translation.clone(),
            )
            .await?,
        );
        let offline = Arc::new(OfflineStore::new(
            state.paths().clone(),
            services.body.clone(),
            services.translator.clone(),
            memo.clone(),
            config.languages.clone(),
        ));
        let favorites = Arc::new(
            FavoritesRegistry::load(state.paths(), offline.clone(), languages.clone()).await?,
        );

        let mirror = Self {
            config,
            services,
            state,
            memo,
            base,
            languages,
            offline,
            favorites,
        };
        if mirror.base.all().await.is_empty() {
            info!("no cached articles, fetching initial listing");
            if let Err(e) = mirror.base.fetch().await {
                warn!(error = %e, "initial fetch failed");
            }
        }
        Ok(mirror)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn scheduler(&self, events: mpsc::Sender<Event>) -> SyncScheduler {
        SyncScheduler::new(
            self.state.clone(),
            self.base.clone(),
            self.services.translator.clone(),
            self.memo.clone(),
            events,
        )
    }

    pub fn spawn_sync(&self, events: mpsc::Sender<Event>) -> SchedulerHandle {
        self.scheduler(events)
            .spawn(self.config.sync.interval(), self.config.sync.sync_on_start)
    }

    /// One page of the listing for `lang`, zero-based.
    pub async fn page(&self, lang: &str, page: usize) -> Vec<Article> {
        let per_page = self.config.cache.articles_per_page.max(1);
        self.languages
            .display_cache(lang)
            .await
            .iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect()
    }

    async fn base_article(&self, url: &str) -> Option<Article> {
        self.base.all().await.iter().find(|a| a.link == url).cloned()
    }

    /// Favorited articles come from their offline copy; anything else is
    /// fetched and translated on the spot without being stored.
    pub async fn read_article(&self, url: &str, lang: &str) -> Result<ArticleView> {
        if self.favorites.is_favorite(url, lang).await {
            if let Some(record) = self.offline.load(url, lang).await? {
                return Ok(ArticleView {
                    url: record.url,
                    lang: record.lang,
                    title: record.title,
                    body: record.body,
                    offline: true,
                });
            }
            warn!(%url, %lang, "favorite has no offline copy, reading online");
        }

        let default = self.state.default_language();
        let translator = self.services.translator.as_ref();
        let fetched = self.services.body.fetch_body(url).await?;
        let body = if lang == default {
            fetched.body
        } else {
            translator.translate(&fetched.body, lang).await?
        };
        let source_title = self
            .base_article(url)
            .await
            .map(|a| a.title)
            .unwrap_or_default();
        let translated = self
            .memo
            .translate(translator, &source_title, lang, default)
            .await;
        let title = match translated {
            Ok(title) => title,
            Err(e) => {
                warn!(%url, %lang, error = %e, "title left untranslated");
                source_title
            }
        };
        Ok(ArticleView {
            url: url.to_owned(),
            lang: lang.to_owned(),
            title,
            body,
            offline: false,
        })
    }

    /// Saves the article offline for `lang` before marking it favorite.
    pub async fn save_favorite(
        &self,
        url: &str,
        lang: &str,
        on_progress: impl Fn(SaveStage) + Send + Sync,
    ) -> Result<()> {
        let source = self.base_article(url).await;
        self.offline
            .save_with_metadata(url, lang, source.as_ref(), on_progress)
            .await?;
        self.favorites.add(url, lang).await
    }

    pub async fn toggle_favorite(&self, url: &str, lang: &str) -> Result<FavoriteToggle> {
        if self.favorites.remove(url, lang).await? {
            return Ok(FavoriteToggle::Removed);
        }
        self.save_favorite(url, lang, |_| {}).await?;
        Ok(FavoriteToggle::Added)
    }

    /// Flushes shared state; call once before dropping the mirror.
    pub async fn shutdown(&self) -> Result<()> {
        self.state.flush().await?;
        self.base.flush().await?;
        info!("mirror shut down");
        Ok(())
    }
}
