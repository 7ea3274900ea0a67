use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::feed::Article;
use crate::services::FeedFetcher;
use crate::state::MirrorState;
use crate::storage;

/// Canonical default-language listing, capped at `max_articles`.
pub struct BaseStore {
    state: Arc<MirrorState>,
    fetcher: Arc<dyn FeedFetcher>,
    max_articles: usize,
    fetch_lock: Mutex<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub added: usize,
    pub total: usize,
}

impl BaseStore {
    pub fn new(state: Arc<MirrorState>, fetcher: Arc<dyn FeedFetcher>, max_articles: usize) -> Self {
        Self {
            state,
            fetcher,
            max_articles: max_articles.max(1),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Re-reads the persisted listing; an absent file yields an empty one.
    pub async fn load(&self) -> Result<Arc<Vec<Article>>> {
        let _guard = self.fetch_lock.lock().await;
        let path = self.state.paths().base_cache();
        let articles: Vec<Article> = storage::read_record(&path).await?.unwrap_or_default();
        self.state.set_base(articles).await;
        Ok(self.state.base().await)
    }

    /// Pulls the latest listing and merges it in front of the current one.
    /// On any failure the previous listing stays as it was.
    pub async fn fetch(&self) -> Result<FetchSummary> {
        let _guard = self.fetch_lock.lock().await;
        let fetched = match self.fetcher.fetch_latest().await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(error = %e, "feed fetch failed, keeping cached listing");
                return Err(e);
            }
        };

        let current = self.state.base().await;
        let (merged, added) = merge_newest_first(&current, fetched, self.max_articles);
        let total = merged.len();
        self.state.replace_base(merged).await?;
        info!(added, total, "base listing refreshed");
        Ok(FetchSummary { added, total })
    }

    /// Rewrites the listing file, serialized with [`fetch`](Self::fetch).
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.fetch_lock.lock().await;
        let articles = self.state.base().await;
        storage::write_record(&self.state.paths().base_cache(), &*articles).await?;
        debug!(total = articles.len(), "base listing flushed");
        Ok(())
    }

    pub async fn all(&self) -> Arc<Vec<Article>> {
        self.state.base().await
    }
}

/// Puts unseen fetched articles, in feed order, ahead of `current` and caps the
/// result at `cap`. Duplicates within the fetched batch are dropped too.
pub fn merge_newest_first(
    current: &[Article],
    fetched: Vec<Article>,
    cap: usize,
) -> (Vec<Article>, usize) {
    let mut seen: HashSet<String> = current.iter().map(|a| a.id.clone()).collect();
    let mut merged: Vec<Article> = fetched
        .into_iter()
        .filter(|article| seen.insert(article.id.clone()))
        .collect();
    let added = merged.len();
    merged.extend(current.iter().cloned());
    merged.truncate(cap);
    (merged, added.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str) -> Article {
        Article::new(id, format!("title {id}"), "", format!("https://e/{id}"))
    }

    fn ids(list: &[Article]) -> Vec<&str> {
        list.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn new_items_go_in_front_in_feed_order() {
        let current = vec![article("3"), article("2")];
        let (merged, added) =
            merge_newest_first(&current, vec![article("5"), article("4"), article("3")], 10);
        assert_eq!(ids(&merged), ["5", "4", "3", "2"]);
        assert_eq!(added, 2);
    }

    #[test]
    fn cap_drops_the_oldest() {
        let current = vec![article("2"), article("1")];
        let (merged, _) = merge_newest_first(&current, vec![article("4"), article("3")], 3);
        assert_eq!(ids(&merged), ["4", "3", "2"]);
    }

    #[test]
    fn duplicates_inside_a_batch_are_ignored() {
        let (merged, added) =
            merge_newest_first(&[], vec![article("1"), article("1"), article("0")], 10);
        assert_eq!(ids(&merged), ["1", "0"]);
        assert_eq!(added, 2);
    }
}
