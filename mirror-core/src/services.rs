//! Contracts of the remote collaborators. The crate ships `reqwest`-backed
//! implementations in [`crate::http`]; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::feed::Article;

/// Source of the latest listing, newest first, with no size guarantee.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Article>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub body: String,
    pub image_url: Option<String>,
}

#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch_body(&self, url: &str) -> Result<FetchedBody>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Fire-and-forget delivery of user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}
