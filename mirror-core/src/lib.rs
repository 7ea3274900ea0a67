pub mod base;
pub mod config;
pub mod error;
pub mod favorites;
pub mod feed;
mod guard;
pub mod http;
pub mod language;
pub mod memo;
pub mod mirror;
pub mod offline;
pub mod poller;
pub mod services;
pub mod state;
pub mod storage;

pub use base::{BaseStore, FetchSummary};
pub use config::MirrorConfig;
pub use error::{MirrorError, Result};
pub use favorites::{FavoriteEntry, FavoriteKey, FavoritesRegistry};
pub use feed::Article;
pub use language::{
    DownloadProgress, LanguagePackManager, LanguageStatus, PackStatus, TRANSLATION_FAILED,
};
pub use memo::{LruCache, TranslationMemo};
pub use mirror::{ArticleView, FavoriteToggle, Mirror, Services};
pub use offline::{OfflineRecord, OfflineStore, SaveStage};
pub use poller::{spawn_notifier, Event, SchedulerHandle, SyncOutcome, SyncScheduler};
pub use services::{BodyFetcher, FeedFetcher, FetchedBody, Notifier, Translator};
pub use state::{MirrorState, Settings};
pub use storage::StoragePaths;
