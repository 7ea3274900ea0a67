#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mirror_core::{
    Article, BodyFetcher, FeedFetcher, FetchedBody, Mirror, MirrorConfig, MirrorError, Notifier,
    Result, Services, Translator,
};

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn article(n: usize) -> Article {
    Article::new(
        format!("post-{n}"),
        format!("Title {n}"),
        format!("Snippet {n}"),
        format!("https://blog.example.com/post-{n}.html"),
    )
}

/// `count` articles ending at `newest`, newest first.
pub fn listing(newest: usize, count: usize) -> Vec<Article> {
    (0..count).map(|i| article(newest - i)).collect()
}

pub fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.languages.default_language = "ar".into();
    config.languages.supported = vec!["fr".into(), "de".into(), "es".into()];
    config.translation.max_consecutive_failures = 3;
    config
}

pub enum FeedReply {
    Articles(Vec<Article>),
    Fail,
}

/// Replays queued replies; an empty queue answers with an empty listing.
#[derive(Default)]
pub struct ScriptedFeed {
    replies: Mutex<VecDeque<FeedReply>>,
    pub calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFeed {
    pub fn new(replies: impl IntoIterator<Item = FeedReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn slow(replies: impl IntoIterator<Item = FeedReply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn push(&self, reply: FeedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFeed {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(FeedReply::Articles(articles)) => Ok(articles),
            Some(FeedReply::Fail) => Err(MirrorError::Network("connection reset".into())),
            None => Ok(Vec::new()),
        }
    }
}

/// Prefixes text with `[lang]`. Can be switched off entirely or made to fail
/// on specific inputs.
#[derive(Default)]
pub struct FakeTranslator {
    pub calls: AtomicUsize,
    pub down: AtomicBool,
    down_after: Mutex<Option<usize>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl FakeTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_owned());
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Answers the next `calls` requests, then behaves as if unreachable.
    pub fn go_down_after(&self, calls: usize) {
        *self.down_after.lock().unwrap() = Some(self.calls() + calls);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let exhausted = self.down_after.lock().unwrap().is_some_and(|limit| call >= limit);
        if exhausted || self.down.load(Ordering::SeqCst) {
            return Err(MirrorError::Network("translator unreachable".into()));
        }
        if self.failing.lock().unwrap().contains(text) {
            return Err(MirrorError::TranslationService("quota exceeded".into()));
        }
        Ok(format!("[{target_lang}] {text}"))
    }
}

/// Serves `Body of <url>` unless the URL was marked unreachable.
#[derive(Default)]
pub struct FakeBodies {
    unreachable: Mutex<HashSet<String>>,
    images: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeBodies {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().insert(url.to_owned());
    }

    pub fn reachable(&self, url: &str) {
        self.unreachable.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BodyFetcher for FakeBodies {
    async fn fetch_body(&self, url: &str) -> Result<FetchedBody> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().unwrap().contains(url) {
            return Err(MirrorError::Network(format!("timed out fetching {url}")));
        }
        Ok(FetchedBody {
            body: format!("Body of {url}"),
            image_url: self.images.lock().unwrap().get(url).cloned(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_owned(), body.to_owned()));
    }
}

pub struct Fixture {
    pub feed: Arc<ScriptedFeed>,
    pub translator: Arc<FakeTranslator>,
    pub bodies: Arc<FakeBodies>,
}

impl Fixture {
    pub fn new(feed: Arc<ScriptedFeed>) -> Self {
        Self {
            feed,
            translator: FakeTranslator::new(),
            bodies: FakeBodies::new(),
        }
    }

    pub fn with_translator(feed: Arc<ScriptedFeed>, translator: Arc<FakeTranslator>) -> Self {
        Self {
            feed,
            translator,
            bodies: FakeBodies::new(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            feed: self.feed.clone(),
            body: self.bodies.clone(),
            translator: self.translator.clone(),
        }
    }

    pub async fn open(&self, dir: &Path) -> Mirror {
        self.open_with(dir, test_config()).await
    }

    pub async fn open_with(&self, dir: &Path, config: MirrorConfig) -> Mirror {
        init_tracing();
        Mirror::open(dir, config, self.services())
            .await
            .expect("open mirror")
    }
}
