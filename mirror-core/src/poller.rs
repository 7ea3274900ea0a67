use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::base::BaseStore;
use crate::error::{MirrorError, Result};
use crate::feed::Article;
use crate::memo::TranslationMemo;
use crate::services::{Notifier, Translator};
use crate::state::MirrorState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The newest article changed since the last cycle. `title` is already in
    /// `lang`, the language selected when the cycle ran.
    NewArticle {
        article: Article,
        lang: String,
        title: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NewArticle(String),
    Unchanged,
    Empty,
}

/// Periodic refresh of the base listing. At most one cycle runs at a time;
/// a tick that finds one in flight is dropped.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    state: Arc<MirrorState>,
    base: Arc<BaseStore>,
    translator: Arc<dyn Translator>,
    memo: Arc<TranslationMemo>,
    events: mpsc::Sender<Event>,
    in_flight: AtomicBool,
}

struct CycleGuard(Arc<SyncInner>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl SyncScheduler {
    pub fn new(
        state: Arc<MirrorState>,
        base: Arc<BaseStore>,
        translator: Arc<dyn Translator>,
        memo: Arc<TranslationMemo>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                state,
                base,
                translator,
                memo,
                events,
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    fn claim(&self) -> Option<CycleGuard> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(self.inner.clone()))
    }

    /// Starts a cycle in the background unless one is already running.
    pub fn tick(&self) -> Option<JoinHandle<Result<SyncOutcome>>> {
        let Some(guard) = self.claim() else {
            debug!("sync cycle still in flight, skipping tick");
            return None;
        };
        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            run_cycle(&inner).await
        }))
    }

    /// Runs one cycle on the caller's task.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let _guard = self.claim().ok_or_else(|| {
            MirrorError::OperationInProgress("a sync cycle is already running".into())
        })?;
        run_cycle(&self.inner).await
    }

    pub fn spawn(self, interval: Duration, sync_on_start: bool) -> SchedulerHandle {
        let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
        let join = tokio::spawn(async move {
            let start = if sync_on_start {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + interval
            };
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        info!("sync scheduler shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(cycle) = self.tick() {
                            tokio::spawn(async move {
                                match cycle.await {
                                    Ok(Ok(outcome)) => debug!(?outcome, "sync cycle finished"),
                                    Ok(Err(e)) => warn!(error = %e, "sync cycle failed"),
                                    Err(e) => warn!(error = %e, "sync cycle panicked"),
                                }
                            });
                        }
                    }
                }
            }
        });

        SchedulerHandle { cancel_tx, join }
    }
}

async fn run_cycle(inner: &SyncInner) -> Result<SyncOutcome> {
    inner.base.fetch().await?;

    let listing = inner.base.all().await;
    let Some(top) = listing.first() else {
        return Ok(SyncOutcome::Empty);
    };
    let settings = inner.state.settings().await;
    if settings.last_seen_article_id.as_deref() == Some(top.id.as_str()) {
        return Ok(SyncOutcome::Unchanged);
    }

    let lang = settings.current_language;
    let title = match inner
        .memo
        .translate(
            inner.translator.as_ref(),
            &top.title,
            &lang,
            inner.state.default_language(),
        )
        .await
    {
        Ok(title) => title,
        Err(e) => {
            warn!(%lang, error = %e, "notification title left untranslated");
            top.title.clone()
        }
    };

    info!(id = %top.id, %lang, "new article");
    let event = Event::NewArticle {
        article: top.clone(),
        lang,
        title,
    };
    match inner.events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(id = %top.id, "event channel full, notification dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => warn!("event receiver dropped"),
    }

    let id = top.id.clone();
    inner
        .state
        .update_settings(|settings| settings.last_seen_article_id = Some(id.clone()))
        .await?;
    Ok(SyncOutcome::NewArticle(id))
}

pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) -> Result<()> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(MirrorError::from)
    }
}

/// Delivers scheduler events to a notifier until the channel closes.
pub fn spawn_notifier(
    mut events: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::NewArticle { title, .. } => notifier.notify("New article", &title),
            }
        }
        debug!("event channel closed, notifier stopped");
    })
}
