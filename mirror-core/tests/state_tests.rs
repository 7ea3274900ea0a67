mod common;

use common::{article, init_tracing, listing, FeedReply, Fixture, ScriptedFeed};
use mirror_core::{MirrorError, MirrorState};

#[tokio::test]
async fn fresh_directory_gets_default_settings_on_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let state = MirrorState::load(dir.path(), "ar").await.unwrap();

    let settings = state.settings().await;
    assert_eq!(settings.current_language, "ar");
    assert!(settings.downloaded_languages.is_empty());
    assert_eq!(settings.last_seen_article_id, None);
    assert!(dir.path().join("settings.json").exists());
    assert!(state.base().await.is_empty());
}

#[tokio::test]
async fn settings_fall_back_to_tmp_when_main_file_is_corrupted() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("settings.json"), b"{ this is not json ")
        .await
        .unwrap();
    let tmp = r#"{"version":1,"data":{"current_language":"ar","downloaded_languages":[],"last_seen_article_id":"post-9"}}"#;
    tokio::fs::write(dir.path().join("settings.json.tmp"), tmp)
        .await
        .unwrap();

    let state = MirrorState::load(dir.path(), "ar").await.unwrap();
    assert_eq!(
        state.settings().await.last_seen_article_id.as_deref(),
        Some("post-9")
    );
}

#[tokio::test]
async fn unrecoverable_settings_are_an_error_not_a_silent_reset() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let unknown = r#"{"version":1,"data":{"current_language":"ar","downloaded_languages":[],"last_seen_article_id":null,"theme":"dark"}}"#;
    tokio::fs::write(dir.path().join("settings.json"), unknown)
        .await
        .unwrap();

    let err = MirrorState::load(dir.path(), "ar").await.err().unwrap();
    assert!(matches!(err, MirrorError::Corrupt { .. }));
}

#[tokio::test]
async fn failed_initial_fetch_still_opens() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::new(ScriptedFeed::new([FeedReply::Fail]));
    let mirror = fx.open(dir.path()).await;
    assert!(mirror.base.all().await.is_empty());

    fx.feed.push(FeedReply::Articles(listing(4, 4)));
    mirror.base.fetch().await.unwrap();
    assert_eq!(mirror.base.all().await.len(), 4);
}

#[tokio::test]
async fn shutdown_flushes_settings_and_listing() {
    let dir = tempfile::tempdir().unwrap();
    {
        let fx = Fixture::new(ScriptedFeed::new([FeedReply::Articles(listing(3, 3))]));
        let mirror = fx.open(dir.path()).await;
        mirror
            .state
            .update_settings(|s| s.last_seen_article_id = Some("post-3".into()))
            .await
            .unwrap();
        mirror.shutdown().await.unwrap();
    }
    let state = MirrorState::load(dir.path(), "ar").await.unwrap();
    assert_eq!(state.base().await.len(), 3);
    assert_eq!(
        state.settings().await.last_seen_article_id.as_deref(),
        Some("post-3")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_and_fetch_do_not_race_on_the_listing_file() {
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed::new([FeedReply::Articles(listing(3, 3))]);
    let fx = Fixture::new(feed.clone());
    let mirror = fx.open(dir.path()).await;

    for n in 4..104 {
        feed.push(FeedReply::Articles(vec![article(n)]));
        let (fetched, flushed) = tokio::join!(mirror.base.fetch(), mirror.shutdown());
        fetched.unwrap();
        flushed.unwrap();
    }

    let reopened = MirrorState::load(dir.path(), "ar").await.unwrap();
    let on_disk = reopened.base().await;
    assert_eq!(on_disk.len(), 103);
    assert_eq!(on_disk[0].id, "post-103");
    assert_eq!(*on_disk, *mirror.base.all().await);
    assert!(!dir.path().join("base_cache.json.tmp").exists());
}
