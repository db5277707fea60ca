#![allow(clippy::unwrap_used)]
// Reconciliation engine scenarios: save, delete, fetch, push apply.

mod common;

use std::sync::Arc;

use bugsync_api::BugDto;
use bugsync_core::{
    Bug, BugCache, BugId, CoreError, DeleteOutcome, FetchOutcome, LiveEvent, LiveEventKind,
    MemoryCache, SaveOutcome, SyncStatus,
};
use pretty_assertions::assert_eq;
use secrecy::SecretString;

use common::{FakeRemote, assert_pending_mirrors_cache, cached, engine, ids};

fn push(kind: LiveEventKind, id: &str, title: &str) -> LiveEvent {
    LiveEvent {
        kind,
        bug: BugDto {
            id: Some(id.into()),
            title: title.into(),
            ..BugDto::default()
        },
    }
}

// ── save ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn online_save_creates_and_caches_synced_copy() {
    let remote = FakeRemote::new().with_next_id(42);
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());

    let outcome = engine.save(Bug::new("A", "desc", 1), true).await.unwrap();

    let SaveOutcome::Synced(saved) = outcome else {
        panic!("expected a synced save, got {outcome:?}");
    };
    assert_eq!(saved.id, Some(BugId::from("42")));
    assert_eq!(ids(&engine), vec![BugId::from("42")]);
    assert_eq!(cached(cache.as_ref())[0].1.status, SyncStatus::Synced);
    assert!(engine.state().saving_error.is_none());
    assert!(!engine.state().saving);
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

#[tokio::test]
async fn offline_save_is_rejected_without_touching_state() {
    let remote = FakeRemote::new();
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());

    let err = engine.save(Bug::new("A", "", 1), false).await.unwrap_err();

    assert!(matches!(err, CoreError::Connectivity { operation: "save" }));
    assert!(engine.state().entities.is_empty());
    assert!(cache.is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn failed_create_becomes_pending_with_placeholder_id() {
    let remote = FakeRemote::new();
    remote.set_offline(true);
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());

    let outcome = engine
        .save(Bug::new("A", "", 1), true)
        .await
        .unwrap();

    let SaveOutcome::Pending(pending) = outcome else {
        panic!("expected a pending save");
    };
    assert_eq!(pending.status, SyncStatus::PendingCreate);
    assert!(pending.id.as_ref().unwrap().is_local());

    let state = engine.state();
    assert_eq!(state.entities.len(), 1);
    assert!(state.saving_error.is_some());
    assert_eq!(cached(cache.as_ref()).len(), 1);
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

#[tokio::test]
async fn failed_update_keeps_position_and_marks_pending() {
    let remote = FakeRemote::new();
    remote.seed(Bug::new("first", "", 1).with_id("1"));
    remote.seed(Bug::new("second", "", 1).with_id("2"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();

    remote.set_offline(true);
    let edited = Bug::new("first, edited", "", 5).with_id("1");
    let outcome = engine.save(edited, true).await.unwrap();

    assert_eq!(outcome.bug().status, SyncStatus::PendingUpdate);
    assert_eq!(ids(&engine), vec![BugId::from("1"), BugId::from("2")]);
    assert_eq!(
        engine.get(&BugId::from("1")).unwrap().title,
        "first, edited"
    );
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

#[tokio::test]
async fn saving_a_new_bug_inserts_at_the_head() {
    let remote = FakeRemote::new().with_next_id(10);
    remote.seed(Bug::new("old", "", 1).with_id("1"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache);
    engine.fetch_all().await.unwrap();

    engine.save(Bug::new("new", "", 1), true).await.unwrap();

    assert_eq!(ids(&engine), vec![BugId::from("10"), BugId::from("1")]);
}

// ── delete ───────────────────────────────────────────────────────────

#[tokio::test]
async fn offline_delete_fails_and_changes_nothing() {
    let remote = FakeRemote::new();
    remote.seed(Bug::new("A", "", 1).with_id("1"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();
    let before_state = engine.state().entities;
    let before_cache = cached(cache.as_ref());

    let target = engine.get(&BugId::from("1")).unwrap();
    let err = engine.delete(&target, false).await.unwrap_err();

    assert!(matches!(err, CoreError::Connectivity { .. }));
    assert_eq!(engine.state().entities, before_state);
    assert_eq!(cached(cache.as_ref()), before_cache);
    assert_eq!(remote.bugs().len(), 1);
}

#[tokio::test]
async fn online_delete_purges_collection_and_cache() {
    let remote = FakeRemote::new();
    remote.seed(Bug::new("A", "", 1).with_id("1"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();

    let target = engine.get(&BugId::from("1")).unwrap();
    let outcome = engine.delete(&target, true).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Removed);
    assert!(engine.state().entities.is_empty());
    assert!(cache.is_empty());
    assert!(remote.bugs().is_empty());
}

#[tokio::test]
async fn failed_delete_tombstones_and_hides() {
    let remote = FakeRemote::new();
    remote.seed(Bug::new("A", "", 1).with_id("1"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();

    remote.set_offline(true);
    let target = engine.get(&BugId::from("1")).unwrap();
    let outcome = engine.delete(&target, true).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Pending);
    let state = engine.state();
    assert_eq!(state.entities.len(), 1);
    assert!(state.visible().is_empty());
    assert!(state.deleting_error.is_some());
    assert_eq!(cached(cache.as_ref())[0].1.status, SyncStatus::PendingDelete);
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

#[tokio::test]
async fn deleting_a_never_synced_bug_stays_local() {
    let remote = FakeRemote::new();
    remote.set_offline(true);
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    let pending = engine.save(Bug::new("A", "", 1), true).await.unwrap();

    let outcome = engine.delete(pending.bug(), true).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Removed);
    assert!(engine.state().entities.is_empty());
    assert!(cache.is_empty());
    assert!(!remote.calls().iter().any(|c| c.starts_with("delete")));
}

#[tokio::test]
async fn delete_of_bug_missing_on_server_counts_as_removed() {
    let remote = FakeRemote::new();
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());

    let ghost = Bug::new("ghost", "", 1).with_id("99");
    let outcome = engine.delete(&ghost, true).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Removed);
    assert!(engine.state().deleting_error.is_none());
}

#[tokio::test]
async fn delete_without_id_is_invalid() {
    let remote = FakeRemote::new();
    let engine = engine(&remote, Arc::new(MemoryCache::new()));
    let err = engine.delete(&Bug::new("A", "", 1), true).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidEntity { .. }));
}

// ── fetch ────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_fetch_falls_back_to_cache_and_skips_credential() {
    let remote = FakeRemote::new();
    remote.set_offline(true);
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("1", serde_json::to_string(&Bug::new("A", "", 1).with_id("1")).unwrap())
        .unwrap();
    cache
        .set(
            "2",
            serde_json::to_string(
                &Bug::new("B", "", 2)
                    .with_id("2")
                    .with_status(SyncStatus::PendingUpdate),
            )
            .unwrap(),
        )
        .unwrap();
    bugsync_core::cache::store_credential(cache.as_ref(), &SecretString::from("t".to_owned()))
        .unwrap();
    let engine = engine(&remote, cache.clone());

    let outcome = engine.fetch_all().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Cached);
    let state = engine.state();
    assert_eq!(state.entities.len(), 2);
    assert!(state.fetch_error.is_some());
    assert!(!state.fetching);
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

#[tokio::test]
async fn failed_fetch_skips_malformed_records() {
    let remote = FakeRemote::new();
    remote.set_offline(true);
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("1", serde_json::to_string(&Bug::new("A", "", 1).with_id("1")).unwrap())
        .unwrap();
    cache.set("broken", "{\"title\": ".into()).unwrap();
    let engine = engine(&remote, cache.clone());

    engine.fetch_all().await.unwrap();

    assert_eq!(ids(&engine), vec![BugId::from("1")]);
    // The malformed record is left for inspection, not deleted.
    assert!(cache.get("broken").unwrap().is_some());
}

#[tokio::test]
async fn successful_fetch_clears_previous_error_and_caches_copies() {
    let remote = FakeRemote::new();
    remote.set_offline(true);
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();
    assert!(engine.state().fetch_error.is_some());

    remote.set_offline(false);
    remote.seed(Bug::new("A", "", 1).with_id("1"));
    let outcome = engine.fetch_all().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Remote);
    let state = engine.state();
    assert!(state.fetch_error.is_none());
    assert!(state.last_fetch.is_some());
    assert_eq!(cached(cache.as_ref()).len(), 1);
}

// ── push ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn applying_the_same_push_twice_is_idempotent() {
    let remote = FakeRemote::new();
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    let event = push(LiveEventKind::Created, "7", "A");

    assert!(engine.apply(&event).await.unwrap());
    let once = engine.state().entities;
    let once_cache = cached(cache.as_ref());
    assert!(engine.apply(&event).await.unwrap());

    assert_eq!(engine.state().entities, once);
    assert_eq!(cached(cache.as_ref()), once_cache);
}

#[tokio::test]
async fn created_then_updated_push_leaves_one_entry() {
    let remote = FakeRemote::new();
    let engine = engine(&remote, Arc::new(MemoryCache::new()));

    engine.apply(&push(LiveEventKind::Created, "7", "A")).await.unwrap();
    engine.apply(&push(LiveEventKind::Updated, "7", "B")).await.unwrap();

    let state = engine.state();
    assert_eq!(state.entities.len(), 1);
    assert_eq!(state.entities[0].id, Some(BugId::from("7")));
    assert_eq!(state.entities[0].title, "B");
}

#[tokio::test]
async fn unknown_push_kinds_are_ignored() {
    let remote = FakeRemote::new();
    let engine = engine(&remote, Arc::new(MemoryCache::new()));

    let applied = engine
        .apply(&push(LiveEventKind::Other("archived".into()), "7", "A"))
        .await
        .unwrap();

    assert!(!applied);
    assert!(engine.state().entities.is_empty());
    assert_eq!(engine.state().version, 0);
}

#[tokio::test]
async fn push_overrides_pending_edit_and_keeps_invariant() {
    let remote = FakeRemote::new();
    remote.seed(Bug::new("A", "", 1).with_id("7"));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.fetch_all().await.unwrap();
    remote.set_offline(true);
    engine
        .save(Bug::new("local edit", "", 1).with_id("7"), true)
        .await
        .unwrap();

    engine
        .apply(&push(LiveEventKind::Updated, "7", "server edit"))
        .await
        .unwrap();

    let bug = engine.get(&BugId::from("7")).unwrap();
    assert_eq!(bug.title, "server edit");
    assert_eq!(bug.status, SyncStatus::Synced);
    assert_pending_mirrors_cache(&engine, cache.as_ref());
}

// ── lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn start_loads_the_cache() {
    let remote = FakeRemote::new();
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("3", serde_json::to_string(&Bug::new("C", "", 1).with_id("3")).unwrap())
        .unwrap();
    let engine = engine(&remote, cache);

    engine.start().await.unwrap();
    assert_eq!(ids(&engine), vec![BugId::from("3")]);
    engine.shutdown().await;
}

#[tokio::test]
async fn operations_after_shutdown_write_nothing() {
    let remote = FakeRemote::new();
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.start().await.unwrap();
    engine.shutdown().await;

    let err = engine.save(Bug::new("late", "", 1), true).await.unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    let err = engine
        .apply(&push(LiveEventKind::Created, "1", "late"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(cache.is_empty());
    assert!(engine.state().entities.is_empty());
}

#[tokio::test]
async fn in_flight_save_is_discarded_after_shutdown() {
    let remote = FakeRemote::new();
    remote.set_delay(std::time::Duration::from_millis(100));
    let cache = Arc::new(MemoryCache::new());
    let engine = engine(&remote, cache.clone());
    engine.start().await.unwrap();

    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.save(Bug::new("A", "", 1), true).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    engine.shutdown().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(engine.state().entities.is_empty());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn subscribers_see_every_commit() {
    let remote = FakeRemote::new();
    let engine = engine(&remote, Arc::new(MemoryCache::new()));
    let mut stream = engine.subscribe();
    assert_eq!(stream.current().version, 0);

    engine.apply(&push(LiveEventKind::Created, "1", "A")).await.unwrap();

    let next = stream.changed().await.unwrap();
    assert_eq!(next.entities.len(), 1);
    assert_eq!(stream.latest().version, next.version);
}

#[tokio::test]
async fn state_stream_starts_with_current_snapshot() {
    use futures_util::StreamExt;

    let remote = FakeRemote::new();
    let engine = engine(&remote, Arc::new(MemoryCache::new()));
    let mut states = engine.subscribe().into_stream();

    let first = states.next().await.unwrap();
    assert!(first.entities.is_empty());

    engine.apply(&push(LiveEventKind::Updated, "7", "B")).await.unwrap();
    let next = states.next().await.unwrap();
    assert_eq!(ids(&engine), vec![BugId::from("7")]);
    assert_eq!(next.entities.len(), 1);
}
