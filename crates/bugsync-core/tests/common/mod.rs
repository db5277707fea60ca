// Shared fixtures for engine scenario tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bugsync_core::{Bug, BugCache, BugId, BugRemote, CoreError, EngineConfig, SyncEngine, SyncStatus};

// ── Fake remote ──────────────────────────────────────────────────────

/// In-process stand-in for the REST server.
///
/// Cloning shares state, so a test can keep a handle after handing one
/// to the engine.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    bugs: Mutex<Vec<Bug>>,
    offline: AtomicBool,
    next_id: AtomicU64,
    failing_titles: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

fn refused() -> CoreError {
    CoreError::Network {
        message: "connection refused".into(),
        status: None,
        transient: true,
    }
}

fn not_found(id: &str) -> CoreError {
    CoreError::Network {
        message: format!("no bug {id}"),
        status: Some(404),
        transient: false,
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.inner.next_id.store(1, Ordering::SeqCst);
        remote
    }

    /// Ids assigned by `create` start at `first`.
    pub fn with_next_id(self, first: u64) -> Self {
        self.inner.next_id.store(first, Ordering::SeqCst);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject any call carrying a bug with this title.
    pub fn fail_title(&self, title: &str) {
        self.inner.failing_titles.lock().unwrap().insert(title.to_owned());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap() = Some(delay);
    }

    /// Seed the server without going through the engine.
    pub fn seed(&self, bug: Bug) {
        self.inner.bugs.lock().unwrap().push(bug);
    }

    /// Delete on the server without going through the engine.
    pub fn forget(&self, id: &str) {
        let id = Some(BugId::from(id));
        self.inner.bugs.lock().unwrap().retain(|b| b.id != id);
    }

    pub fn bugs(&self) -> Vec<Bug> {
        self.inner.bugs.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: String, title: Option<&str>) -> Result<(), CoreError> {
        let delay = *self.inner.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.calls.lock().unwrap().push(call);
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(refused());
        }
        if let Some(title) = title {
            if self.inner.failing_titles.lock().unwrap().contains(title) {
                return Err(CoreError::Network {
                    message: "server error".into(),
                    status: Some(500),
                    transient: true,
                });
            }
        }
        Ok(())
    }
}

impl BugRemote for FakeRemote {
    async fn list(&self) -> Result<Vec<Bug>, CoreError> {
        self.enter("list".into(), None).await?;
        Ok(self.bugs())
    }

    async fn create(&self, bug: &Bug) -> Result<Bug, CoreError> {
        self.enter(format!("create:{}", bug.title), Some(&bug.title)).await?;
        assert!(bug.id.is_none(), "create must not send an identifier");
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let created = bug.clone().with_id(id.to_string());
        self.inner.bugs.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update(&self, bug: &Bug) -> Result<Bug, CoreError> {
        let id = bug.id.as_ref().unwrap().to_string();
        self.enter(format!("update:{id}"), Some(&bug.title)).await?;
        let mut bugs = self.inner.bugs.lock().unwrap();
        let slot = bugs
            .iter_mut()
            .find(|b| b.id == bug.id)
            .ok_or_else(|| not_found(&id))?;
        *slot = bug.clone();
        Ok(bug.clone())
    }

    async fn delete(&self, bug: &Bug) -> Result<(), CoreError> {
        let id = bug.id.as_ref().unwrap().to_string();
        self.enter(format!("delete:{id}"), Some(&bug.title)).await?;
        let mut bugs = self.inner.bugs.lock().unwrap();
        let before = bugs.len();
        bugs.retain(|b| b.id != bug.id);
        if bugs.len() == before {
            return Err(not_found(&id));
        }
        Ok(())
    }
}

// ── Engine fixtures ──────────────────────────────────────────────────

pub fn config() -> EngineConfig {
    EngineConfig::new("http://bugs.test".parse().unwrap())
}

pub fn engine(remote: &FakeRemote, cache: Arc<dyn BugCache>) -> SyncEngine<FakeRemote> {
    SyncEngine::new(config(), remote.clone(), cache)
}

/// Every cache record as a bug, keyed by its cache key. The reserved
/// credential key is excluded.
pub fn cached(cache: &dyn BugCache) -> Vec<(String, Bug)> {
    let mut keys = cache.list_keys().unwrap();
    keys.retain(|k| k != bugsync_core::CREDENTIAL_KEY);
    keys.sort();
    keys.into_iter()
        .map(|k| {
            let raw = cache.get(&k).unwrap().unwrap();
            (k, serde_json::from_str(&raw).unwrap())
        })
        .collect()
}

/// Pending entities in the collection are exactly the pending cache records.
pub fn assert_pending_mirrors_cache<R: BugRemote>(engine: &SyncEngine<R>, cache: &dyn BugCache) {
    let in_memory: BTreeSet<String> = engine
        .pending()
        .iter()
        .map(|b| b.id.as_ref().unwrap().to_string())
        .collect();
    let on_disk: BTreeSet<String> = cached(cache)
        .into_iter()
        .filter(|(_, b)| b.status != SyncStatus::Synced)
        .map(|(k, _)| k)
        .collect();
    assert_eq!(in_memory, on_disk, "pending entities and pending cache records diverge");
}

/// Identifiers in collection order.
pub fn ids<R: BugRemote>(engine: &SyncEngine<R>) -> Vec<BugId> {
    engine
        .state()
        .entities
        .iter()
        .map(|b| b.id.clone().unwrap())
        .collect()
}

/// Poll until `check` holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
