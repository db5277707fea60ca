// ── Reconciliation engine ──
//
// Owns the canonical bug collection. Local intents (save, delete, fetch),
// push events, and drains all funnel into `commit`, which applies one
// `Mutation` at a time and publishes a fresh `EngineState`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bugsync_api::{BugClient, LiveChannel, LiveEvent, LiveEventKind};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{self, BugCache};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::live::live_task;
use crate::locks::{IdGuard, IdLocks};
use crate::model::{Bug, BugId, SyncStatus};
use crate::remote::BugRemote;
use crate::store::{Core, EngineState, Mutation};
use crate::stream::EngineStream;
use crate::sync::{SyncScheduler, connectivity_task};

// ── Outcomes ─────────────────────────────────────────────────────────

/// How a save ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The server accepted it; carries the server copy.
    Synced(Bug),
    /// The server was unreachable; the edit is kept locally for the next drain.
    Pending(Bug),
}

impl SaveOutcome {
    pub fn bug(&self) -> &Bug {
        match self {
            Self::Synced(bug) | Self::Pending(bug) => bug,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// How a delete ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Gone from the server (or never reached it) and from the cache.
    Removed,
    /// Tombstoned locally; the next drain retries the remote delete.
    Pending,
}

/// Where the collection came from after a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fresh server listing merged with local pending changes.
    Remote,
    /// The server was unreachable; rebuilt from the durable cache.
    Cached,
}

// ── SyncEngine ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Construct once per session,
/// call [`start()`](Self::start), and [`shutdown()`](Self::shutdown) when
/// done; results of operations still in flight at shutdown are discarded.
pub struct SyncEngine<R: BugRemote> {
    pub(crate) inner: Arc<EngineInner<R>>,
}

impl<R: BugRemote> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct EngineInner<R> {
    pub(crate) config: EngineConfig,
    pub(crate) remote: R,
    pub(crate) cache: Arc<dyn BugCache>,
    core: Mutex<Core>,
    state: watch::Sender<EngineState>,
    pub(crate) locks: IdLocks,
    pub(crate) scheduler: SyncScheduler,
    pub(crate) connected: watch::Sender<bool>,
    pub(crate) cancel: CancellationToken,
    started: AtomicBool,
    live: Mutex<Option<LiveChannel>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine<BugClient> {
    /// Build an engine talking to the real server.
    ///
    /// The credential comes from the config, else from the cache.
    pub fn with_client(config: EngineConfig, cache: Arc<dyn BugCache>) -> Result<Self, CoreError> {
        let token = resolve_credential(&config, cache.as_ref())?.ok_or_else(|| CoreError::Config {
            message: "no credential configured; run `bugsync login` first".into(),
        })?;
        let client = BugClient::new(config.server_url.as_str(), &token, &config.transport())?;
        Ok(Self::new(config, client, cache))
    }
}

impl<R: BugRemote> SyncEngine<R> {
    /// Create an engine. Does NOT load anything or spawn tasks;
    /// call [`start()`](Self::start) for that.
    pub fn new(config: EngineConfig, remote: R, cache: Arc<dyn BugCache>) -> Self {
        let (state, _) = watch::channel(EngineState::default());
        let (connected, _) = watch::channel(false);

        Self {
            inner: Arc::new(EngineInner {
                config,
                remote,
                cache,
                core: Mutex::new(Core::new()),
                state,
                locks: IdLocks::new(),
                scheduler: SyncScheduler::new(),
                connected,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                live: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<dyn BugCache> {
        &self.inner.cache
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load the cache, open the live channel, and start the connectivity
    /// watcher. Calling it twice is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("engine already started");
            return Ok(());
        }

        self.commit(Mutation::CacheLoaded).await?;

        let mut handles = self.inner.task_handles.lock().await;

        let engine = self.clone();
        let rx = self.inner.connected.subscribe();
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(connectivity_task(engine, rx, cancel)));

        match (&self.inner.config.live_url, self.credential()?) {
            (Some(url), Some(token)) => {
                let channel = LiveChannel::connect(
                    url.clone(),
                    token,
                    self.inner.config.live.clone(),
                    self.inner.cancel.child_token(),
                );
                let events = channel.subscribe();
                let engine = self.clone();
                let cancel = self.inner.cancel.clone();
                handles.push(tokio::spawn(live_task(engine, events, cancel)));
                *self.inner.live.lock().await = Some(channel);
                debug!(url = %url, "live updates enabled");
            }
            (Some(_), None) => debug!("no credential, live updates disabled"),
            (None, _) => debug!("no live endpoint configured"),
        }

        info!(
            entities = self.state().entities.len(),
            "engine started"
        );
        Ok(())
    }

    /// Cancel every background task and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(channel) = self.inner.live.lock().await.take() {
            channel.join().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("engine shut down");
    }

    /// `true` once [`shutdown()`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Connectivity ─────────────────────────────────────────────────

    /// Report connectivity. An offline → online transition triggers a drain.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Load every bug from the server, falling back to the cache.
    ///
    /// A remote failure is not an error here: the collection is rebuilt
    /// from the cache and `fetch_error` is set.
    pub async fn fetch_all(&self) -> Result<FetchOutcome, CoreError> {
        self.commit(Mutation::FetchStarted).await?;

        match self.inner.remote.list().await {
            Ok(bugs) => {
                debug!(count = bugs.len(), "fetched bugs");
                self.commit(Mutation::FetchSucceeded { bugs }).await?;
                Ok(FetchOutcome::Remote)
            }
            Err(error) => {
                warn!(error = %error, "fetch failed, using cached bugs");
                self.commit(Mutation::FetchFailed { error }).await?;
                Ok(FetchOutcome::Cached)
            }
        }
    }

    /// Create or update `bug`.
    ///
    /// Fails only when `connected` is false. A remote failure keeps the
    /// edit as a pending record and returns [`SaveOutcome::Pending`].
    pub async fn save(&self, bug: Bug, connected: bool) -> Result<SaveOutcome, CoreError> {
        if !connected {
            return Err(CoreError::Connectivity { operation: "save" });
        }

        let (mut bug, _guards) = self.lock_for(bug).await;
        self.commit(Mutation::SaveStarted).await?;

        let creating = bug.id.as_ref().is_none_or(BugId::is_local);
        let outgoing = Bug {
            id: if creating { None } else { bug.id.clone() },
            status: SyncStatus::Synced,
            ..bug.clone()
        };
        let result = if creating {
            self.inner.remote.create(&outgoing).await
        } else {
            self.inner.remote.update(&outgoing).await
        };

        let result = result.and_then(|saved| with_server_id(saved, &outgoing));
        match result {
            Ok(saved) => {
                let replaces = bug.id.clone().filter(BugId::is_local);
                debug!(id = ?saved.id, created = creating, "bug saved");
                self.commit(Mutation::SaveSucceeded {
                    bug: saved.clone(),
                    replaces,
                })
                .await?;
                Ok(SaveOutcome::Synced(saved))
            }
            Err(error) => {
                let id = bug.id.get_or_insert_with(BugId::new_local).clone();
                bug.status = if creating {
                    SyncStatus::PendingCreate
                } else {
                    SyncStatus::PendingUpdate
                };
                warn!(id = %id, status = ?bug.status, error = %error, "save queued for sync");
                self.commit(Mutation::SaveQueued {
                    bug: bug.clone(),
                    error,
                })
                .await?;
                Ok(SaveOutcome::Pending(bug))
            }
        }
    }

    /// Delete `bug`.
    ///
    /// Fails when `connected` is false or the bug has no identifier. A
    /// remote failure tombstones the bug and returns
    /// [`DeleteOutcome::Pending`]; a 404 counts as deleted.
    pub async fn delete(&self, bug: &Bug, connected: bool) -> Result<DeleteOutcome, CoreError> {
        if !connected {
            return Err(CoreError::Connectivity { operation: "delete" });
        }
        if bug.id.is_none() {
            return Err(CoreError::InvalidEntity {
                message: "cannot delete a bug that was never saved".into(),
            });
        }

        let (bug, _guards) = self.lock_for(bug.clone()).await;
        let Some(id) = bug.id.clone() else {
            return Err(CoreError::Internal("identifier lost while locking".into()));
        };
        self.commit(Mutation::DeleteStarted).await?;

        if id.is_local() {
            debug!(id = %id, "deleting bug that never reached the server");
            self.commit(Mutation::DeleteSucceeded { id }).await?;
            return Ok(DeleteOutcome::Removed);
        }

        match self.inner.remote.delete(&bug).await {
            Ok(()) => {
                debug!(id = %id, "bug deleted");
                self.commit(Mutation::DeleteSucceeded { id }).await?;
                Ok(DeleteOutcome::Removed)
            }
            Err(error) if error.is_not_found() => {
                debug!(id = %id, "bug already gone on server");
                self.commit(Mutation::DeleteSucceeded { id }).await?;
                Ok(DeleteOutcome::Removed)
            }
            Err(error) => {
                warn!(id = %id, error = %error, "delete queued for sync");
                let tombstone = bug.with_status(SyncStatus::PendingDelete);
                self.commit(Mutation::DeleteQueued {
                    bug: tombstone,
                    error,
                })
                .await?;
                Ok(DeleteOutcome::Pending)
            }
        }
    }

    /// Apply a push event. Returns `true` if it changed the collection.
    ///
    /// `created` and `updated` upsert by identifier; every other kind is
    /// ignored. Applying the same event twice leaves the same state.
    pub async fn apply(&self, event: &LiveEvent) -> Result<bool, CoreError> {
        match event.kind {
            LiveEventKind::Created | LiveEventKind::Updated => {}
            LiveEventKind::Deleted | LiveEventKind::Other(_) => {
                debug!(kind = ?event.kind, "ignoring push event");
                return Ok(false);
            }
        }

        let bug = Bug::from(event.bug.clone()).with_status(SyncStatus::Synced);
        if bug.id.is_none() {
            debug!("ignoring push event without identifier");
            return Ok(false);
        }
        self.commit(Mutation::Pushed { bug }).await?;
        Ok(true)
    }

    // ── State observation ────────────────────────────────────────────

    /// The latest committed state.
    pub fn state(&self) -> EngineState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> EngineStream {
        EngineStream::new(self.inner.state.subscribe())
    }

    /// Bugs to display (tombstones hidden).
    pub fn visible(&self) -> Vec<Arc<Bug>> {
        self.state().visible()
    }

    /// Bugs with an unconfirmed local change.
    pub fn pending(&self) -> Vec<Arc<Bug>> {
        self.state().pending()
    }

    pub fn get(&self, id: &BugId) -> Option<Arc<Bug>> {
        self.state().get(id)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Apply one mutation under the core lock and publish the result.
    ///
    /// After shutdown nothing is written and `Cancelled` is returned.
    pub(crate) async fn commit(&self, mutation: Mutation) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            debug!(?mutation, "discarding mutation after shutdown");
            return Err(CoreError::Cancelled);
        }

        let mut core = self.inner.core.lock().await;
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        core.apply(mutation, self.inner.cache.as_ref());
        self.inner.state.send_replace(core.state());
        Ok(())
    }

    /// Take the per-id lock for `bug`, following a placeholder to the
    /// server id it resolved to while we waited.
    async fn lock_for(&self, mut bug: Bug) -> (Bug, Vec<IdGuard<'_>>) {
        let mut guards = Vec::new();
        let Some(id) = bug.id.clone() else {
            return (bug, guards);
        };
        guards.push(self.inner.locks.lock(&id).await);

        if id.is_local() {
            let alias = self.inner.core.lock().await.alias_of(&id).cloned();
            if let Some(remote_id) = alias {
                debug!(old = %id, new = %remote_id, "placeholder already resolved");
                guards.push(self.inner.locks.lock(&remote_id).await);
                bug.id = Some(remote_id);
            }
        }
        (bug, guards)
    }

    /// Credential from the config, else from the cache.
    pub fn credential(&self) -> Result<Option<SecretString>, CoreError> {
        resolve_credential(&self.inner.config, self.inner.cache.as_ref())
    }
}

/// Credential from the config, else the one stored under the reserved key.
pub fn resolve_credential(
    config: &EngineConfig,
    cache: &dyn BugCache,
) -> Result<Option<SecretString>, CoreError> {
    if let Some(token) = &config.credential {
        return Ok(Some(token.clone()));
    }
    cache::load_credential(cache)
}

/// The server copy, falling back to the id we sent when the response
/// omits it. A create response without an id is a failure.
pub(crate) fn with_server_id(saved: Bug, sent: &Bug) -> Result<Bug, CoreError> {
    let saved = saved.with_status(SyncStatus::Synced);
    match (&saved.id, &sent.id) {
        (Some(_), _) => Ok(saved),
        (None, Some(id)) => Ok(saved.with_id(id.clone())),
        (None, None) => Err(CoreError::Internal(
            "server did not assign an identifier".into(),
        )),
    }
}
