// ── Serialized mutation log ──
//
// Every change to the collection is one `Mutation`, applied by
// `Core::apply` while the engine holds its core lock. The matching cache
// writes are staged while the mutation is reduced and go out as a single
// batch at the end of the same call, so memory and disk move together
// and no two writers interleave their read-modify-write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::collection::BugCollection;
use super::state::EngineState;
use crate::cache::{self, BugCache, CacheOp};
use crate::error::CoreError;
use crate::model::{Bug, BugId, SyncStatus};

/// One committed change. Bugs carried here always have an identifier.
#[derive(Debug)]
pub(crate) enum Mutation {
    /// Rebuild the collection from the durable cache (engine start).
    CacheLoaded,

    FetchStarted,
    FetchSucceeded { bugs: Vec<Bug> },
    FetchFailed { error: CoreError },

    SaveStarted,
    /// The server accepted the save. `replaces` is the placeholder id the
    /// bug carried before the server assigned one.
    SaveSucceeded { bug: Bug, replaces: Option<BugId> },
    /// The server was unreachable; keep the edit as a pending record.
    SaveQueued { bug: Bug, error: CoreError },

    DeleteStarted,
    DeleteSucceeded { id: BugId },
    /// The server was unreachable; keep a tombstone.
    DeleteQueued { bug: Bug, error: CoreError },

    /// A push event from the live channel.
    Pushed { bug: Bug },

    DrainStarted,
    /// A pending create or update reached the server.
    Resolved { bug: Bug, replaces: Option<BugId> },
    /// A pending delete reached the server.
    Purged { id: BugId },
    DrainFinished {
        failed: usize,
        error: Option<CoreError>,
    },
}

/// Mutable engine state guarded by the core lock.
///
/// Busy flags are counters so overlapping operations of one class do not
/// clear each other's flag.
#[derive(Debug, Default)]
pub(crate) struct Core {
    collection: BugCollection,
    /// Placeholder id → server id, for every create that has resolved.
    aliases: HashMap<BugId, BugId>,

    fetching: usize,
    saving: usize,
    deleting: usize,
    syncing: usize,

    fetch_error: Option<Arc<CoreError>>,
    saving_error: Option<Arc<CoreError>>,
    deleting_error: Option<Arc<CoreError>>,
    sync_error: Option<Arc<CoreError>>,

    last_fetch: Option<DateTime<Utc>>,
    version: u64,
}

impl Core {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The server id a placeholder resolved to, if it has.
    pub(crate) fn alias_of(&self, id: &BugId) -> Option<&BugId> {
        self.aliases.get(id)
    }

    pub(crate) fn get(&self, id: &BugId) -> Option<Arc<Bug>> {
        self.collection.get(id).cloned()
    }

    pub(crate) fn state(&self) -> EngineState {
        EngineState {
            entities: self.collection.snapshot(),
            fetching: self.fetching > 0,
            fetch_error: self.fetch_error.clone(),
            saving: self.saving > 0,
            saving_error: self.saving_error.clone(),
            deleting: self.deleting > 0,
            deleting_error: self.deleting_error.clone(),
            syncing: self.syncing > 0,
            sync_error: self.sync_error.clone(),
            last_fetch: self.last_fetch,
            version: self.version,
        }
    }

    /// Apply one mutation and its cache writes.
    ///
    /// Storage failures never abort the mutation: the in-memory change
    /// stands and the failure lands in the operation's error slot.
    pub(crate) fn apply(&mut self, mutation: Mutation, cache: &dyn BugCache) {
        self.version += 1;

        let slot = ErrorSlot::of(&mutation);
        let mut writes = Vec::new();
        self.reduce(mutation, cache, &mut writes);
        if writes.is_empty() {
            return;
        }

        let count = writes.len();
        if let Err(e) = cache.apply_batch(writes) {
            warn!(error = %e, writes = count, "cache write failed");
            let e = Some(Arc::new(e));
            match slot {
                ErrorSlot::Fetch => self.fetch_error = e,
                ErrorSlot::Save => self.saving_error = e,
                ErrorSlot::Delete => self.deleting_error = e,
                ErrorSlot::Sync => self.sync_error = e,
                ErrorSlot::LogOnly => {}
            }
        }
    }

    /// Update memory for one mutation, staging its cache writes in `writes`.
    fn reduce(&mut self, mutation: Mutation, cache: &dyn BugCache, writes: &mut Vec<CacheOp>) {
        match mutation {
            Mutation::CacheLoaded => {
                if let Err(e) = self.rebuild_from_cache(cache) {
                    warn!(error = %e, "could not load cache");
                    self.fetch_error = Some(Arc::new(e));
                }
            }

            // ── Fetch ────────────────────────────────────────────────
            Mutation::FetchStarted => {
                self.fetching += 1;
                self.fetch_error = None;
            }
            Mutation::FetchSucceeded { bugs } => {
                self.fetching = self.fetching.saturating_sub(1);
                let storage = self.merge_remote(bugs, cache, writes);
                self.last_fetch = Some(Utc::now());
                self.fetch_error = storage.map(Arc::new);
            }
            Mutation::FetchFailed { error } => {
                self.fetching = self.fetching.saturating_sub(1);
                if let Err(e) = self.rebuild_from_cache(cache) {
                    warn!(error = %e, "cache fallback failed, keeping current collection");
                }
                self.fetch_error = Some(Arc::new(error));
            }

            // ── Save ─────────────────────────────────────────────────
            Mutation::SaveStarted => {
                self.saving += 1;
                self.saving_error = None;
            }
            Mutation::SaveSucceeded { bug, replaces } => {
                self.saving = self.saving.saturating_sub(1);
                let storage = self.settle(bug, replaces, writes);
                self.saving_error = storage.map(Arc::new);
            }
            Mutation::SaveQueued { bug, error } => {
                self.saving = self.saving.saturating_sub(1);
                let storage = self.keep_pending(bug, writes);
                self.saving_error = Some(Arc::new(storage.unwrap_or(error)));
            }

            // ── Delete ───────────────────────────────────────────────
            Mutation::DeleteStarted => {
                self.deleting += 1;
                self.deleting_error = None;
            }
            Mutation::DeleteSucceeded { id } => {
                self.deleting = self.deleting.saturating_sub(1);
                self.purge(&id, writes);
            }
            Mutation::DeleteQueued { bug, error } => {
                self.deleting = self.deleting.saturating_sub(1);
                let storage = self.keep_pending(bug, writes);
                self.deleting_error = Some(Arc::new(storage.unwrap_or(error)));
            }

            // ── Push ─────────────────────────────────────────────────
            Mutation::Pushed { bug } => {
                let bug = bug.with_status(SyncStatus::Synced);
                let Some(id) = bug.id.clone() else {
                    warn!("dropping push without identifier");
                    return;
                };
                if let Err(e) = stage(writes, &bug) {
                    warn!(id = %id, error = %e, "could not cache pushed bug");
                }
                self.collection.upsert(id, bug);
            }

            // ── Drain ────────────────────────────────────────────────
            Mutation::DrainStarted => {
                self.syncing += 1;
                self.sync_error = None;
            }
            Mutation::Resolved { bug, replaces } => {
                if let Some(e) = self.settle(bug, replaces, writes) {
                    self.sync_error = Some(Arc::new(e));
                }
            }
            Mutation::Purged { id } => self.purge(&id, writes),
            Mutation::DrainFinished { failed, error } => {
                self.syncing = self.syncing.saturating_sub(1);
                if let Some(e) = error {
                    self.sync_error = Some(Arc::new(e));
                } else if failed > 0 {
                    self.sync_error = Some(Arc::new(CoreError::DrainIncomplete { failed }));
                }
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Record a confirmed server copy, swapping out a placeholder id.
    fn settle(
        &mut self,
        bug: Bug,
        replaces: Option<BugId>,
        writes: &mut Vec<CacheOp>,
    ) -> Option<CoreError> {
        let bug = bug.with_status(SyncStatus::Synced);
        let Some(id) = bug.id.clone() else {
            return Some(CoreError::Internal("server copy has no identifier".into()));
        };

        let mut storage = None;
        match replaces.filter(|old| *old != id) {
            Some(old) => {
                writes.push(CacheOp::remove(old.cache_key()));
                note(&mut storage, stage(writes, &bug));
                debug!(old = %old, new = %id, "placeholder id replaced");
                self.collection.replace_id(&old, id.clone(), bug);
                self.aliases.insert(old, id);
            }
            None => {
                note(&mut storage, stage(writes, &bug));
                self.collection.upsert(id, bug);
            }
        }
        storage
    }

    /// Persist and show a bug whose change has not reached the server.
    fn keep_pending(&mut self, bug: Bug, writes: &mut Vec<CacheOp>) -> Option<CoreError> {
        let Some(id) = bug.id.clone() else {
            return Some(CoreError::Internal("pending bug has no identifier".into()));
        };
        let mut storage = None;
        note(&mut storage, stage(writes, &bug));
        self.collection.upsert(id, bug);
        storage
    }

    fn purge(&mut self, id: &BugId, writes: &mut Vec<CacheOp>) {
        writes.push(CacheOp::remove(id.cache_key()));
        self.collection.remove(id);
    }

    /// Replace the collection with every readable cache record.
    ///
    /// Known bugs keep their current order; the rest follow, sorted by id.
    /// Malformed records are logged and skipped.
    fn rebuild_from_cache(&mut self, cache: &dyn BugCache) -> Result<(), CoreError> {
        let mut loaded = HashMap::new();
        for key in cache::entity_keys(cache)? {
            match cache::read_bug(cache, &key) {
                Ok(Some(bug)) => {
                    let id = BugId::from(key);
                    loaded.insert(id.clone(), bug.with_id(id));
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "skipping malformed cache record"),
            }
        }

        let mut ordered = Vec::with_capacity(loaded.len());
        for (id, _) in self.collection.iter() {
            if let Some(bug) = loaded.remove(id) {
                ordered.push((id.clone(), bug));
            }
        }
        let mut rest: Vec<_> = loaded.into_iter().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        ordered.extend(rest);

        debug!(records = ordered.len(), "collection rebuilt from cache");
        self.collection = BugCollection::from_bugs(ordered);
        Ok(())
    }

    /// Fold a fresh server listing into the collection.
    ///
    /// Local pending changes win over the server copy: placeholder creates
    /// stay at the head, pending edits and tombstones replace the listed
    /// version, and pending edits the server no longer lists are kept for
    /// the next drain. Synced cache records the server no longer lists are
    /// removed.
    fn merge_remote(
        &mut self,
        bugs: Vec<Bug>,
        cache: &dyn BugCache,
        writes: &mut Vec<CacheOp>,
    ) -> Option<CoreError> {
        let mut storage = None;

        let mut pending: IndexMap<BugId, Bug> = self
            .collection
            .iter()
            .filter(|(_, b)| b.status.is_pending())
            .map(|(id, b)| (id.clone(), Bug::clone(b)))
            .collect();
        let mut cached_synced: HashMap<BugId, Bug> = HashMap::new();

        match cache::entity_keys(cache) {
            Ok(keys) => {
                for key in keys {
                    match cache::read_bug(cache, &key) {
                        Ok(Some(bug)) => {
                            let id = BugId::from(key);
                            if bug.status.is_pending() {
                                pending.entry(id.clone()).or_insert_with(|| bug.with_id(id));
                            } else {
                                cached_synced.insert(id, bug);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(key = %key, error = %e, "skipping malformed cache record"),
                    }
                }
            }
            Err(e) => note(&mut storage, Err(e)),
        }

        let mut merged = Vec::with_capacity(bugs.len() + pending.len());
        let mut seen = HashSet::new();

        for (id, bug) in &pending {
            if bug.status == SyncStatus::PendingCreate {
                seen.insert(id.clone());
                merged.push((id.clone(), bug.clone()));
            }
        }

        for bug in bugs {
            let bug = bug.with_status(SyncStatus::Synced);
            let Some(id) = bug.id.clone() else {
                warn!(title = %bug.title, "server listed a bug without an identifier");
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(local) = pending.get(&id) {
                merged.push((id, local.clone()));
                continue;
            }
            if cached_synced.get(&id) != Some(&bug) {
                note(&mut storage, stage(writes, &bug));
            }
            merged.push((id, bug));
        }

        for (id, bug) in pending {
            if !seen.contains(&id) {
                seen.insert(id.clone());
                merged.push((id, bug));
            }
        }

        for id in cached_synced.keys() {
            if !seen.contains(id) {
                debug!(id = %id, "removing stale cache record");
                writes.push(CacheOp::remove(id.cache_key()));
            }
        }

        self.collection = BugCollection::from_bugs(merged);
        storage
    }
}

/// Which error slot a failed cache write for a mutation lands in.
#[derive(Debug, Clone, Copy)]
enum ErrorSlot {
    Fetch,
    Save,
    Delete,
    Sync,
    LogOnly,
}

impl ErrorSlot {
    fn of(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::CacheLoaded
            | Mutation::FetchStarted
            | Mutation::FetchSucceeded { .. }
            | Mutation::FetchFailed { .. } => Self::Fetch,
            Mutation::SaveStarted | Mutation::SaveSucceeded { .. } | Mutation::SaveQueued { .. } => {
                Self::Save
            }
            Mutation::DeleteStarted | Mutation::DeleteSucceeded { .. } | Mutation::DeleteQueued { .. } => {
                Self::Delete
            }
            Mutation::Pushed { .. } => Self::LogOnly,
            Mutation::DrainStarted
            | Mutation::Resolved { .. }
            | Mutation::Purged { .. }
            | Mutation::DrainFinished { .. } => Self::Sync,
        }
    }
}

/// Stage a write of `bug` under its identifier.
fn stage(writes: &mut Vec<CacheOp>, bug: &Bug) -> Result<(), CoreError> {
    writes.push(CacheOp::write_bug(bug)?);
    Ok(())
}

/// Log a storage failure and keep the first one.
fn note(slot: &mut Option<CoreError>, result: Result<(), CoreError>) {
    if let Err(e) = result {
        warn!(error = %e, "cache write failed");
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}
