// ── Sync scheduler ──
//
// Replays pending cache records against the server once connectivity
// returns. One drain runs at a time; a request that arrives while one is
// running is folded into a single re-run.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache;
use crate::engine::{SyncEngine, with_server_id};
use crate::error::CoreError;
use crate::model::{Bug, BugId, SyncStatus};
use crate::remote::BugRemote;
use crate::store::Mutation;

/// Tally of one drain (or one drain plus its queued re-runs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Pending creates and updates the server accepted.
    pub synced: usize,
    /// Pending deletes the server confirmed.
    pub removed: usize,
    /// Records the server rejected or could not be reached for; still pending.
    pub failed: usize,
    /// Malformed records that were left alone.
    pub skipped: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: Self) {
        self.synced += other.synced;
        self.removed += other.removed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// `true` when nothing is left pending because of a failure.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Drain exclusivity: `running` serializes drains, `rerun` records a
/// request that arrived while one was in flight.
#[derive(Debug, Default)]
pub(crate) struct SyncScheduler {
    running: Mutex<()>,
    rerun: AtomicBool,
}

impl SyncScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

enum Resolution {
    Synced,
    Removed,
    Failed,
    Skipped,
    Untouched,
}

impl<R: BugRemote> SyncEngine<R> {
    /// Drain every pending record, waiting for a running drain to finish first.
    pub async fn drain(&self) -> Result<DrainReport, CoreError> {
        let _running = self.inner.scheduler.running.lock().await;
        self.drain_locked().await
    }

    /// Drain unless one is already running, in which case the running
    /// drain goes round once more and `None` is returned.
    pub async fn request_drain(&self) -> Result<Option<DrainReport>, CoreError> {
        let scheduler = &self.inner.scheduler;
        let Ok(_running) = scheduler.running.try_lock() else {
            debug!("drain already running, queueing a re-run");
            scheduler.rerun.store(true, Ordering::SeqCst);
            return Ok(None);
        };
        self.drain_locked().await.map(Some)
    }

    async fn drain_locked(&self) -> Result<DrainReport, CoreError> {
        let mut total = DrainReport::default();
        loop {
            self.inner.scheduler.rerun.store(false, Ordering::SeqCst);
            total.absorb(self.drain_once().await?);
            if !self.inner.scheduler.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
            debug!("running queued drain");
        }
        Ok(total)
    }

    /// One pass over the cache. Each record resolves independently; a
    /// failure leaves that record pending and moves on.
    async fn drain_once(&self) -> Result<DrainReport, CoreError> {
        self.commit(Mutation::DrainStarted).await?;

        let keys = match cache::entity_keys(self.inner.cache.as_ref()) {
            Ok(keys) => keys,
            Err(error) => {
                warn!(error = %error, "cannot enumerate cache, drain aborted");
                self.commit(Mutation::DrainFinished {
                    failed: 0,
                    error: Some(error),
                })
                .await?;
                return Ok(DrainReport::default());
            }
        };

        let mut report = DrainReport::default();
        for key in keys {
            if self.inner.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            match self.resolve(BugId::from(key)).await? {
                Resolution::Synced => report.synced += 1,
                Resolution::Removed => report.removed += 1,
                Resolution::Failed => report.failed += 1,
                Resolution::Skipped => report.skipped += 1,
                Resolution::Untouched => {}
            }
        }

        self.commit(Mutation::DrainFinished {
            failed: report.failed,
            error: None,
        })
        .await?;

        if report != DrainReport::default() {
            info!(
                synced = report.synced,
                removed = report.removed,
                failed = report.failed,
                skipped = report.skipped,
                "drain finished"
            );
        }
        Ok(report)
    }

    /// Replay one record under its id lock.
    ///
    /// The record is re-read after the lock is taken, since a save or
    /// delete may have settled it in the meantime.
    async fn resolve(&self, id: BugId) -> Result<Resolution, CoreError> {
        let _guard = self.inner.locks.lock(&id).await;

        let bug = match cache::read_bug(self.inner.cache.as_ref(), &id.cache_key()) {
            Ok(Some(bug)) => bug.with_id(id.clone()),
            Ok(None) => return Ok(Resolution::Untouched),
            Err(error) => {
                warn!(id = %id, error = %error, "skipping malformed cache record");
                return Ok(Resolution::Skipped);
            }
        };

        match bug.status {
            SyncStatus::Synced => Ok(Resolution::Untouched),
            SyncStatus::PendingCreate => self.replay_create(id, bug).await,
            SyncStatus::PendingUpdate if id.is_local() => self.replay_create(id, bug).await,
            SyncStatus::PendingUpdate => self.replay_update(id, bug).await,
            SyncStatus::PendingDelete => self.replay_delete(id, &bug).await,
        }
    }

    /// Send `bug` as a new bug. The record under `id` is replaced by the
    /// server's copy.
    async fn replay_create(&self, id: BugId, bug: Bug) -> Result<Resolution, CoreError> {
        let outgoing = Bug {
            id: None,
            status: SyncStatus::Synced,
            ..bug
        };
        let created = self
            .inner
            .remote
            .create(&outgoing)
            .await
            .and_then(|saved| with_server_id(saved, &outgoing));

        match created {
            Ok(created) => {
                debug!(old = %id, new = ?created.id, "pending create synced");
                self.commit(Mutation::Resolved {
                    bug: created,
                    replaces: Some(id),
                })
                .await?;
                Ok(Resolution::Synced)
            }
            Err(error) => {
                warn!(id = %id, error = %error, "pending create still failing");
                Ok(Resolution::Failed)
            }
        }
    }

    async fn replay_update(&self, id: BugId, bug: Bug) -> Result<Resolution, CoreError> {
        let outgoing = bug.clone().with_status(SyncStatus::Synced);
        let updated = self
            .inner
            .remote
            .update(&outgoing)
            .await
            .and_then(|saved| with_server_id(saved, &outgoing));

        match updated {
            Err(error) if error.is_not_found() => {
                // Deleted on the server while the edit was queued; the edit
                // comes back as a new bug under a fresh id.
                warn!(id = %id, "bug gone from server, re-creating pending update");
                self.replay_create(id, bug).await
            }
            Ok(updated) => {
                debug!(id = %id, "pending update synced");
                self.commit(Mutation::Resolved {
                    bug: updated,
                    replaces: None,
                })
                .await?;
                Ok(Resolution::Synced)
            }
            Err(error) => {
                warn!(id = %id, error = %error, "pending update still failing");
                Ok(Resolution::Failed)
            }
        }
    }

    async fn replay_delete(&self, id: BugId, bug: &Bug) -> Result<Resolution, CoreError> {
        let result = if id.is_local() {
            Ok(())
        } else {
            self.inner.remote.delete(bug).await
        };

        match result {
            Ok(()) => {}
            Err(error) if error.is_not_found() => {
                debug!(id = %id, "pending delete already applied on server");
            }
            Err(error) => {
                warn!(id = %id, error = %error, "pending delete still failing");
                return Ok(Resolution::Failed);
            }
        }

        self.commit(Mutation::Purged { id }).await?;
        Ok(Resolution::Removed)
    }
}

// ── Background task ──────────────────────────────────────────────────

/// Drain on every offline → online transition until cancelled.
pub(crate) async fn connectivity_task<R: BugRemote>(
    engine: SyncEngine<R>,
    mut connected: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let mut was_connected = *connected.borrow_and_update();
    if was_connected {
        run_drain(&engine).await;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *connected.borrow_and_update();
                if now && !was_connected {
                    debug!("connectivity restored");
                    run_drain(&engine).await;
                }
                was_connected = now;
            }
        }
    }
}

async fn run_drain<R: BugRemote>(engine: &SyncEngine<R>) {
    match engine.request_drain().await {
        Ok(Some(report)) if !report.is_complete() => {
            warn!(failed = report.failed, "some pending changes are still unsynced");
        }
        Ok(_) | Err(CoreError::Cancelled) => {}
        Err(e) => warn!(error = %e, "drain failed"),
    }
}
