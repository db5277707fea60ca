// ── Per-identifier operation locks ──
//
// Save, delete, and drain hold the lock for their bug across the remote
// call and the commit, so two operations on one bug complete in the order
// they were issued. Entries are dropped when the last holder lets go.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::BugId;

#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    locks: DashMap<BugId, Arc<Mutex<()>>>,
}

/// Held lock on one identifier. Released on drop.
pub(crate) struct IdGuard<'a> {
    owner: &'a IdLocks,
    id: BugId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IdLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Waiters are served in FIFO order.
    pub(crate) async fn lock(&self, id: &BugId) -> IdGuard<'_> {
        let mutex = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        IdGuard {
            owner: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
