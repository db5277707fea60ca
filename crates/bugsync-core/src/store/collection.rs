// ── Ordered bug collection ──
//
// Insertion-ordered map keyed by identifier. New bugs go to the head,
// updates keep their position, and an identifier swap keeps the slot.
// Every read hands out `Arc`s so snapshots are cheap to publish.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::{Bug, BugId};

/// The canonical in-memory collection. Owned by the engine's core state;
/// never shared mutably.
#[derive(Debug, Default, Clone)]
pub(crate) struct BugCollection {
    by_id: IndexMap<BugId, Arc<Bug>>,
}

impl BugCollection {
    /// Build from already-identified bugs, keeping their order. A later
    /// duplicate replaces the earlier one in place.
    pub(crate) fn from_bugs(bugs: impl IntoIterator<Item = (BugId, Bug)>) -> Self {
        let mut by_id = IndexMap::new();
        for (id, bug) in bugs {
            by_id.insert(id, Arc::new(bug));
        }
        Self { by_id }
    }

    /// Insert at the head if new, replace in place otherwise.
    /// Returns `true` if the identifier was new.
    pub(crate) fn upsert(&mut self, id: BugId, bug: Bug) -> bool {
        let bug = Arc::new(bug);
        if let Some(slot) = self.by_id.get_mut(&id) {
            *slot = bug;
            false
        } else {
            self.by_id.shift_insert(0, id, bug);
            true
        }
    }

    /// Re-key `old` as `new`, keeping its position.
    ///
    /// If `new` is already present (a push can beat the create response),
    /// that entry is updated and `old` is dropped, so the collection never
    /// holds both.
    pub(crate) fn replace_id(&mut self, old: &BugId, new: BugId, bug: Bug) {
        let bug = Arc::new(bug);
        if let Some(slot) = self.by_id.get_mut(&new) {
            *slot = bug;
            self.by_id.shift_remove(old);
            return;
        }
        match self.by_id.get_index_of(old) {
            Some(index) => {
                self.by_id.shift_remove_index(index);
                self.by_id.shift_insert(index, new, bug);
            }
            None => {
                self.by_id.shift_insert(0, new, bug);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &BugId) -> Option<Arc<Bug>> {
        self.by_id.shift_remove(id)
    }

    pub(crate) fn get(&self, id: &BugId) -> Option<&Arc<Bug>> {
        self.by_id.get(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&BugId, &Arc<Bug>)> {
        self.by_id.iter()
    }

    /// Immutable copy for subscribers.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Bug>>> {
        Arc::new(self.by_id.values().cloned().collect())
    }
}
