// ── Published engine state ──

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{Bug, BugId};

/// Immutable view of the engine after one committed mutation.
///
/// Cheap to clone: the collection and errors are behind `Arc`s. Each
/// operation class exposes a busy flag and its last error; the error is
/// cleared when the next attempt of that class starts.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    /// Every bug the engine tracks, tombstones included, in display order.
    pub entities: Arc<Vec<Arc<Bug>>>,

    pub fetching: bool,
    pub fetch_error: Option<Arc<CoreError>>,

    pub saving: bool,
    pub saving_error: Option<Arc<CoreError>>,

    pub deleting: bool,
    pub deleting_error: Option<Arc<CoreError>>,

    pub syncing: bool,
    pub sync_error: Option<Arc<CoreError>>,

    /// When the last successful fetch was committed.
    pub last_fetch: Option<DateTime<Utc>>,

    /// Bumped on every commit.
    pub version: u64,
}

impl EngineState {
    /// Bugs to display: everything except local tombstones.
    pub fn visible(&self) -> Vec<Arc<Bug>> {
        self.entities
            .iter()
            .filter(|b| b.is_visible())
            .cloned()
            .collect()
    }

    /// Bugs with an unconfirmed local change.
    pub fn pending(&self) -> Vec<Arc<Bug>> {
        self.entities
            .iter()
            .filter(|b| b.status.is_pending())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &BugId) -> Option<Arc<Bug>> {
        self.entities
            .iter()
            .find(|b| b.id.as_ref() == Some(id))
            .cloned()
    }

    /// `true` while any operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.fetching || self.saving || self.deleting || self.syncing
    }
}
