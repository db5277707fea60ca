// ── Bug domain type ──

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bug_id::BugId;

/// Pending-mutation status of a bug, serialized as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SyncStatus {
    /// Local and remote copies agree.
    #[default]
    Synced,
    /// Created locally; the server has not seen it.
    PendingCreate,
    /// Edited locally; the server has the previous version.
    PendingUpdate,
    /// Deleted locally; the server still has it.
    PendingDelete,
}

#[derive(Debug, Error)]
#[error("unknown sync status code {0}")]
pub struct InvalidStatus(pub u8);

impl SyncStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Synced => 0,
            Self::PendingCreate => 1,
            Self::PendingUpdate => 2,
            Self::PendingDelete => 3,
        }
    }

    pub fn is_pending(self) -> bool {
        self != Self::Synced
    }
}

impl TryFrom<u8> for SyncStatus {
    type Error = InvalidStatus;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Synced),
            1 => Ok(Self::PendingCreate),
            2 => Ok(Self::PendingUpdate),
            3 => Ok(Self::PendingDelete),
            other => Err(InvalidStatus(other)),
        }
    }
}

impl From<SyncStatus> for u8 {
    fn from(status: SyncStatus) -> Self {
        status.code()
    }
}

/// A bug report.
///
/// The JSON shape is shared by the REST API, push frames, and cache
/// records. `id` is also read from a bare `id` key, which older cache
/// records used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BugId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub status: SyncStatus,
    #[serde(default)]
    pub photo_path: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl Bug {
    /// A new, not yet saved bug.
    pub fn new(title: impl Into<String>, description: impl Into<String>, priority: i64) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            priority,
            status: SyncStatus::Synced,
            photo_path: String::new(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    pub fn with_id(mut self, id: impl Into<BugId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_photo(mut self, path: impl Into<String>) -> Self {
        self.photo_path = path.into();
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    /// Copy with a different status.
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = status;
        self
    }

    /// `true` once the server has assigned an identifier.
    pub fn has_remote_id(&self) -> bool {
        self.id.as_ref().is_some_and(|id| !id.is_local())
    }

    /// Tombstoned bugs stay in the collection but are hidden from display.
    pub fn is_visible(&self) -> bool {
        self.status != SyncStatus::PendingDelete
    }
}
