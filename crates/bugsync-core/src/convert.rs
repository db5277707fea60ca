// ── Wire ↔ domain conversion ──
//
// `BugDto` is what the server speaks; `Bug` is what the engine keeps.
// The only real differences are the typed identifier and status.

use bugsync_api::BugDto;
use tracing::warn;

use crate::model::{Bug, BugId, SyncStatus};

impl From<BugDto> for Bug {
    fn from(dto: BugDto) -> Self {
        let status = SyncStatus::try_from(dto.status).unwrap_or_else(|e| {
            warn!(error = %e, "server sent unknown status, treating as synced");
            SyncStatus::Synced
        });
        Self {
            id: dto.id.map(BugId::from),
            title: dto.title,
            description: dto.description,
            priority: dto.priority,
            status,
            photo_path: dto.photo_path,
            latitude: dto.latitude,
            longitude: dto.longitude,
        }
    }
}

impl From<&Bug> for BugDto {
    fn from(bug: &Bug) -> Self {
        Self {
            id: bug.id.as_ref().map(ToString::to_string),
            title: bug.title.clone(),
            description: bug.description.clone(),
            priority: bug.priority,
            status: bug.status.code(),
            photo_path: bug.photo_path.clone(),
            latitude: bug.latitude,
            longitude: bug.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dto_keeps_every_field() {
        let bug = Bug::new("Crash", "on launch", 4)
            .with_id("abc")
            .with_photo("file:///tmp/p.jpg")
            .with_location(48.1, 11.5)
            .with_status(SyncStatus::PendingUpdate);
        let dto = BugDto::from(&bug);
        assert_eq!(dto.id.as_deref(), Some("abc"));
        assert_eq!(dto.status, 2);
        assert_eq!(Bug::from(dto), bug);
    }

    #[test]
    fn unknown_server_status_reads_as_synced() {
        let dto = BugDto {
            status: 42,
            ..BugDto::default()
        };
        assert_eq!(Bug::from(dto).status, SyncStatus::Synced);
    }
}
