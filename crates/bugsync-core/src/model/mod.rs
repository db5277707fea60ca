// ── Domain model ──

mod bug;
mod bug_id;

pub use bug::{Bug, InvalidStatus, SyncStatus};
pub use bug_id::{BugId, LOCAL_ID_PREFIX};
