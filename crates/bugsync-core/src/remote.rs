// ── Remote store seam ──
//
// The engine talks to the server only through `BugRemote`, so scenario
// tests can swap in an in-process fake. `BugClient` is the real one.

use std::future::Future;

use bugsync_api::{BugClient, BugDto};

use crate::error::CoreError;
use crate::model::Bug;

/// Request/response access to the authoritative bug store.
pub trait BugRemote: Send + Sync + 'static {
    /// Every bug on the server.
    fn list(&self) -> impl Future<Output = Result<Vec<Bug>, CoreError>> + Send;

    /// Create `bug`; the server assigns the identifier it returns.
    fn create(&self, bug: &Bug) -> impl Future<Output = Result<Bug, CoreError>> + Send;

    /// Replace the server copy of `bug`.
    fn update(&self, bug: &Bug) -> impl Future<Output = Result<Bug, CoreError>> + Send;

    /// Delete `bug` on the server.
    fn delete(&self, bug: &Bug) -> impl Future<Output = Result<(), CoreError>> + Send;
}

fn remote_id(bug: &Bug) -> Result<&str, CoreError> {
    bug.id
        .as_ref()
        .and_then(|id| id.as_remote())
        .ok_or_else(|| CoreError::InvalidEntity {
            message: "bug has no server-assigned identifier".into(),
        })
}

impl BugRemote for BugClient {
    async fn list(&self) -> Result<Vec<Bug>, CoreError> {
        let bugs = self.list_bugs().await?;
        Ok(bugs.into_iter().map(Bug::from).collect())
    }

    async fn create(&self, bug: &Bug) -> Result<Bug, CoreError> {
        let created = self.create_bug(&BugDto::from(bug)).await?;
        Ok(Bug::from(created))
    }

    async fn update(&self, bug: &Bug) -> Result<Bug, CoreError> {
        let id = remote_id(bug)?;
        let updated = self.update_bug(id, &BugDto::from(bug)).await?;
        Ok(Bug::from(updated))
    }

    async fn delete(&self, bug: &Bug) -> Result<(), CoreError> {
        let id = remote_id(bug)?;
        self.delete_bug(id).await?;
        Ok(())
    }
}
