// Bug endpoints
//
// CRUD over `/api/bug`. Each call is wrapped in `with_logs` so the
// started/succeeded/failed trail is uniform across operations.

use std::future::Future;

use tracing::debug;

use crate::client::BugClient;
use crate::error::Error;
use crate::models::BugDto;

const BUG_PATH: &str = "api/bug";

/// Log the start and outcome of a remote call.
async fn with_logs<T>(op: &'static str, fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
    debug!(op, "started");
    let result = fut.await;
    match &result {
        Ok(_) => debug!(op, "succeeded"),
        Err(e) => debug!(op, error = %e, "failed"),
    }
    result
}

impl BugClient {
    /// List every bug visible to the credential.
    ///
    /// `GET /api/bug`
    pub async fn list_bugs(&self) -> Result<Vec<BugDto>, Error> {
        let url = self.url(BUG_PATH)?;
        with_logs("list_bugs", self.get(url)).await
    }

    /// Create a bug. Any identifier on `bug` is stripped; the server assigns one.
    ///
    /// `POST /api/bug`
    pub async fn create_bug(&self, bug: &BugDto) -> Result<BugDto, Error> {
        let url = self.url(BUG_PATH)?;
        let body = bug.without_id();
        with_logs("create_bug", self.post(url, &body)).await
    }

    /// Replace an existing bug.
    ///
    /// `PUT /api/bug/{id}`
    pub async fn update_bug(&self, id: &str, bug: &BugDto) -> Result<BugDto, Error> {
        let url = self.item_url(BUG_PATH, id)?;
        with_logs("update_bug", self.put(url, bug)).await
    }

    /// Delete a bug by identifier.
    ///
    /// `DELETE /api/bug/{id}`
    pub async fn delete_bug(&self, id: &str) -> Result<(), Error> {
        let url = self.item_url(BUG_PATH, id)?;
        with_logs("delete_bug", self.delete(url)).await
    }
}
