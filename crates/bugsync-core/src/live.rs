// ── Live update consumer ──
//
// Feeds events from the live channel into the engine's apply path.

use std::sync::Arc;

use bugsync_api::LiveEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::SyncEngine;
use crate::error::CoreError;
use crate::remote::BugRemote;

/// Apply push events until the channel closes or the engine shuts down.
pub(crate) async fn live_task<R: BugRemote>(
    engine: SyncEngine<R>,
    mut events: broadcast::Receiver<Arc<LiveEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => match engine.apply(&event).await {
                    Ok(applied) => debug!(kind = ?event.kind, applied, "push event"),
                    Err(CoreError::Cancelled) => break,
                    Err(e) => warn!(error = %e, "could not apply push event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "live consumer lagged, some pushes were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("live channel closed");
                    break;
                }
            },
        }
    }
}
