// ── Reactive state stream ──
//
// Subscription type for consuming engine snapshots.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::EngineState;

/// A subscription to engine state.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct EngineStream {
    current: EngineState,
    receiver: watch::Receiver<EngineState>,
}

impl EngineStream {
    pub(crate) fn new(receiver: watch::Receiver<EngineState>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &EngineState {
        &self.current
    }

    /// The latest committed snapshot.
    pub fn latest(&self) -> EngineState {
        self.receiver.borrow().clone()
    }

    /// Wait for the next commit, returning the new snapshot.
    /// Returns `None` once the engine has been dropped.
    pub async fn changed(&mut self) -> Option<EngineState> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The first item is the current snapshot.
    pub fn into_stream(self) -> EngineWatchStream {
        EngineWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct EngineWatchStream {
    inner: WatchStream<EngineState>,
}

impl Stream for EngineWatchStream {
    type Item = EngineState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
