//! Live update channel over WebSocket.
//!
//! Connects to the bug server's WebSocket endpoint, authenticates with a
//! single authorization frame, and streams parsed "entity changed" events
//! through a [`tokio::sync::broadcast`] channel.
//!
//! Reconnection is opt-in: with [`LiveConfig::reconnect`] unset the channel
//! stays down after the first close or error. When set, the task reconnects
//! with exponential backoff + jitter and re-authenticates each time.
//!
//! # Example
//!
//! ```rust,ignore
//! use bugsync_api::websocket::{LiveChannel, LiveConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("ws://localhost:3000")?;
//!
//! let channel = LiveChannel::connect(url, token, LiveConfig::default(), cancel.clone());
//! let mut rx = channel.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{:?}: {:?}", event.kind, event.bug.id);
//! }
//!
//! channel.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::BugDto;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── LiveEvent ────────────────────────────────────────────────────────

/// What happened to the entity carried by a [`LiveEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEventKind {
    Created,
    Updated,
    Deleted,
    /// Any kind this client does not know about. Consumers ignore it.
    Other(String),
}

impl From<&str> for LiveEventKind {
    fn from(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A parsed server push: the event kind and the entity it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    pub kind: LiveEventKind,
    pub bug: BugDto,
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Live channel settings.
#[derive(Debug, Clone, Default)]
pub struct LiveConfig {
    /// Reconnect policy. `None` (the default) means a dropped connection stays dropped.
    pub reconnect: Option<ReconnectConfig>,
}

// ── LiveChannel ──────────────────────────────────────────────────────

/// Handle to a running live update channel.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to close the socket and stop dispatching.
pub struct LiveChannel {
    event_rx: broadcast::Receiver<Arc<LiveEvent>>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl LiveChannel {
    /// Spawn the background connection task.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously. Subscribe to start consuming events.
    pub fn connect(
        ws_url: Url,
        token: SecretString,
        config: LiveConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            live_loop(ws_url, token, event_tx, config, task_cancel).await;
        });

        Self {
            event_rx,
            cancel,
            task,
        }
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LiveEvent>> {
        self.event_rx.resubscribe()
    }

    /// `true` once the background task has exited (closed without reconnect,
    /// retries exhausted, or shut down).
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the background task to close the socket and exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Shut down and wait for the background task to finish.
    pub async fn join(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "live channel task panicked");
        }
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// connect → authorize → read → (optionally) backoff → reconnect.
async fn live_loop(
    ws_url: Url,
    token: SecretString,
    event_tx: broadcast::Sender<Arc<LiveEvent>>,
    config: LiveConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        // Cancellation is handled inside, so an open socket gets its close frame.
        let result = connect_and_read(&ws_url, &token, &event_tx, &cancel).await;

        match &result {
            Ok(()) => tracing::info!("live channel disconnected"),
            Err(e) => tracing::warn!(error = %e, attempt, "live channel error"),
        }

        if cancel.is_cancelled() {
            break;
        }

        let Some(reconnect) = config.reconnect.as_ref() else {
            tracing::info!("reconnect disabled, live channel stays closed");
            break;
        };

        if result.is_ok() {
            // Clean close: reconnect immediately.
            attempt = 0;
            continue;
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "live channel reconnection limit reached");
                break;
            }
        }

        let delay = calculate_backoff(attempt, reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    tracing::debug!("live channel loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one connection, send the authorization frame, and read until it drops.
async fn connect_and_read(
    url: &Url,
    token: &SecretString,
    event_tx: &broadcast::Sender<Arc<LiveEvent>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting live channel");

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        connected = tokio_tungstenite::connect_async(url.as_str()) => {
            connected.map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };

    let (mut write, mut read) = ws_stream.split();

    let frame = authorization_frame(token);
    write
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| Error::WebSocketAuth(e.to_string()))?;

    tracing::info!("live channel connected and authorized");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        parse_and_broadcast(&text, event_tx);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        } else {
                            tracing::info!("close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("live stream ended");
                        return Ok(());
                    }
                    // Ping/Pong/Binary/Frame: tungstenite answers pings itself
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────

/// `{"type":"authorization","payload":{"token":"…"}}`
fn authorization_frame(token: &SecretString) -> String {
    serde_json::json!({
        "type": "authorization",
        "payload": { "token": token.expose_secret() },
    })
    .to_string()
}

/// Inbound frame. `type` is the current field name; `event` is accepted
/// for servers that still send the older envelope.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type", alias = "event")]
    kind: String,
    payload: InboundPayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundPayload {
    Wrapped { item: BugDto },
    Bare(BugDto),
}

/// Parse a text frame and broadcast the event it carries.
fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<LiveEvent>>) {
    let Some(event) = parse_frame(text) else {
        return;
    };
    // No subscribers right now is fine.
    let _ = event_tx.send(Arc::new(event));
}

fn parse_frame(text: &str) -> Option<LiveEvent> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed live frame");
            return None;
        }
    };

    let bug = match frame.payload {
        InboundPayload::Wrapped { item } => item,
        InboundPayload::Bare(bug) => bug,
    };

    Some(LiveEvent {
        kind: LiveEventKind::from(frame.kind.as_str()),
        bug,
    })
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
