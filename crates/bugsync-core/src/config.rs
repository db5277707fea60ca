// ── Runtime engine configuration ──
//
// Describes where the server lives and how to reach it. Never touches
// disk: the CLI builds an `EngineConfig` from its profile and hands it in.

use std::time::Duration;

use bugsync_api::{LiveConfig, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// REST base URL (e.g., `https://bugs.example.com`).
    pub server_url: Url,
    /// Live update endpoint. `None` disables push events.
    pub live_url: Option<Url>,
    /// Bearer credential. When absent the engine falls back to the one
    /// stored in the cache under the reserved `user` key.
    pub credential: Option<SecretString>,
    /// Per-request timeout enforced by the remote client.
    pub timeout: Duration,
    /// TLS verification for the REST client.
    pub tls: TlsMode,
    /// Live channel reconnect policy.
    pub live: LiveConfig,
}

impl EngineConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            live_url: None,
            credential: None,
            timeout: Duration::from_secs(30),
            tls: TlsMode::default(),
            live: LiveConfig::default(),
        }
    }

    /// Parse the server URL and derive the live endpoint from it.
    pub fn from_server(server: &str) -> Result<Self, CoreError> {
        let server_url = Url::parse(server).map_err(|e| CoreError::Config {
            message: format!("invalid server URL {server:?}: {e}"),
        })?;
        let live_url = derive_live_url(&server_url);
        Ok(Self {
            live_url,
            ..Self::new(server_url)
        })
    }

    pub fn with_credential(mut self, credential: SecretString) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_live_url(mut self, live_url: Option<Url>) -> Self {
        self.live_url = live_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transport settings for the REST client.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
        }
    }
}

/// `http(s)://host/base` → `ws(s)://host/base`.
///
/// Returns `None` for schemes that have no WebSocket counterpart.
pub fn derive_live_url(server: &Url) -> Option<Url> {
    let scheme = match server.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    let mut live = server.clone();
    live.set_scheme(scheme).ok()?;
    Some(live)
}
