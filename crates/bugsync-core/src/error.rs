// ── Core error types ──
//
// What the engine reports to its callers. None of these are fatal to the
// engine itself: network failures degrade to pending state, parse failures
// skip one record, storage failures land in an error slot. The
// `From<bugsync_api::Error>` impl folds every transport failure into the
// single `Network` kind.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    /// The caller said the device is offline; nothing was attempted.
    #[error("Cannot {operation} while offline")]
    Connectivity { operation: &'static str },

    /// The remote call was rejected, refused, or timed out.
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status code, when the server answered.
        status: Option<u16>,
        /// Whether retrying later is likely to help.
        transient: bool,
    },

    // ── Data errors ──────────────────────────────────────────────────
    /// A cache record could not be read back as a bug.
    #[error("Malformed cache record {key}: {message}")]
    Parse { key: String, message: String },

    /// The durable cache could not be read or written.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// The bug handed in cannot be used for this operation.
    #[error("Invalid bug: {message}")]
    InvalidEntity { message: String },

    // ── Sync ─────────────────────────────────────────────────────────
    /// A drain finished but some records are still pending.
    #[error("{failed} pending change(s) could not be synchronized")]
    DrainIncomplete { failed: usize },

    // ── Lifecycle ────────────────────────────────────────────────────
    /// The engine shut down while the operation was in flight; its result was discarded.
    #[error("Engine shut down before the operation completed")]
    Cancelled,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }

    /// `true` if the remote answered 404 for the target bug.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Network {
                status: Some(404),
                ..
            }
        )
    }

    /// `true` for failures a later retry can plausibly fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { transient, .. } => *transient,
            Self::Connectivity { .. } | Self::DrainIncomplete { .. } => true,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<bugsync_api::Error> for CoreError {
    fn from(err: bugsync_api::Error) -> Self {
        Self::Network {
            status: err.status(),
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON encoding failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_become_network_errors() {
        let err = CoreError::from(bugsync_api::Error::Api {
            status: 404,
            message: "gone".into(),
        });
        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert!(matches!(err, CoreError::Network { status: Some(404), .. }));
    }

    #[test]
    fn server_failures_stay_transient() {
        let err = CoreError::from(bugsync_api::Error::Api {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(err.is_transient());
    }

    #[test]
    fn offline_message_names_operation() {
        let err = CoreError::Connectivity { operation: "delete" };
        assert_eq!(err.to_string(), "Cannot delete while offline");
    }
}
