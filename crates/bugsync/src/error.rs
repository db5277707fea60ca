//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use bugsync_config::ConfigError;
use bugsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const INCOMPLETE: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const STORAGE: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connectivity ─────────────────────────────────────────────────

    #[error("Cannot {operation} while offline")]
    #[diagnostic(
        code(bugsync::offline),
        help("Drop --offline to reach the server, or use `bugsync pending` to inspect queued changes.")
    )]
    Offline { operation: String },

    #[error("Server request failed: {message}")]
    #[diagnostic(
        code(bugsync::network),
        help("Check that the server is reachable. Cached bugs are still available with --offline.")
    )]
    Network { message: String, status: Option<u16> },

    #[error("{failed} queued change(s) could not be synchronized")]
    #[diagnostic(
        code(bugsync::sync_incomplete),
        help("The changes stay queued. Run `bugsync sync` again once the server accepts them.")
    )]
    SyncIncomplete { failed: usize },

    // ── Authentication ───────────────────────────────────────────────

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(bugsync::no_credentials),
        help(
            "Store a token with: bugsync login --token <TOKEN>\n\
             Or set BUGSYNC_TOKEN, or token_env in the profile."
        )
    )]
    NoCredentials { profile: String },

    #[error("The server rejected the credentials")]
    #[diagnostic(
        code(bugsync::auth_failed),
        help("Log in again with: bugsync login --token <TOKEN>")
    )]
    AuthFailed,

    // ── Resources ────────────────────────────────────────────────────

    #[error("Bug '{id}' not found")]
    #[diagnostic(
        code(bugsync::not_found),
        help("Run: bugsync list to see available bugs")
    )]
    NotFound { id: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(bugsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(bugsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: bugsync config init --url <URL> --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(bugsync::no_config),
        help(
            "Create one with: bugsync config init --url <URL>\n\
             Or pass --server. Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(bugsync::config))]
    Config(#[from] ConfigError),

    // ── Local state ──────────────────────────────────────────────────

    #[error("Local cache error: {message}")]
    #[diagnostic(
        code(bugsync::storage),
        help("Check permissions on the cache directory, or point --cache-dir elsewhere.")
    )]
    Storage { message: String },

    #[error("{0}")]
    #[diagnostic(code(bugsync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(bugsync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Network {
                status: Some(404), ..
            }
            | Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Offline { .. } | Self::Network { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } | Self::AuthFailed => exit_code::AUTH,
            Self::SyncIncomplete { .. } => exit_code::INCOMPLETE,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            Self::Storage { .. } => exit_code::STORAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connectivity { operation } => CliError::Offline {
                operation: operation.into(),
            },

            CoreError::Network {
                status: Some(401 | 403),
                ..
            } => CliError::AuthFailed,

            CoreError::Network {
                message, status, ..
            } => CliError::Network { message, status },

            CoreError::DrainIncomplete { failed } => CliError::SyncIncomplete { failed },

            CoreError::InvalidEntity { message } => CliError::Validation {
                field: "bug".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Storage { message } => CliError::Storage { message },
            CoreError::Parse { key, message } => CliError::Storage {
                message: format!("malformed record {key}: {message}"),
            },

            other @ (CoreError::Cancelled | CoreError::Internal(_)) => {
                CliError::Internal(other.to_string())
            }
        }
    }
}
