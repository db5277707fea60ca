//! Clap derive structures for the `bugsync` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// bugsync -- offline-first bug tracker client
#[derive(Debug, Parser)]
#[command(
    name = "bugsync",
    version,
    about = "Track bugs against a remote server, online or off",
    long_about = "Keeps a local copy of the bug tracker in step with the server.\n\n\
        Edits made while the server is unreachable are queued in the local\n\
        cache and replayed by `bugsync sync` or when `bugsync watch` sees the\n\
        server come back.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "BUGSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server base URL (overrides profile)
    #[arg(long, short = 's', env = "BUGSYNC_SERVER", global = true)]
    pub server: Option<String>,

    /// Bearer token (overrides profile and stored login)
    #[arg(long, env = "BUGSYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Treat the server as unreachable: read from the cache only
    #[arg(long, global = true)]
    pub offline: bool,

    /// Keep the cache in memory for this run only (nothing is read or written on disk)
    #[arg(long, global = true, conflicts_with = "cache_dir")]
    pub ephemeral: bool,

    /// Cache directory (overrides profile)
    #[arg(long, env = "BUGSYNC_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BUGSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "BUGSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "BUGSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List bugs (refreshes from the server unless --offline)
    #[command(alias = "ls")]
    List,

    /// Show a single bug
    Show(ShowArgs),

    /// Create a bug, or edit one with --id
    Save(SaveArgs),

    /// Delete a bug
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Replay queued offline changes against the server
    Sync,

    /// List changes still waiting to reach the server
    Pending,

    /// Follow live updates until interrupted
    Watch,

    /// Store the bearer token given with --token in the profile's cache
    Login,

    /// Forget the stored bearer token
    Logout,

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Bug commands ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Bug identifier (server id or `local-…` placeholder)
    pub id: String,
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Edit this bug instead of creating a new one
    #[arg(long)]
    pub id: Option<String>,

    /// Title (required when creating)
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Description
    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Priority
    #[arg(long, short = 'P')]
    pub priority: Option<i64>,

    /// Path to an attached photo
    #[arg(long)]
    pub photo: Option<String>,

    /// Latitude where the bug was seen
    #[arg(long, requires = "longitude", allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Longitude where the bug was seen
    #[arg(long, requires = "latitude", allow_negative_numbers = true)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Bug identifier
    pub id: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a profile to the config file
    Init(ConfigInitArgs),

    /// Show the loaded configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Server base URL
    #[arg(long)]
    pub url: String,

    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Environment variable holding the token
    #[arg(long)]
    pub token_env: Option<String>,

    /// Reconnect the live channel after it drops
    #[arg(long)]
    pub reconnect: bool,

    /// Make this the default profile
    #[arg(long)]
    pub set_default: bool,

    /// Replace an existing profile of the same name
    #[arg(long)]
    pub force: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
