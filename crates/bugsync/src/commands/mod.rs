//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod auth;
pub mod bugs;
pub mod config_cmd;
pub mod sync;

use std::sync::Arc;

use bugsync_core::{
    BugCache, BugClient, FetchOutcome, FileCache, MemoryCache, SyncEngine, resolve_credential,
};
use tracing::debug;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub type Engine = SyncEngine<BugClient>;

/// Open the profile's cache, build the engine and load it.
///
/// Only `watch` gets the live channel; everything else is one-shot.
async fn open_engine(global: &GlobalOpts, live: bool) -> Result<Engine, CliError> {
    let resolved = config::resolve(global, live)?;
    let cache: Arc<dyn BugCache> = if global.ephemeral {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(FileCache::open(&resolved.cache_dir)?)
    };

    if resolve_credential(&resolved.engine, cache.as_ref())?.is_none() {
        return Err(CliError::NoCredentials {
            profile: resolved.profile_name,
        });
    }

    debug!(
        profile = %resolved.profile_name,
        server = %resolved.engine.server_url,
        cache = %resolved.cache_dir.display(),
        ephemeral = global.ephemeral,
        "opening engine"
    );
    let engine = SyncEngine::with_client(resolved.engine, cache)?;
    engine.start().await?;
    Ok(engine)
}

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = open_engine(global, matches!(cmd, Command::Watch)).await?;

    let result = match cmd {
        Command::List => bugs::list(&engine, global).await,
        Command::Show(args) => bugs::show(&engine, args, global).await,
        Command::Save(args) => bugs::save(&engine, args, global).await,
        Command::Delete(args) => bugs::delete(&engine, args, global).await,
        Command::Pending => bugs::pending(&engine, global),
        Command::Sync => sync::sync(&engine, global).await,
        Command::Watch => sync::watch(&engine, global).await,
        Command::Login | Command::Logout | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not use the engine".into()))
        }
    };

    engine.shutdown().await;
    result
}

/// Refresh from the server unless `--offline`. A failed refresh falls back
/// to the cache with a note on stderr.
async fn refresh(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    if global.offline {
        return Ok(());
    }
    if let FetchOutcome::Cached = engine.fetch_all().await? {
        let reason = engine
            .state()
            .fetch_error
            .map_or_else(|| "unknown error".to_owned(), |e| e.to_string());
        output::print_note(
            &format!("Server unreachable, showing cached bugs ({reason})"),
            global.quiet,
        );
    }
    Ok(())
}
