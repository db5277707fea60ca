//! Flag-aware configuration: merges `--server`, `--token`, `--cache-dir`
//! and friends over the loaded profile.
//!
//! The file format and profile translation live in `bugsync-config`.

use std::path::PathBuf;

use bugsync_config::{Config, Profile};
use bugsync_core::EngineConfig;
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use bugsync_config::config_path;

/// Everything a bug command needs to build an engine.
pub struct Resolved {
    pub profile_name: String,
    pub engine: EngineConfig,
    pub cache_dir: PathBuf,
}

/// Profile name from `--profile`, else the config's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| cfg.default_profile_name().to_owned())
}

/// The active profile with CLI flags applied on top.
///
/// A missing profile is fine when `--server` supplies the URL, unless the
/// profile was asked for by name.
fn effective_profile(global: &GlobalOpts, cfg: &Config, name: &str) -> Result<Profile, CliError> {
    let mut profile = match cfg.profiles.get(name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: name.to_owned(),
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        None => Profile::default(),
    };

    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if let Some(ref dir) = global.cache_dir {
        profile.cache_dir = Some(dir.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    Ok(profile)
}

/// Resolve the engine configuration for a bug command.
///
/// The live endpoint is kept only when `live` is set; one-shot commands
/// never open the push channel.
pub fn resolve(global: &GlobalOpts, live: bool) -> Result<Resolved, CliError> {
    let cfg = bugsync_config::load_config()?;
    let name = active_profile_name(global, &cfg);
    let profile = effective_profile(global, &cfg, &name)?;

    if profile.server.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    let mut engine = bugsync_config::profile_to_engine_config(&profile, &cfg.defaults)?;
    if let Some(ref token) = global.token {
        engine.credential = Some(SecretString::from(token.clone()));
    }
    if !live {
        engine.live_url = None;
    }

    Ok(Resolved {
        cache_dir: bugsync_config::cache_dir(&profile, &name),
        profile_name: name,
        engine,
    })
}

/// Cache directory for the active profile. Needs no server URL, so it
/// works for `login` before any profile exists.
pub fn resolve_cache_dir(global: &GlobalOpts) -> Result<(String, PathBuf), CliError> {
    let cfg = bugsync_config::load_config()?;
    let name = active_profile_name(global, &cfg);
    let profile = effective_profile(global, &cfg, &name)?;
    let dir = bugsync_config::cache_dir(&profile, &name);
    Ok((name, dir))
}
