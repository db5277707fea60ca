//! `login` / `logout`: the bearer token lives in the profile's cache under
//! the reserved `user` key, next to the bugs it unlocks.

use bugsync_core::FileCache;
use bugsync_core::cache::{clear_credential, store_credential};
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn login(global: &GlobalOpts) -> Result<(), CliError> {
    let token = global
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CliError::Validation {
            field: "token".into(),
            reason: "pass the token with --token <TOKEN>".into(),
        })?;

    let (profile, dir) = config::resolve_cache_dir(global)?;
    let cache = FileCache::open(dir)?;
    store_credential(&cache, &SecretString::from(token))?;

    output::print_note(&format!("Token stored for profile '{profile}'"), global.quiet);
    Ok(())
}

pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let (profile, dir) = config::resolve_cache_dir(global)?;
    let cache = FileCache::open(dir)?;
    clear_credential(&cache)?;

    output::print_note(&format!("Token removed for profile '{profile}'"), global.quiet);
    Ok(())
}
