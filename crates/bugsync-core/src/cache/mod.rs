// ── Durable cache ──
//
// Key/value persistence for bug snapshots. Each bug is stored under its
// identifier as a JSON string. The reserved `user` key holds the session
// credential and is never read back as a bug.

mod file;
mod memory;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::Bug;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Cache key reserved for the session credential.
pub const CREDENTIAL_KEY: &str = "user";

/// Synchronous key/value store backing the engine.
///
/// Implementations must be safe to share across tasks. Failures are
/// reported as [`CoreError::Storage`].
pub trait BugCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
    fn list_keys(&self) -> Result<Vec<String>, CoreError>;

    /// Apply `ops` in order as one write.
    ///
    /// The default applies them one at a time; stores with a costly
    /// commit override it to commit once.
    fn apply_batch(&self, ops: Vec<CacheOp>) -> Result<(), CoreError> {
        for op in ops {
            match op {
                CacheOp::Set { key, value } => self.set(&key, value)?,
                CacheOp::Remove { key } => self.remove(&key)?,
            }
        }
        Ok(())
    }
}

/// One change in a batched cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl CacheOp {
    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove { key: key.into() }
    }

    /// A write of `bug` under its identifier.
    pub(crate) fn write_bug(bug: &Bug) -> Result<Self, CoreError> {
        let Some(id) = bug.id.as_ref() else {
            return Err(CoreError::InvalidEntity {
                message: "cannot cache a bug without an identifier".into(),
            });
        };
        Ok(Self::Set {
            key: id.cache_key(),
            value: serde_json::to_string(bug)?,
        })
    }
}

// ── Entity records ───────────────────────────────────────────────────

/// Keys that hold bug records, i.e. everything except the credential.
pub(crate) fn entity_keys(cache: &dyn BugCache) -> Result<Vec<String>, CoreError> {
    let mut keys = cache.list_keys()?;
    keys.retain(|k| k != CREDENTIAL_KEY);
    Ok(keys)
}

/// Read one record back as a bug. `Ok(None)` when the key is absent.
pub(crate) fn read_bug(cache: &dyn BugCache, key: &str) -> Result<Option<Bug>, CoreError> {
    let Some(raw) = cache.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| CoreError::Parse {
            key: key.to_owned(),
            message: e.to_string(),
        })
}

/// Persist a bug under its identifier.
#[cfg(test)]
pub(crate) fn write_bug(cache: &dyn BugCache, bug: &Bug) -> Result<(), CoreError> {
    cache.apply_batch(vec![CacheOp::write_bug(bug)?])
}

// ── Credential ───────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    token: String,
}

/// Store the session credential under the reserved key.
pub fn store_credential(cache: &dyn BugCache, token: &SecretString) -> Result<(), CoreError> {
    let record = StoredCredential {
        token: token.expose_secret().to_owned(),
    };
    cache.set(CREDENTIAL_KEY, serde_json::to_string(&record)?)
}

/// Read the session credential, if one was stored.
pub fn load_credential(cache: &dyn BugCache) -> Result<Option<SecretString>, CoreError> {
    let Some(raw) = cache.get(CREDENTIAL_KEY)? else {
        return Ok(None);
    };
    let record: StoredCredential = serde_json::from_str(&raw).map_err(|e| CoreError::Parse {
        key: CREDENTIAL_KEY.to_owned(),
        message: e.to_string(),
    })?;
    Ok(Some(SecretString::from(record.token)))
}

pub fn clear_credential(cache: &dyn BugCache) -> Result<(), CoreError> {
    cache.remove(CREDENTIAL_KEY)
}
