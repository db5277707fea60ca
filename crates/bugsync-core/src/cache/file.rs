// ── File-backed cache ──
//
// The whole keyspace lives in one JSON object on disk. Every write takes
// an exclusive advisory lock on `cache.lock`, re-reads the document,
// applies its changes and replaces the file through a temp file and a
// rename. Several processes can share one cache directory without
// overwriting each other's records, and a crash leaves either the old
// document or the new one.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use fs2::FileExt;
use tracing::debug;

use super::{BugCache, CacheOp};
use crate::error::CoreError;

const CACHE_FILE: &str = "cache.json";
const CACHE_TEMP: &str = "cache.json.tmp";
const LOCK_FILE: &str = "cache.lock";

/// Identity of the document last read, to notice writes by other handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug)]
struct Loaded {
    entries: BTreeMap<String, String>,
    stamp: Option<Stamp>,
}

/// Durable cache stored as `<dir>/cache.json`.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    loaded: Mutex<Loaded>,
}

impl FileCache {
    /// Open (or create) the cache in `dir`.
    ///
    /// A missing file is an empty cache. A file that is not a JSON object
    /// of strings is a storage error; it is left on disk untouched.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(CoreError::storage)?;

        let loaded = read_document(&dir.join(CACHE_FILE))?;
        debug!(dir = %dir.display(), records = loaded.entries.len(), "cache opened");

        Ok(Self {
            dir,
            loaded: Mutex::new(loaded),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_loaded(&self) -> Result<MutexGuard<'_, Loaded>, CoreError> {
        self.loaded
            .lock()
            .map_err(|_| CoreError::Internal("cache lock poisoned".into()))
    }

    /// The in-memory copy, reloaded first if another handle replaced the file.
    fn current(&self) -> Result<MutexGuard<'_, Loaded>, CoreError> {
        let mut loaded = self.lock_loaded()?;
        let path = self.path();
        if stamp_of(&path)? != loaded.stamp {
            debug!(path = %path.display(), "cache changed on disk, reloading");
            *loaded = read_document(&path)?;
        }
        Ok(loaded)
    }

    /// Exclusive lock on the cache directory, released when the handle drops.
    fn lock_dir(&self) -> Result<File, CoreError> {
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))
            .map_err(CoreError::storage)?;
        FileExt::lock_exclusive(&lock).map_err(CoreError::storage)?;
        Ok(lock)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), CoreError> {
        let data = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.dir.join(CACHE_TEMP);

        let mut file = File::create(&temp_path).map_err(CoreError::storage)?;
        file.write_all(&data).map_err(CoreError::storage)?;
        file.sync_all().map_err(CoreError::storage)?;
        drop(file);

        fs::rename(&temp_path, self.path()).map_err(CoreError::storage)
    }
}

impl BugCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.current()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), CoreError> {
        self.apply_batch(vec![CacheOp::Set {
            key: key.to_owned(),
            value,
        }])
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.apply_batch(vec![CacheOp::remove(key)])
    }

    fn list_keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.current()?.entries.keys().cloned().collect())
    }

    /// Re-read under the directory lock, apply every op, write once.
    fn apply_batch(&self, ops: Vec<CacheOp>) -> Result<(), CoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut loaded = self.lock_loaded()?;
        let _dir_lock = self.lock_dir()?;

        let mut fresh = read_document(&self.path())?;
        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    fresh.entries.insert(key, value);
                }
                CacheOp::Remove { key } => {
                    fresh.entries.remove(&key);
                }
            }
        }

        if let Err(e) = self.flush(&fresh.entries) {
            // Force a reload so memory follows whatever is on disk.
            loaded.stamp = None;
            return Err(e);
        }
        fresh.stamp = stamp_of(&self.path())?;
        *loaded = fresh;
        Ok(())
    }
}

fn stamp_of(path: &Path) -> Result<Option<Stamp>, CoreError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(Stamp {
            len: meta.len(),
            modified: meta.modified().ok(),
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::storage(e)),
    }
}

fn read_document(path: &Path) -> Result<Loaded, CoreError> {
    let stamp = stamp_of(path)?;
    let entries = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| CoreError::Storage {
            message: format!("{} is corrupt: {e}", path.display()),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(CoreError::storage(e)),
    };
    Ok(Loaded { entries, stamp })
}
