use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::CREDENTIAL_KEY;
use crate::error::SyncError;
use crate::stats::CachedStats;

const STORE_VERSION: u32 = 1;
const STORE_DIR: &str = "bingo_stats";
const STORE_FILE: &str = "store.json";
const STATS_KEY_PREFIX: &str = "bingoStats_";

/// String key/value slots that outlive the process. Values are opaque strings;
/// callers decide how to encode them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreFile {
    version: u32,
    entries: HashMap<String, String>,
}

/// Store backed by one JSON file. Every read goes to disk so writes from
/// another process show up without a restart.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn open_default() -> Result<Self> {
        let path = default_store_path().context("unable to resolve store path")?;
        Ok(Self::open(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = load_store_file(&self.path);
        file.version = STORE_VERSION;
        apply(&mut file.entries);
        save_store_file(&self.path, &file)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(load_store_file(&self.path).entries.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }
}

/// In-process store, handy for tests and for embedding without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn stats_cache_key(user_id: &str) -> String {
    format!("{STATS_KEY_PREFIX}{user_id}")
}

/// `Ok(None)` when nothing is cached or the store can't be read; a payload that
/// exists but doesn't decode is reported as `MalformedCachePayload`.
pub fn load_cached_stats(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<Option<CachedStats>, SyncError> {
    let key = stats_cache_key(user_id);
    let raw = match store.get(&key) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(%key, error = %err, "local stats store unreadable");
            return Ok(None);
        }
    };
    match raw {
        Some(raw) if !raw.trim().is_empty() => CachedStats::from_json(&raw).map(Some),
        _ => Ok(None),
    }
}

pub fn store_cached_stats(
    store: &dyn KeyValueStore,
    user_id: &str,
    stats: &CachedStats,
) -> Result<()> {
    let json = serde_json::to_string(stats).context("serialize cached stats")?;
    store.set(&stats_cache_key(user_id), &json)
}

pub fn read_credential(store: &dyn KeyValueStore) -> Option<String> {
    match store.get(CREDENTIAL_KEY) {
        Ok(token) => token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        Err(err) => {
            tracing::warn!(error = %err, "credential slot unreadable");
            None
        }
    }
}

fn load_store_file(path: &Path) -> StoreFile {
    let Ok(raw) = fs::read_to_string(path) else {
        return StoreFile::default();
    };
    let Ok(file) = serde_json::from_str::<StoreFile>(&raw) else {
        tracing::warn!(path = %path.display(), "store file is corrupt, starting empty");
        return StoreFile::default();
    };
    if file.version != STORE_VERSION {
        return StoreFile::default();
    }
    file
}

fn save_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(file).context("serialize store")?;
    fs::write(&tmp, json).context("write store")?;
    fs::rename(&tmp, path).context("swap store")?;
    Ok(())
}

pub fn default_store_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(STORE_DIR).join(STORE_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join(STORE_DIR)
            .join(STORE_FILE),
    )
}
