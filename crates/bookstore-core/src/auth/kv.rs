//! Key-value persistence backing the session store.
//!
//! Every write is a batch so related keys change together: a reader of
//! the same store sees either the whole batch or none of it.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// One change in a batch: `Some` sets the value, `None` removes the key.
pub type Change<'a> = (&'a str, Option<&'a str>);

pub trait KeyValueStore: Send + Sync {
    /// Read several keys in one consistent snapshot.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

    /// Apply all changes as one unit.
    fn write_batch(&self, changes: &[Change<'_>]) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_many(&[key])?.pop().flatten())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let changes: Vec<Change<'_>> = keys.iter().map(|k| (*k, None)).collect();
        self.write_batch(&changes)
    }

    /// Remove `keys` only if `guard` currently holds `expected`, checked
    /// and applied as one unit. Returns whether the keys were removed.
    fn remove_many_if(&self, guard: &str, expected: &str, keys: &[&str]) -> Result<bool, StoreError>;
}

fn removals<'a>(keys: &[&'a str]) -> Vec<Change<'a>> {
    keys.iter().map(|k| (*k, None)).collect()
}

/// Volatile store, for tests and sessions that should not outlive the process.
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
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(keys.iter().map(|k| entries.get(*k).cloned()).collect())
    }

    fn write_batch(&self, changes: &[Change<'_>]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        apply(&mut entries, changes);
        Ok(())
    }

    fn remove_many_if(&self, guard: &str, expected: &str, keys: &[&str]) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        if entries.get(guard).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        apply(&mut entries, &removals(keys));
        Ok(true)
    }
}

/// Store persisted as a single JSON object file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so the file on disk is always a complete snapshot.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Sorted for stable diffs when inspecting the file by hand
        let sorted: BTreeMap<_, _> = entries.iter().collect();
        let contents = serde_json::to_string_pretty(&sorted)?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "Store written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let entries = self.read_entries()?;
        Ok(keys.iter().map(|k| entries.get(*k).cloned()).collect())
    }

    fn write_batch(&self, changes: &[Change<'_>]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Serialize(e)) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable store file");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        apply(&mut entries, changes);
        self.write_entries(&entries)
    }

    fn remove_many_if(&self, guard: &str, expected: &str, keys: &[&str]) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut entries = self.read_entries()?;
        if entries.get(guard).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        apply(&mut entries, &removals(keys));
        self.write_entries(&entries)?;
        Ok(true)
    }
}

fn apply(entries: &mut HashMap<String, String>, changes: &[Change<'_>]) {
    for (key, value) in changes {
        match value {
            Some(value) => {
                entries.insert((*key).to_string(), (*value).to_string());
            }
            None => {
                entries.remove(*key);
            }
        }
    }
}
