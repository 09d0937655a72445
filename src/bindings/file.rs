//! Bindings file persistence
//!
//! The file is a JSON array of `{ "key": ..., "target": ... }` records.
//! Loading is lenient: a bad record is skipped, a missing file is an empty
//! store. A file that does not parse at all is renamed to `<file>.corrupt`
//! first so nothing is lost when the next edit saves. Saving replaces the
//! file through a temporary file and a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::store::BindingStore;
use crate::hotkey::Key;

/// Errors that can occur while writing the bindings file
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode bindings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One record as found on disk, before validation
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "Key")]
    key: Option<String>,
    #[serde(default, alias = "Path")]
    target: Option<String>,
}

/// The file backing a `BindingStore`
#[derive(Debug, Clone)]
pub struct BindingsFile {
    path: PathBuf,
}

impl BindingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored bindings
    ///
    /// Never fails: unreadable or malformed content is logged and skipped.
    /// A file that cannot be parsed as a whole is moved to `corrupt_path`.
    pub fn load(&self) -> BindingStore {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = ?self.path, "no bindings file yet, starting empty");
                return BindingStore::new();
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(path = ?self.path, %e, "bindings file is not text, starting empty");
                self.set_aside();
                return BindingStore::new();
            }
            Err(e) => {
                warn!(path = ?self.path, %e, "failed to read bindings file, starting empty");
                return BindingStore::new();
            }
        };

        let records: Vec<Value> = match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = ?self.path, %e, "bindings file is not a list of records, starting empty");
                self.set_aside();
                return BindingStore::new();
            }
        };

        let mut store = BindingStore::new();
        let mut skipped = 0;
        for (index, record) in records.into_iter().enumerate() {
            match parse_record(record) {
                Ok((key, target)) => {
                    if store.get(key).is_some() {
                        debug!(%key, index, "duplicate binding, later record wins");
                    }
                    store.set(key, &target);
                }
                Err(reason) => {
                    warn!(index, %reason, "skipping malformed binding record");
                    skipped += 1;
                }
            }
        }

        info!(path = ?self.path, loaded = store.len(), skipped, "bindings loaded");
        store
    }

    /// Where an unparseable file is moved so the next save cannot destroy it
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    fn set_aside(&self) {
        let corrupt = self.corrupt_path();
        match fs::rename(&self.path, &corrupt) {
            Ok(()) => warn!(moved_to = ?corrupt, "unreadable bindings file kept aside"),
            Err(e) => warn!(path = ?self.path, %e, "failed to move unreadable bindings file aside"),
        }
    }

    /// Replace the file contents with every binding in `store`
    pub fn save(&self, store: &BindingStore) -> Result<(), PersistError> {
        let io_err = |source: io::Error| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(&store.all())?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;

        debug!(path = ?self.path, bindings = store.len(), "bindings saved");
        Ok(())
    }
}

fn parse_record(record: Value) -> Result<(Key, String), String> {
    let raw: RawRecord = serde_json::from_value(record).map_err(|e| e.to_string())?;
    let key_name = raw.key.ok_or("missing key")?;
    let target = raw.target.ok_or("missing target")?;
    let key = key_name.parse::<Key>().map_err(|e| e.to_string())?;
    if target.trim().is_empty() {
        return Err(format!("blank target for {key}"));
    }
    Ok((key, target))
}
