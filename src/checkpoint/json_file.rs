// SPDX-License-Identifier: Apache-2.0

//! JSON file-based persistence with atomic writes.
//!
//! State is kept as a JSON document of scopes, each holding a map of keys to
//! raw JSON values. Writes are atomic using a write-to-temp-then-rename strategy.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// State stored in the JSON file
#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseState {
    scopes: HashMap<String, HashMap<String, serde_json::Value>>,
}

/// A shared JSON file database handle
#[derive(Clone)]
pub struct JsonFileDatabase {
    path: PathBuf,
    state: Arc<RwLock<DatabaseState>>,
}

impl JsonFileDatabase {
    /// Open or create a database at the given path.
    ///
    /// Fails if the parent directory cannot be created or the existing file
    /// cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path)
                .map_err(|e| Error::Persistence(format!("failed to open database: {}", e)))?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader)
                .map_err(|e| Error::Persistence(format!("failed to parse database: {}", e)))?
        } else {
            ensure_parent_dir(&path)?;
            DatabaseState::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Open the database, discarding a corrupted file instead of failing.
    ///
    /// Returns the database and the parse error, if one was swallowed. The
    /// corrupted file is only replaced on the next sync.
    pub fn open_or_reset(path: impl AsRef<Path>) -> Result<(Self, Option<Error>)> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(db) => Ok((db, None)),
            Err(e @ Error::Persistence(_)) if path.is_file() => {
                ensure_parent_dir(path)?;
                let db = Self {
                    path: path.to_path_buf(),
                    state: Arc::new(RwLock::new(DatabaseState::default())),
                };
                Ok((db, Some(e)))
            }
            Err(e) => Err(e),
        }
    }

    /// Create a scoped persister
    pub fn persister(&self, scope: impl Into<String>) -> JsonFilePersister {
        JsonFilePersister::new(self.path.clone(), self.state.clone(), scope.into())
    }
}

/// A persister backed by a JSON file, scoped to a particular component.
pub struct JsonFilePersister {
    path: PathBuf,
    state: Arc<RwLock<DatabaseState>>,
    scope: String,
    cache: HashMap<String, serde_json::Value>,
}

impl JsonFilePersister {
    fn new(path: PathBuf, state: Arc<RwLock<DatabaseState>>, scope: String) -> Self {
        Self {
            path,
            state,
            scope,
            cache: HashMap::new(),
        }
    }

    /// Set a raw JSON value (stored as-is so the file stays human-readable)
    pub fn set_raw_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| Error::Persistence(format!("failed to serialize to JSON: {}", e)))?;
        self.cache.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get the raw JSON value for a key, if present
    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.cache.get(key)
    }

    /// Load data from the underlying storage into the cache.
    pub fn load(&mut self) -> Result<()> {
        let state = self
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        self.cache.clear();

        if let Some(scope_data) = state.scopes.get(&self.scope) {
            for (key, value) in scope_data {
                self.cache.insert(key.clone(), value.clone());
            }
        }

        Ok(())
    }

    /// Sync the cache to the underlying storage.
    pub fn sync(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|e| Error::Persistence(e.to_string()))?;

            let scope_data = state.scopes.entry(self.scope.clone()).or_default();
            scope_data.clear();
            for (key, value) in &self.cache {
                scope_data.insert(key.clone(), value.clone());
            }
        }

        let state = self
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        atomic_write(&self.path, &state)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create database directory: {}", e))
            })?;
        }
    }
    Ok(())
}

/// Write state to file atomically (write to temp, then rename)
fn atomic_write(path: &Path, state: &DatabaseState) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    ensure_parent_dir(path)?;

    // Process ID plus a counter keeps concurrent writers off each other's temp files
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)
        .map_err(|e| Error::Persistence(format!("failed to write database: {}", e)))?;

    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush database: {}", e)))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .map_err(|e| Error::Persistence(format!("failed to rename database file: {}", e)))?;

    Ok(())
}
