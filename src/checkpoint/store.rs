// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::json_file::{JsonFileDatabase, JsonFilePersister};
use super::schema::{CHECKPOINT_SCOPE, Checkpoint, OFFSET_KEY, decode_checkpoint};
use crate::error::{Error, Result};
use crate::follower::FileId;

/// Durable storage for the tailer's progress marker.
///
/// `load` is called once at startup; `Ok(None)` means no prior checkpoint.
/// `save` failures are tolerated by callers.
pub trait CheckpointStore: Send {
    fn load(&mut self) -> Result<Option<Checkpoint>>;

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        (**self).load()
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }
}

/// Checkpoint store backed by a [`JsonFileDatabase`].
pub struct JsonFileCheckpointStore {
    persister: JsonFilePersister,
    /// Error swallowed while opening a corrupted database, reported by `load`
    open_error: Option<Error>,
}

impl JsonFileCheckpointStore {
    /// Open the store at `path`.
    ///
    /// A corrupted file is not fatal here, it surfaces as a `load` error so the
    /// tailer can start over from the beginning. Failing to prepare the state
    /// directory is fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (db, open_error) = JsonFileDatabase::open_or_reset(path)?;
        Ok(Self::from_database(&db, open_error))
    }

    pub fn from_database(db: &JsonFileDatabase, open_error: Option<Error>) -> Self {
        Self {
            persister: db.persister(CHECKPOINT_SCOPE),
            open_error,
        }
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        if let Some(e) = self.open_error.take() {
            return Err(e);
        }

        self.persister.load()?;

        match self.persister.get_value(OFFSET_KEY) {
            None => Ok(None),
            Some(value) => decode_checkpoint(value)
                .map(Some)
                .map_err(Error::Persistence),
        }
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.persister.set_raw_json(OFFSET_KEY, &checkpoint.to_v1())?;
        self.persister.sync()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    checkpoint: Option<Checkpoint>,
    saves: u64,
    fail_load: bool,
    fail_save: bool,
}

/// In-memory checkpoint store. Clones share the same state, so a test can
/// hand one clone to the pipeline and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.checkpoint = Some(checkpoint);
        }
        store
    }

    /// Make subsequent loads fail
    pub fn fail_loads(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_load = fail;
        }
    }

    /// Make subsequent saves fail
    pub fn fail_saves(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_save = fail;
        }
    }

    pub fn current(&self) -> Option<Checkpoint> {
        self.state.lock().ok().and_then(|s| s.checkpoint.clone())
    }

    /// Number of successful saves
    pub fn saves(&self) -> u64 {
        self.state.lock().map(|s| s.saves).unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        let state = self
            .state
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if state.fail_load {
            return Err(Error::Persistence("checkpoint load failed".to_string()));
        }
        Ok(state.checkpoint.clone())
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if state.fail_save {
            return Err(Error::Persistence("checkpoint save failed".to_string()));
        }
        state.checkpoint = Some(checkpoint.clone());
        state.saves += 1;
        Ok(())
    }
}

/// Load the checkpoint once and decide where the follower should start.
///
/// Never fails: a missing or unreadable checkpoint, a file whose identity
/// changed since the checkpoint was written, or a file shorter than the
/// checkpoint all resume from the beginning.
pub fn resolve_start_offset<S: CheckpointStore + ?Sized>(store: &mut S, path: &Path) -> u64 {
    let checkpoint = match store.load() {
        Ok(Some(cp)) => cp,
        Ok(None) => {
            warn!("No file offset state found, resuming from the start");
            return 0;
        }
        Err(e) => {
            warn!(error = %e, "Unable to load file offset state, resuming from the start");
            return 0;
        }
    };

    let (current_id, current_len) = match std::fs::File::open(path) {
        Ok(file) => {
            let id = FileId::from_file(&file).ok();
            let len = file.metadata().map(|m| m.len()).ok();
            (id, len)
        }
        Err(e) => {
            debug!(path = ?path, error = %e, "Target file not readable while resolving checkpoint");
            return 0;
        }
    };

    if let (Some(saved), Some(current)) = (checkpoint.file_id, current_id) {
        if saved != current {
            warn!(
                saved = %saved,
                current = %current,
                offset = checkpoint.offset,
                "File rotated since last checkpoint, resuming from the start"
            );
            return 0;
        }
    }

    if let Some(len) = current_len {
        if checkpoint.offset > len {
            warn!(
                offset = checkpoint.offset,
                file_size = len,
                "Checkpoint is past the end of the file, resuming from the start"
            );
            return 0;
        }
    }

    info!("Starting at offset {} bytes", checkpoint.offset);
    checkpoint.offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn log_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_json_store_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        let mut store = JsonFileCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), None);

        let cp = Checkpoint::new(128, Some(FileId::new(3, 4)), "/p4/1/logs/log");
        store.save(&cp).unwrap();

        let mut reopened = JsonFileCheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(cp));
    }

    #[test]
    fn test_json_store_corrupted_file_is_load_error_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "garbage").unwrap();

        let mut store = JsonFileCheckpointStore::open(&path).unwrap();
        assert!(store.load().is_err());

        // next load sees an empty store, and saving repairs the file
        assert_eq!(store.load().unwrap(), None);
        store.save(&Checkpoint::offset_only(10)).unwrap();
        let mut reopened = JsonFileCheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap().map(|c| c.offset), Some(10));
    }

    #[test]
    fn test_json_store_reads_legacy_offset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"scopes": {"p4dtail": {"offset": {"offset": 4096.0}}}}"#,
        )
        .unwrap();

        let mut store = JsonFileCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), Some(Checkpoint::offset_only(4096)));
    }

    #[test]
    fn test_resolve_without_checkpoint_starts_at_zero() {
        let file = log_file("line1\nline2\n");
        let mut store = MemoryCheckpointStore::new();
        assert_eq!(resolve_start_offset(&mut store, file.path()), 0);
    }

    #[test]
    fn test_resolve_load_failure_starts_at_zero() {
        let file = log_file("line1\nline2\n");
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::offset_only(6));
        store.fail_loads(true);
        assert_eq!(resolve_start_offset(&mut store, file.path()), 0);
    }

    #[test]
    fn test_resolve_uses_matching_checkpoint() {
        let file = log_file("line1\nline2\n");
        let id = FileId::from_path(file.path()).unwrap();
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::new(6, Some(id), ""));
        assert_eq!(resolve_start_offset(&mut store, file.path()), 6);
    }

    #[test]
    fn test_resolve_legacy_checkpoint_without_identity() {
        let file = log_file("line1\nline2\n");
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::offset_only(6));
        assert_eq!(resolve_start_offset(&mut store, file.path()), 6);
    }

    #[test]
    fn test_resolve_identity_mismatch_starts_at_zero() {
        let file = log_file("line1\nline2\n");
        let id = FileId::from_path(file.path()).unwrap();
        let other = FileId::new(id.dev(), id.ino().wrapping_add(1));
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::new(6, Some(other), ""));
        assert_eq!(resolve_start_offset(&mut store, file.path()), 0);
    }

    #[test]
    fn test_resolve_offset_past_end_starts_at_zero() {
        let file = log_file("short\n");
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::offset_only(1000));
        assert_eq!(resolve_start_offset(&mut store, file.path()), 0);
    }

    #[test]
    fn test_resolve_missing_file_starts_at_zero() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::offset_only(10));
        assert_eq!(
            resolve_start_offset(&mut store, &temp_dir.path().join("missing.log")),
            0
        );
    }

    #[test]
    fn test_memory_store_save_failure() {
        let mut store = MemoryCheckpointStore::new();
        store.fail_saves(true);
        assert!(store.save(&Checkpoint::offset_only(1)).is_err());
        assert_eq!(store.saves(), 0);
        store.fail_saves(false);
        store.save(&Checkpoint::offset_only(1)).unwrap();
        assert_eq!(store.saves(), 1);
    }
}
