/// Progress persistence — key-value stores for playback snapshots.
///
/// Values are opaque serialized snapshots; the playback engine owns the
/// schema. Store failures are recoverable by contract: read errors fall
/// back to a fresh session, write errors are logged and playback continues.
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::schema::story::StoryId;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Deterministic persistence key for one story's progress.
pub fn progress_key(story: &StoryId) -> String {
    format!("story-progress-{story}")
}

/// Key-value persistence for playback snapshots.
pub trait ProgressStore {
    fn get(&self, key: &str) -> Result<Option<String>, ProgressError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ProgressError>;
}

/// In-memory store for tests and previews. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ProgressError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ProgressError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store: one JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl ProgressStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ProgressError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ProgressError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}
