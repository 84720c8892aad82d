/// Story catalog — the in-memory registry of loaded story files.
///
/// Built once at startup from content files and passed by reference into
/// playback, never a global, so tests can substitute fixtures.
use log::warn;
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::story::{StoryFile, StoryId, StoryParseError, StorySummary};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse story file: {0}")]
    Parse(#[from] StoryParseError),
}

/// Immutable (after loading) collection of stories keyed by story id.
/// Listing order follows insertion order, so directory loads stay stable.
#[derive(Debug, Clone, Default)]
pub struct StoryCatalog {
    stories: FxHashMap<StoryId, StoryFile>,
    order: Vec<StoryId>,
}

impl StoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a story, replacing any previous entry with the same id.
    /// Content findings are logged, not rejected; playback tolerates them.
    pub fn insert(&mut self, story: StoryFile) {
        for issue in story.validate() {
            warn!("story '{}': {issue}", story.story.id);
        }
        let id = story.story.id.clone();
        if !self.stories.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.stories.insert(id, story);
    }

    pub fn get_by_id(&self, id: &StoryId) -> Option<&StoryFile> {
        self.stories.get(id)
    }

    /// Summary metadata for every story, in insertion order, for the
    /// catalog browsing screens.
    pub fn summaries(&self) -> impl Iterator<Item = &StorySummary> {
        self.order
            .iter()
            .filter_map(|id| self.stories.get(id))
            .map(|story| &story.story)
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Load every `.json` story file in a directory, sorted by file name.
    pub fn load_from_dir(dir: &Path) -> Result<StoryCatalog, CatalogError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = StoryCatalog::new();
        for path in &paths {
            catalog.insert(StoryFile::load_from_json(path)?);
        }
        Ok(catalog)
    }
}
