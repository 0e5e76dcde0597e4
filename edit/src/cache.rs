//! In-memory working copy of file contents.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mender_utils::recover_bak_file;

/// Last-known content per resolved path.
///
/// Edits are applied against this copy first; the disk follows on success.
#[derive(Debug, Default, Clone)]
pub struct ContentCache {
    entries: HashMap<PathBuf, String>,
}

impl ContentCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.entries.insert(path.into(), content.into());
    }

    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.entries.remove(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Cached content for `path`, reading and caching it from disk on a miss.
    pub fn load(&mut self, path: &Path) -> io::Result<String> {
        if let Some(content) = self.entries.get(path) {
            return Ok(content.clone());
        }
        recover_bak_file(path);
        let content = fs::read_to_string(path)?;
        self.entries.insert(path.to_path_buf(), content.clone());
        Ok(content)
    }
}
