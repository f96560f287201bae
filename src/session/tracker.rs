//! File-Modification Tracker
//!
//! Collects the paths written or edited during one run. Paths compare
//! case-insensitively; the first spelling seen is the one kept.

use log::info;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::protocol::EventLine;

#[derive(Debug, Default, Clone)]
pub struct ModifiedFiles {
    /// Paths in the order they were first reported
    paths: Vec<String>,
    /// Lower-cased keys for de-duplication
    seen: HashSet<String>,
}

impl ModifiedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path; returns false if it (or a case variant) was already present
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if path.is_empty() || !self.seen.insert(path.to_lowercase()) {
            return false;
        }
        self.paths.push(path);
        true
    }

    /// Inspect a classified line and record the file it modifies, if any.
    /// Returns the newly tracked path.
    pub fn track(&mut self, event: &EventLine) -> Option<String> {
        let path = event.modified_file()?;
        if self.insert(path.clone()) {
            info!("[FileTrack] Modified: {}", path);
            Some(path)
        } else {
            None
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.seen.contains(&path.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.seen.clear();
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.paths.clone()
    }

    /// Absolute paths, with relative entries joined onto `base`
    pub fn resolved(&self, base: &Path) -> Vec<PathBuf> {
        self.paths
            .iter()
            .map(|p| {
                let path = Path::new(p);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    base.join(path)
                }
            })
            .collect()
    }
}
