//! Reference-counted table of temporary files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Temporary output files and the number of holders of each.
///
/// A path enters with a count of 1 when the executor produces it and
/// leaves when its count returns to zero. Paths that were never
/// registered (source files) are ignored by `retain`/`release`.
///
/// This type only does the bookkeeping. The session owns it behind a
/// mutex and performs the physical deletion while still holding the lock.
#[derive(Debug, Default)]
pub struct TempFileRegistry {
    entries: HashMap<PathBuf, usize>,
}

/// Outcome of releasing one claim on a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// The path is not registry-managed.
    Untracked,
    /// Other holders remain.
    Retained(usize),
    /// The last holder is gone; the file must be deleted.
    Removed(PathBuf),
}

impl TempFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly produced file with a count of 1.
    ///
    /// Returns false if the path was already tracked (the count is left alone).
    pub fn register(&mut self, path: PathBuf) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, 1);
        true
    }

    /// Add a holder to a tracked path. Returns the new count.
    pub fn retain(&mut self, path: &Path) -> Option<usize> {
        let count = self.entries.get_mut(path)?;
        *count += 1;
        Some(*count)
    }

    /// Drop a holder from a path.
    pub fn release(&mut self, path: &Path) -> Release {
        let Some(count) = self.entries.get_mut(path) else {
            return Release::Untracked;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return Release::Retained(*count);
        }
        match self.entries.remove_entry(path) {
            Some((path, _)) => Release::Removed(path),
            None => Release::Untracked,
        }
    }

    pub fn count(&self, path: &Path) -> usize {
        self.entries.get(path).copied().unwrap_or(0)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Tracked paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry, returning the paths that were tracked.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.drain().map(|(p, _)| p).collect();
        paths.sort();
        paths
    }
}
