//! Claims on registry-managed files.

use std::fmt;
use std::path::PathBuf;

use super::Session;

/// An ordered list of files together with one registry claim per file.
///
/// Cloning takes another claim on every tracked path; dropping gives the
/// claims back, deleting files whose count reaches zero. Source files that
/// were never registered pass through untouched.
pub struct TrackedFiles {
    session: Session,
    paths: Vec<PathBuf>,
}

impl TrackedFiles {
    /// Existing files. Any that are registry-managed gain a holder; plain
    /// source files pass through untouched.
    pub(crate) fn claim(session: &Session, paths: Vec<PathBuf>) -> Self {
        session.retain(&paths);
        Self {
            session: session.clone(),
            paths,
        }
    }

    /// Freshly produced files, registered with a count of 1 each.
    pub(crate) fn adopt(session: &Session, paths: Vec<PathBuf>) -> Self {
        session.register(&paths);
        Self {
            session: session.clone(),
            paths,
        }
    }

    /// Concatenate several claim sets without touching the counts.
    pub(crate) fn concat(session: &Session, parts: Vec<TrackedFiles>) -> Self {
        let mut paths = Vec::new();
        for mut part in parts {
            paths.append(&mut part.paths);
        }
        Self {
            session: session.clone(),
            paths,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Clone for TrackedFiles {
    fn clone(&self) -> Self {
        self.session.retain(&self.paths);
        Self {
            session: self.session.clone(),
            paths: self.paths.clone(),
        }
    }
}

impl Drop for TrackedFiles {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            self.session.release(&self.paths);
        }
    }
}

impl fmt::Debug for TrackedFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.paths.iter()).finish()
    }
}
