//! Shared setup for integration tests: a session over a [`MockEngine`]
//! writing into a scratch directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_grid::{Dataset, Session, SessionConfig};
use tempfile::TempDir;
use test_utils::{init_test_tracing, Fixtures, MockEngine};

pub struct Harness {
    pub session: Session,
    pub engine: Arc<MockEngine>,
    pub fixtures: Fixtures,
    temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_config(configure: impl FnOnce(SessionConfig) -> SessionConfig) -> Self {
        init_test_tracing();
        let temp = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let config = configure(SessionConfig::default().with_temp_dir(temp.path()));
        let session = Session::new(config, engine.clone()).unwrap();
        Self {
            session,
            engine,
            fixtures: Fixtures::new(),
            temp,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp.path()
    }

    /// Files currently present in the session's temp directory.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    pub fn open(&self, path: &Path) -> Dataset {
        Dataset::open(&self.session, [path]).unwrap()
    }

    pub fn open_all(&self, paths: &[PathBuf]) -> Dataset {
        Dataset::open(&self.session, paths).unwrap()
    }
}

/// Every value of `variable`, in table order.
pub fn values(ds: &mut Dataset, variable: &str) -> Vec<f64> {
    ds.to_table().unwrap().values(variable)
}
