//! Process-wide state shared by every dataset: engine, options,
//! temp-file registry and metadata cache.
//!
//! A [`Session`] is a cheap handle (`Arc`) that is created explicitly and
//! passed to [`Dataset::open`](crate::Dataset::open). Tests build their own
//! session around a mock engine; applications typically use
//! [`Session::from_env`].

mod registry;
mod tracked;

pub use registry::{Release, TempFileRegistry};
pub use tracked::TrackedFiles;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use grid_engine::{CdoEngine, Engine, FileInfo};
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, MetadataCache};
use crate::config::SessionConfig;
use crate::error::{GridError, Result};

static SESSION_IDS: AtomicU64 = AtomicU64::new(0);

/// Shared handle to the engine, options and the temp-file registry.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: u64,
    config: SessionConfig,
    engine: Arc<dyn Engine>,
    registry: Mutex<TempFileRegistry>,
    metadata: Mutex<MetadataCache>,
    lazy: AtomicBool,
    parallel: AtomicBool,
    names: AtomicU64,
    pool: OnceLock<rayon::ThreadPool>,
}

impl Session {
    /// Create a session around an engine.
    pub fn new(config: SessionConfig, engine: Arc<dyn Engine>) -> Result<Self> {
        config.validate().map_err(GridError::Config)?;

        let id = SESSION_IDS.fetch_add(1, Ordering::Relaxed);
        info!(
            session = id,
            engine = engine.name(),
            temp_dir = %config.temp_dir.display(),
            lazy = config.lazy,
            parallel = config.parallel,
            "Starting session"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                metadata: Mutex::new(MetadataCache::new(config.metadata_cache_entries)),
                lazy: AtomicBool::new(config.lazy),
                parallel: AtomicBool::new(config.parallel),
                registry: Mutex::new(TempFileRegistry::new()),
                names: AtomicU64::new(0),
                pool: OnceLock::new(),
                engine,
                config,
            }),
        })
    }

    /// Create a session from environment variables, running CDO.
    pub fn from_env() -> Result<Self> {
        let config = SessionConfig::from_env();
        let engine = Arc::new(CdoEngine::new(config.cdo_path.clone()));
        Self::new(config, engine)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &dyn Engine {
        self.inner.engine.as_ref()
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.lazy.load(Ordering::SeqCst)
    }

    /// Switch between queueing (lazy) and immediate execution.
    pub fn set_lazy(&self, lazy: bool) {
        self.inner.lazy.store(lazy, Ordering::SeqCst);
    }

    pub fn is_parallel(&self) -> bool {
        self.inner.parallel.load(Ordering::SeqCst)
    }

    pub fn set_parallel(&self, parallel: bool) {
        self.inner.parallel.store(parallel, Ordering::SeqCst);
    }

    /// Temporary files currently tracked by the registry, sorted.
    pub fn session_files(&self) -> Vec<PathBuf> {
        self.registry().paths()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.registry().contains(path)
    }

    /// Number of holders of a tracked file (0 if untracked).
    pub fn reference_count(&self, path: &Path) -> usize {
        self.registry().count(path)
    }

    /// Metadata for a file, served from the cache when possible.
    pub fn inspect(&self, path: &Path) -> Result<FileInfo> {
        if let Some(info) = self.metadata().get(path) {
            return Ok(info);
        }
        let info = self.inner.engine.inspect(path)?;
        self.metadata().insert(path.to_path_buf(), info.clone());
        Ok(info)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.metadata().stats()
    }

    /// A fresh, unused path in the temp directory.
    pub(crate) fn temp_path(&self, suffix: &str) -> PathBuf {
        let count = self.inner.names.fetch_add(1, Ordering::Relaxed);
        self.inner.config.temp_dir.join(format!(
            "lazygrid_{}_{}_{}{}",
            std::process::id(),
            self.inner.id,
            count,
            suffix
        ))
    }

    /// Worker pool for parallel mode, built on first use.
    pub(crate) fn pool(&self) -> Result<&rayon::ThreadPool> {
        if let Some(pool) = self.inner.pool.get() {
            return Ok(pool);
        }
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.inner.config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| GridError::Config(format!("worker pool: {}", e)))?;
        Ok(self.inner.pool.get_or_init(|| pool))
    }

    pub(crate) fn register(&self, paths: &[PathBuf]) {
        let mut registry = self.registry();
        for path in paths {
            if registry.register(path.clone()) {
                debug!(path = %path.display(), "Registered temp file");
            }
        }
    }

    pub(crate) fn retain(&self, paths: &[PathBuf]) {
        let mut registry = self.registry();
        for path in paths {
            registry.retain(path);
        }
    }

    pub(crate) fn release(&self, paths: &[PathBuf]) {
        let mut registry = self.registry();
        for path in paths {
            if let Release::Removed(path) = registry.release(path) {
                self.delete(&path);
            }
        }
    }

    /// Remove an output that was never registered (failed invocation).
    pub(crate) fn discard(&self, path: &Path) {
        if path.exists() {
            self.delete(path);
        }
    }

    /// Delete every tracked file and empty the registry.
    ///
    /// Datasets still holding those files see them as untracked afterwards.
    /// Returns the number of files removed from the registry.
    pub fn cleanup(&self) -> usize {
        let paths = self.registry().drain();
        for path in &paths {
            self.delete(path);
        }
        if !paths.is_empty() {
            info!(session = self.inner.id, files = paths.len(), "Cleaned up session files");
        }
        paths.len()
    }

    fn delete(&self, path: &Path) {
        self.metadata().invalidate(path);
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Deleted temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete temp file"),
        }
    }

    fn registry(&self) -> MutexGuard<'_, TempFileRegistry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn metadata(&self) -> MutexGuard<'_, MetadataCache> {
        self.inner
            .metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for path in registry.drain() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to delete temp file at teardown");
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("engine", &self.inner.engine.name())
            .field("lazy", &self.is_lazy())
            .field("parallel", &self.is_parallel())
            .finish()
    }
}
