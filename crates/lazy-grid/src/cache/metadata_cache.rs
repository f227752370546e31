//! LRU cache for file metadata.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use grid_engine::FileInfo;
use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Metadata per file path, so compatibility checks do not re-run the engine.
pub struct MetadataCache {
    cache: LruCache<PathBuf, FileInfo>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl MetadataCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a path, counting the hit or miss.
    pub fn get(&mut self, path: &Path) -> Option<FileInfo> {
        match self.cache.get(path) {
            Some(info) => {
                self.hits += 1;
                Some(info.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, path: PathBuf, info: FileInfo) {
        if let Some((evicted, _)) = self.cache.push(path.clone(), info) {
            if evicted != path {
                self.evictions += 1;
            }
        }
    }

    /// Forget a path, e.g. after its file was deleted.
    pub fn invalidate(&mut self, path: &Path) {
        self.cache.pop(path);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.cache.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
