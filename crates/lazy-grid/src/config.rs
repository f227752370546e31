//! Configuration for a processing session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Queue operations until a result is needed (false: run each call now).
    pub lazy: bool,

    /// Fan per-file invocations out over a worker pool.
    pub parallel: bool,

    /// Worker pool size for parallel mode (None: rayon's default).
    pub threads: Option<usize>,

    /// Fuse consecutive chainable steps into one engine call.
    pub fuse: bool,

    /// Directory for temporary output files.
    pub temp_dir: PathBuf,

    /// Engine program to run.
    pub cdo_path: String,

    /// Number of file metadata entries kept in memory.
    pub metadata_cache_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lazy: true,
            parallel: false,
            threads: None,
            fuse: true,
            temp_dir: optimal_temp_dir(),
            cdo_path: "cdo".to_string(),
            metadata_cache_entries: 256,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LAZYGRID_LAZY") {
            config.lazy = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("LAZYGRID_PARALLEL") {
            config.parallel = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("LAZYGRID_THREADS") {
            if let Ok(threads) = val.parse() {
                config.threads = Some(threads);
            }
        }

        if let Ok(val) = std::env::var("LAZYGRID_FUSE") {
            config.fuse = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("LAZYGRID_TEMP_DIR") {
            config.temp_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("LAZYGRID_CDO") {
            config.cdo_path = val;
        }

        if let Ok(val) = std::env::var("LAZYGRID_METADATA_CACHE") {
            if let Ok(entries) = val.parse() {
                config.metadata_cache_entries = entries;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.metadata_cache_entries == 0 {
            return Err("metadata_cache_entries must be > 0".to_string());
        }

        if self.threads == Some(0) {
            return Err("threads must be > 0".to_string());
        }

        if self.cdo_path.trim().is_empty() {
            return Err("cdo_path must not be empty".to_string());
        }

        if !self.temp_dir.is_dir() {
            return Err(format!(
                "temp_dir {} is not a directory",
                self.temp_dir.display()
            ));
        }

        Ok(())
    }

    /// Use a specific temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fuse(mut self, fuse: bool) -> Self {
        self.fuse = fuse;
        self
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the optimal temp directory for intermediate files.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available for faster I/O.
/// Falls back to the system temp directory on other platforms or if /dev/shm is unavailable.
pub fn optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        use std::path::Path;
        let shm_path = Path::new("/dev/shm");
        if shm_path.is_dir() {
            let test_path = shm_path.join(format!(".lazygrid_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}
