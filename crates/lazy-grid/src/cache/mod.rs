//! Caching for engine metadata queries.

mod metadata_cache;

pub use metadata_cache::{CacheStats, MetadataCache};
