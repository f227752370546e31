//! Lazy operation pipelines over gridded scientific datasets.
//!
//! A [`Dataset`] wraps one or more data files. Transformations (arithmetic,
//! reductions, selections, anomalies) are validated immediately and then
//! queued; the queue is only handed to the external engine when a result is
//! needed. Every intermediate file the engine writes is tracked by the
//! [`Session`]'s reference-counted registry and deleted as soon as nothing
//! refers to it any more.
//!
//! # Architecture
//!
//! ```text
//! ds.add(&mut other)?          ds.spatial_mean()?
//!      │                             │
//!      ▼                             ▼
//! validate (TypeError / ValueError against the projected layout)
//!      │
//!      ▼
//! Pipeline [CommandNode, CommandNode, ...]
//!      │  ds.run() / export / eager session
//!      ▼
//! Executor
//!      ├─► fuse chainable nodes into groups
//!      ├─► one Invocation per file and group (optionally on a rayon pool)
//!      ├─► Engine::execute  ──►  `cdo -fldmean -add in.nc other.nc out.nc`
//!      └─► register outputs, release the previous intermediates
//!               │
//!               ▼
//!      TempFileRegistry (path -> holders), deletes at count 0
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lazy_grid::{Dataset, Session};
//!
//! let session = Session::from_env()?;
//! let mut sst = Dataset::open(&session, ["sst.nc"])?;
//! let mut clim = Dataset::open(&session, ["sst_clim.nc"])?;
//!
//! sst.subtract(&mut clim)?.spatial_mean()?;
//! let table = sst.to_table()?;
//! ```

pub mod anomaly;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod recipe;
pub mod session;
pub mod validate;

// Re-export commonly used types at crate root
pub use anomaly::{AnomalyOptions, Baseline, Metric, Period};
pub use cache::CacheStats;
pub use config::SessionConfig;
pub use dataset::{Dataset, OperandArg};
pub use error::{GridError, Result};
pub use pipeline::{CommandNode, Operand, Operator, Snapshot, SplitBy, TimeGroup};
pub use recipe::{Recipe, RecipeStep};
pub use session::Session;
pub use validate::TimeMatch;

pub use grid_engine::{Engine, FileInfo, GridArray, GridShape, Precision, Table};
