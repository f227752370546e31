//! Boundary to the external grid-processing engine.
//!
//! Lazy pipelines never compute grid values themselves. Every transformation
//! is handed to an external program as an operator chain over files, and
//! everything this crate knows about a file comes back from that program:
//!
//! ```text
//! Invocation { steps, inputs, output }
//!      │
//!      ▼
//! Engine::execute ──► `cdo -fldmean -addc,1 in.nc out.nc`
//!      │
//!      ▼
//! produced files ──► Engine::inspect / Engine::read_table
//! ```
//!
//! [`CdoEngine`] is the production implementation. Tests substitute their
//! own [`Engine`] so that no CDO installation is needed.

pub mod cdo;
pub mod error;
pub mod invocation;
pub mod metadata;
pub mod table;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub use cdo::CdoEngine;
pub use error::{EngineError, EngineResult};
pub use invocation::{Invocation, OutputTarget, Precision, StatDate, Step, StepOperand};
pub use metadata::{FileInfo, GridShape};
pub use table::{GridArray, Record, Table};

/// An external program that executes operator chains over files.
///
/// Implementations must be safe to call from several threads at once;
/// parallel sessions fan invocations out over a worker pool.
pub trait Engine: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run one invocation and return the files it produced.
    ///
    /// On failure no output may be reported; the caller removes any
    /// partially written file.
    fn execute(&self, invocation: &Invocation) -> EngineResult<Vec<PathBuf>>;

    /// Read variable names, grid shape and time axis of a file.
    fn inspect(&self, path: &Path) -> EngineResult<FileInfo>;

    /// Read every value of a file into a long-format table.
    fn read_table(&self, path: &Path) -> EngineResult<Table>;
}
