//! The user-facing handle: current files plus pending operations.

mod arith;
mod ops;

pub use arith::OperandArg;

use std::path::{Path, PathBuf};

use grid_engine::{FileInfo, GridArray, Precision, Table};
use tracing::{debug, info};

use crate::error::{value_error, Result};
use crate::executor::Executor;
use crate::pipeline::{CommandNode, Pipeline, Snapshot};
use crate::session::{Session, TrackedFiles};
use crate::validate;

/// A (possibly multi-file) gridded dataset with a queue of pending
/// operations.
///
/// Operations validate their arguments immediately and then queue a
/// [`CommandNode`]. Nothing runs until [`run`](Self::run) is called, an
/// export needs the data, or the session is not lazy.
///
/// Cloning (or [`copy`](Self::copy)) gives an independent dataset that
/// shares the current files through the session's reference counts.
#[derive(Debug, Clone)]
pub struct Dataset {
    session: Session,
    current: TrackedFiles,
    pipeline: Pipeline,
    precision: Option<Precision>,
    history: Vec<String>,
}

impl Dataset {
    /// Open one or more existing files. Every path must exist.
    pub fn open<I, P>(session: &Session, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        for path in &paths {
            if !path.is_file() {
                return Err(value_error(format!(
                    "file {} does not exist",
                    path.display()
                )));
            }
        }
        debug!(files = paths.len(), "Opening dataset");
        Ok(Self::from_files(session, TrackedFiles::claim(session, paths)))
    }

    /// A dataset with no files. Every operation on it fails.
    pub fn empty(session: &Session) -> Self {
        Self::from_files(session, TrackedFiles::claim(session, Vec::new()))
    }

    fn from_files(session: &Session, current: TrackedFiles) -> Self {
        Self {
            session: session.clone(),
            current,
            pipeline: Pipeline::new(),
            precision: None,
            history: Vec::new(),
        }
    }

    /// An independent copy sharing the same files and pending operations.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Files as of the last completed run.
    pub fn current(&self) -> &[PathBuf] {
        self.current.paths()
    }

    pub fn pending(&self) -> &[CommandNode] {
        self.pipeline.nodes()
    }

    /// Engine commands executed so far, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn precision(&self) -> Option<Precision> {
        self.precision
    }

    /// Precision of files written by later runs.
    pub fn set_precision(&mut self, precision: Precision) -> &mut Self {
        self.precision = Some(precision);
        self
    }

    /// Metadata each file will have once pending operations have run.
    ///
    /// Reads the current files' metadata (through the session cache) and
    /// projects the queue over it, so nothing is executed.
    pub fn layout(&self) -> Result<Vec<FileInfo>> {
        let realized = self
            .current
            .paths()
            .iter()
            .map(|path| self.session.inspect(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.pipeline.project(realized))
    }

    /// Variable names of the (projected) first file.
    pub fn variables(&self) -> Result<Vec<String>> {
        Ok(self
            .layout()?
            .into_iter()
            .next()
            .map(|info| info.variables)
            .unwrap_or_default())
    }

    /// Execute every pending operation.
    ///
    /// On failure the dataset keeps the output of the last group that
    /// completed, the rest of the queue is dropped and the engine error is
    /// returned.
    pub fn run(&mut self) -> Result<()> {
        if self.pipeline.is_empty() {
            return Ok(());
        }
        let nodes = self.pipeline.drain();
        let queued = nodes.len();
        let executor = Executor::new(&self.session, self.precision);

        match executor.materialize(nodes, &self.current) {
            Ok(done) => {
                info!(
                    operations = queued,
                    commands = done.commands.len(),
                    files = done.files.len(),
                    "Pipeline complete"
                );
                self.history.extend(done.commands);
                self.current = done.files;
                Ok(())
            }
            Err(failure) => {
                self.history.extend(failure.commands);
                if let Some(files) = failure.completed {
                    self.current = files;
                }
                Err(failure.error)
            }
        }
    }

    /// Run pending operations and capture the result for use as an operand.
    pub fn snapshot(&mut self) -> Result<Snapshot> {
        self.require_data()?;
        self.run()?;
        let layout = self.layout()?;
        Ok(Snapshot::new(self.current.clone(), layout))
    }

    /// Run pending operations and read every value into a table.
    pub fn to_table(&mut self) -> Result<Table> {
        self.run()?;
        let mut table = Table::default();
        for path in self.current.paths() {
            table.extend(self.session.engine().read_table(path)?);
        }
        Ok(table)
    }

    /// Run pending operations and read one variable as a
    /// `[time][lat][lon]` array.
    pub fn to_array(&mut self, variable: &str) -> Result<GridArray> {
        self.to_table()?
            .to_array(variable)
            .ok_or_else(|| value_error(format!("unknown variable '{}'", variable)))
    }

    pub(crate) fn require_data(&self) -> Result<()> {
        validate::require_data(self.current.len(), "dataset")
    }

    /// Queue a validated node; run it straight away outside lazy mode.
    pub(crate) fn submit(&mut self, node: CommandNode) -> Result<&mut Self> {
        debug!(operation = %node, pending = self.pipeline.len() + 1, "Queued");
        self.pipeline.enqueue(node);
        if !self.session.is_lazy() {
            self.run()?;
        }
        Ok(self)
    }
}
