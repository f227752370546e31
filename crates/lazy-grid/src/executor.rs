//! Turns a drained pipeline into engine invocations.
//!
//! Each group produces a new set of tracked files. The previous
//! intermediate set is dropped as soon as its successor exists, which
//! releases its registry claims and deletes files nobody else holds.

use std::path::{Path, PathBuf};

use grid_engine::{Invocation, OutputTarget, Precision, Step};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::anomaly::AnomalySpec;
use crate::error::{GridError, Result};
use crate::pipeline::{self, CommandNode, Group, Operator};
use crate::session::{Session, TrackedFiles};

/// Successful run: the final files and the commands that made them.
#[derive(Debug)]
pub struct Materialized {
    pub files: TrackedFiles,
    pub commands: Vec<String>,
}

/// Failed run.
#[derive(Debug)]
pub struct ExecutionFailure {
    /// Output of the last group that completed, if any did.
    pub completed: Option<TrackedFiles>,
    /// Commands that completed before the failure.
    pub commands: Vec<String>,
    pub error: GridError,
}

type FileOutput = (TrackedFiles, Vec<String>);

pub struct Executor<'s> {
    session: &'s Session,
    precision: Option<Precision>,
}

impl<'s> Executor<'s> {
    pub fn new(session: &'s Session, precision: Option<Precision>) -> Self {
        Self { session, precision }
    }

    /// Run `nodes` over `input`, one group at a time.
    pub fn materialize(
        &self,
        nodes: Vec<CommandNode>,
        input: &TrackedFiles,
    ) -> std::result::Result<Materialized, ExecutionFailure> {
        let node_count = nodes.len();
        let groups = pipeline::groups(nodes, self.session.config().fuse);
        debug!(nodes = node_count, groups = groups.len(), "Executing pipeline");

        let mut current: Option<TrackedFiles> = None;
        let mut commands = Vec::new();

        for group in &groups {
            let source = current.as_ref().unwrap_or(input);
            match self.run_group(group, source) {
                Ok((files, mut done)) => {
                    commands.append(&mut done);
                    current = Some(files);
                }
                Err((error, mut done)) => {
                    commands.append(&mut done);
                    warn!(error = %error, "Pipeline aborted");
                    return Err(ExecutionFailure {
                        completed: current,
                        commands,
                        error,
                    });
                }
            }
        }

        let files = current.unwrap_or_else(|| input.clone());
        Ok(Materialized { files, commands })
    }

    fn run_group(
        &self,
        group: &Group,
        source: &TrackedFiles,
    ) -> std::result::Result<FileOutput, (GridError, Vec<String>)> {
        match group {
            Group::Chain(nodes) => self.per_file(source, |index, path| {
                let steps: Vec<Step> = nodes.iter().flat_map(|n| n.steps(index)).collect();
                let invocation = self.to_file(steps, vec![path.to_path_buf()]);
                self.invoke(invocation)
            }),
            Group::Barrier(node) => match &node.operator {
                Operator::MergeTime => {
                    let invocation =
                        self.to_file(vec![Step::new("mergetime")], source.paths().to_vec());
                    self.invoke(invocation).map_err(|e| (e, Vec::new()))
                }
                Operator::Split(by) => self.per_file(source, |_, path| {
                    let invocation = Invocation::new(
                        vec![Step::new(by.operator())],
                        vec![path.to_path_buf()],
                        OutputTarget::Split {
                            prefix: self.session.temp_path("_"),
                        },
                    )
                    .with_precision(self.precision);
                    self.invoke(invocation)
                }),
                Operator::Anomaly(spec) => {
                    self.per_file(source, |_, path| self.anomaly(spec, path))
                }
                _ => self.per_file(source, |index, path| {
                    let invocation = self.to_file(node.steps(index), vec![path.to_path_buf()]);
                    self.invoke(invocation)
                }),
            },
        }
    }

    /// Run `job` for every source file, sequentially or on the session's
    /// pool, and concatenate the outputs in source order.
    fn per_file<F>(
        &self,
        source: &TrackedFiles,
        job: F,
    ) -> std::result::Result<FileOutput, (GridError, Vec<String>)>
    where
        F: Fn(usize, &Path) -> Result<FileOutput> + Sync,
    {
        let paths = source.paths();
        let results: Vec<Result<FileOutput>> = if self.session.is_parallel() && paths.len() > 1 {
            match self.session.pool() {
                Ok(pool) => pool.install(|| {
                    paths
                        .par_iter()
                        .enumerate()
                        .map(|(index, path)| job(index, path))
                        .collect()
                }),
                Err(e) => return Err((e, Vec::new())),
            }
        } else {
            let mut results = Vec::with_capacity(paths.len());
            for (index, path) in paths.iter().enumerate() {
                let result = job(index, path);
                let failed = result.is_err();
                results.push(result);
                if failed {
                    break;
                }
            }
            results
        };

        let mut parts = Vec::with_capacity(results.len());
        let mut commands = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok((files, mut done)) => {
                    commands.append(&mut done);
                    parts.push(files);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // Outputs of members that did succeed are dropped (and deleted)
        // along with `parts` when any member failed.
        match first_error {
            Some(e) => Err((e, commands)),
            None => Ok((TrackedFiles::concat(self.session, parts), commands)),
        }
    }

    /// Baseline climatology, then comparison. The climatology file is
    /// released once the comparison is written.
    fn anomaly(&self, spec: &AnomalySpec, path: &Path) -> Result<FileOutput> {
        let input = vec![path.to_path_buf()];
        let (climatology, mut commands) =
            self.invoke(self.to_file(spec.climatology_steps(), input.clone()))?;

        let climatology_path = climatology
            .paths()
            .first()
            .cloned()
            .ok_or_else(|| GridError::value_error("baseline climatology produced no file"))?;
        let comparison = self
            .to_file(spec.comparison_steps(&climatology_path), input)
            .with_stat_date(spec.stat_date());
        let (output, mut done) = self.invoke(comparison)?;
        commands.append(&mut done);

        drop(climatology);
        Ok((output, commands))
    }

    fn to_file(&self, steps: Vec<Step>, inputs: Vec<PathBuf>) -> Invocation {
        Invocation::new(
            steps,
            inputs,
            OutputTarget::File(self.session.temp_path(".nc")),
        )
        .with_precision(self.precision)
    }

    /// Execute one invocation and register what it produced.
    fn invoke(&self, invocation: Invocation) -> Result<FileOutput> {
        let command = format!("{} {}", self.session.engine().name(), invocation);
        debug!(command = %command, "Running engine");

        match self.session.engine().execute(&invocation) {
            Ok(outputs) => {
                debug!(outputs = outputs.len(), "Engine finished");
                Ok((TrackedFiles::adopt(self.session, outputs), vec![command]))
            }
            Err(e) => {
                self.discard_outputs(&invocation);
                warn!(command = %command, error = %e, "Engine invocation failed");
                Err(e.into())
            }
        }
    }

    fn discard_outputs(&self, invocation: &Invocation) {
        match &invocation.output {
            OutputTarget::File(path) => self.session.discard(path),
            OutputTarget::Split { prefix } => {
                for path in grid_engine::cdo::split_outputs(prefix).unwrap_or_default() {
                    self.session.discard(&path);
                }
            }
        }
    }
}
