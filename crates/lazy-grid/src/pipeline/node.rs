//! Pending operation descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use grid_engine::{FileInfo, GridShape, Step, StepOperand};

use crate::anomaly::AnomalySpec;
use crate::session::TrackedFiles;
use crate::validate::TimeMatch;

/// Temporal grouping for [`Operator::TimeMean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeGroup {
    /// Mean over the whole time axis.
    All,
    /// One mean per year.
    Year,
    /// One mean per month of the year (climatology).
    Month,
    /// One mean per calendar month of each year.
    YearMonth,
}

impl TimeGroup {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::All => "timmean",
            Self::Year => "yearmean",
            Self::Month => "ymonmean",
            Self::YearMonth => "monmean",
        }
    }

    /// Representative date of each group, in group order.
    pub fn group_dates(&self, dates: &[NaiveDate]) -> Vec<NaiveDate> {
        match self {
            Self::All => dates.iter().take(1).copied().collect(),
            Self::Year => first_per_key(dates, |d| (d.year(), 0)),
            Self::Month => first_per_key(dates, |d| (0, d.month() as i32)),
            Self::YearMonth => first_per_key(dates, |d| (d.year(), d.month() as i32)),
        }
    }
}

/// How [`Operator::Split`] partitions the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitBy {
    Year,
    YearMonth,
}

impl SplitBy {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Year => "splityear",
            Self::YearMonth => "splityearmon",
        }
    }

    /// Dates of each part, in part order.
    pub fn partition(&self, dates: &[NaiveDate]) -> Vec<Vec<NaiveDate>> {
        let mut parts: BTreeMap<(i32, u32), Vec<NaiveDate>> = BTreeMap::new();
        for date in dates {
            let key = match self {
                Self::Year => (date.year(), 0),
                Self::YearMonth => (date.year(), date.month()),
            };
            parts.entry(key).or_default().push(*date);
        }
        parts.into_values().collect()
    }
}

fn first_per_key(dates: &[NaiveDate], key: impl Fn(&NaiveDate) -> (i32, i32)) -> Vec<NaiveDate> {
    let mut groups: BTreeMap<(i32, i32), NaiveDate> = BTreeMap::new();
    for date in dates {
        groups.entry(key(date)).or_insert(*date);
    }
    groups.into_values().collect()
}

/// The transformation a node applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Rmse,
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Square,
    SpatialMean,
    SpatialSum,
    TimeMean(TimeGroup),
    SelectYears(Vec<i32>),
    SelectMonths(Vec<u32>),
    SelectTimesteps(Vec<usize>),
    SelectVariables(Vec<String>),
    Rename { from: String, to: String },
    MergeTime,
    Split(SplitBy),
    Anomaly(AnomalySpec),
}

impl Operator {
    /// Name used in logs and history.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Rmse => "rmse",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Square => "square",
            Self::SpatialMean => "spatial_mean",
            Self::SpatialSum => "spatial_sum",
            Self::TimeMean(_) => "tmean",
            Self::SelectYears(_) => "subset_years",
            Self::SelectMonths(_) => "subset_months",
            Self::SelectTimesteps(_) => "subset_timesteps",
            Self::SelectVariables(_) => "select_variables",
            Self::Rename { .. } => "rename",
            Self::MergeTime => "merge_time",
            Self::Split(_) => "split",
            Self::Anomaly(_) => "anomaly",
        }
    }

    /// Engine operator stem for the four arithmetic operators.
    fn arithmetic_stem(&self) -> Option<&'static str> {
        match self {
            Self::Add => Some("add"),
            Self::Subtract => Some("sub"),
            Self::Multiply => Some("mul"),
            Self::Divide => Some("div"),
            _ => None,
        }
    }

    /// Operators that cannot share an engine call with their neighbours.
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::MergeTime | Self::Split(_) | Self::Anomaly(_))
    }
}

/// A realized file list captured when a node is queued.
///
/// Holds its own registry claims, so the operand's files outlive any later
/// change to (or drop of) the dataset they came from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    files: TrackedFiles,
    layout: Vec<FileInfo>,
}

impl Snapshot {
    pub(crate) fn new(files: TrackedFiles, layout: Vec<FileInfo>) -> Self {
        Self { files, layout }
    }

    pub fn files(&self) -> &[PathBuf] {
        self.files.paths()
    }

    /// Metadata of each captured file.
    pub fn layout(&self) -> &[FileInfo] {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The file paired with ensemble member `index`; a single file broadcasts.
    pub fn file_for(&self, index: usize) -> Option<&Path> {
        let files = self.files.paths();
        if files.len() == 1 {
            return files.first().map(PathBuf::as_path);
        }
        files.get(index).map(PathBuf::as_path)
    }
}

/// Second argument of a node.
#[derive(Debug, Clone)]
pub enum Operand {
    None,
    Scalar(f64),
    DatasetRef(Snapshot),
    VariableName(String),
}

/// One queued operation.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub operator: Operator,
    pub operand: Operand,
    /// Restricts a dataset operand to one of its variables.
    pub target_variable: Option<String>,
    pub(crate) alignment: TimeMatch,
}

impl CommandNode {
    pub fn new(operator: Operator, operand: Operand) -> Self {
        Self {
            operator,
            operand,
            target_variable: None,
            alignment: TimeMatch::Pairwise,
        }
    }

    pub fn unary(operator: Operator) -> Self {
        Self::new(operator, Operand::None)
    }

    pub(crate) fn with_target(mut self, variable: Option<String>) -> Self {
        self.target_variable = variable;
        self
    }

    pub(crate) fn with_alignment(mut self, alignment: TimeMatch) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn is_barrier(&self) -> bool {
        self.operator.is_barrier()
    }

    /// Self-referencing operands read the chain's input, so they must
    /// start a new engine call.
    pub fn starts_chain(&self) -> bool {
        matches!(self.operand, Operand::VariableName(_))
    }

    /// Engine steps for ensemble member `index`.
    ///
    /// Barrier operators return no steps; the executor builds their calls.
    pub fn steps(&self, index: usize) -> Vec<Step> {
        if let Some(stem) = self.operator.arithmetic_stem() {
            return match &self.operand {
                Operand::Scalar(k) => vec![Step::new(format!("{}c", stem)).param(k)],
                _ => self.binary_step(stem, index).into_iter().collect(),
            };
        }

        match &self.operator {
            Operator::Power => match self.operand {
                Operand::Scalar(e) => vec![Step::new("pow").param(e)],
                _ => Vec::new(),
            },
            Operator::Rmse => {
                let mut steps: Vec<Step> = self.binary_step("sub", index).into_iter().collect();
                steps.extend([Step::new("sqr"), Step::new("timmean"), Step::new("sqrt")]);
                steps
            }
            Operator::Abs => vec![Step::new("abs")],
            Operator::Sqrt => vec![Step::new("sqrt")],
            Operator::Exp => vec![Step::new("exp")],
            Operator::Log => vec![Step::new("ln")],
            Operator::Log10 => vec![Step::new("log10")],
            Operator::Square => vec![Step::new("sqr")],
            Operator::SpatialMean => vec![Step::new("fldmean")],
            Operator::SpatialSum => vec![Step::new("fldsum")],
            Operator::TimeMean(group) => vec![Step::new(group.operator())],
            Operator::SelectYears(years) => vec![Step::new("selyear").params(years)],
            Operator::SelectMonths(months) => vec![Step::new("selmon").params(months)],
            // The engine counts timesteps from 1.
            Operator::SelectTimesteps(steps) => {
                vec![Step::new("seltimestep").params(steps.iter().map(|s| s + 1))]
            }
            Operator::SelectVariables(vars) => vec![Step::new("selname").params(vars)],
            Operator::Rename { from, to } => vec![Step::new("chname").param(from).param(to)],
            _ => Vec::new(),
        }
    }

    fn binary_step(&self, stem: &str, index: usize) -> Option<Step> {
        let operator = format!("{}{}", self.alignment.prefix(), stem);
        match &self.operand {
            Operand::DatasetRef(snapshot) => {
                let path = snapshot.file_for(index)?.to_path_buf();
                Some(Step::new(operator).operand(StepOperand::File {
                    path,
                    variable: self.target_variable.clone(),
                }))
            }
            Operand::VariableName(variable) => Some(Step::new(operator).operand(
                StepOperand::Input {
                    variable: variable.clone(),
                },
            )),
            _ => None,
        }
    }

    /// Metadata this node produces from the metadata of its input files.
    pub fn project(&self, layout: Vec<FileInfo>) -> Vec<FileInfo> {
        match &self.operator {
            Operator::MergeTime => merge_layout(layout),
            Operator::Split(by) => layout
                .into_iter()
                .flat_map(|info| {
                    by.partition(&info.dates)
                        .into_iter()
                        .map(move |dates| FileInfo::new(info.variables.clone(), info.grid, dates))
                        .collect::<Vec<_>>()
                })
                .collect(),
            _ => layout.into_iter().map(|info| self.project_file(info)).collect(),
        }
    }

    fn project_file(&self, mut info: FileInfo) -> FileInfo {
        match &self.operator {
            Operator::Rmse => info.dates = TimeGroup::All.group_dates(&info.dates),
            Operator::SpatialMean | Operator::SpatialSum => info.grid = GridShape::point(),
            Operator::TimeMean(group) => info.dates = group.group_dates(&info.dates),
            Operator::SelectYears(years) => info.dates.retain(|d| years.contains(&d.year())),
            Operator::SelectMonths(months) => info.dates.retain(|d| months.contains(&d.month())),
            Operator::SelectTimesteps(steps) => {
                info.dates = info
                    .dates
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| steps.contains(i))
                    .map(|(_, d)| *d)
                    .collect();
            }
            Operator::SelectVariables(vars) => info.variables.retain(|v| vars.contains(v)),
            Operator::Rename { from, to } => {
                for v in info.variables.iter_mut().filter(|v| *v == from) {
                    *v = to.clone();
                }
            }
            Operator::Anomaly(spec) => return spec.project(info),
            _ => {}
        }
        info
    }
}

fn merge_layout(layout: Vec<FileInfo>) -> Vec<FileInfo> {
    let mut files = layout.into_iter();
    let Some(mut merged) = files.next() else {
        return Vec::new();
    };
    for info in files {
        merged.dates.extend(info.dates);
    }
    merged.dates.sort();
    vec![merged]
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operator.name())?;
        match &self.operand {
            Operand::None => {}
            Operand::Scalar(k) => write!(f, "({})", k)?,
            Operand::DatasetRef(s) => write!(f, "(<{} file(s)>)", s.len())?,
            Operand::VariableName(v) => write!(f, "({})", v)?,
        }
        if let Some(var) = &self.target_variable {
            write!(f, "[var={}]", var)?;
        }
        Ok(())
    }
}
