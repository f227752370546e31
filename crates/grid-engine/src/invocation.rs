//! Structured description of one engine call.
//!
//! An [`Invocation`] is a chain of [`Step`]s applied to one or more input
//! files. It renders to a CDO-style operator chain where operators are
//! written outermost-first:
//!
//! ```text
//! steps:  addc,1  ->  sub(b.nc)  ->  fldmean
//! args:   -fldmean -sub -addc,1 in.nc b.nc out.nc
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Numeric precision of files written by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    F32,
    F64,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F64 => "F64",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "F32" => Some(Self::F32),
            "F64" => Some(Self::F64),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date stamped on the result of a statistic spanning several timesteps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatDate {
    /// Engine default: the middle of the window.
    #[default]
    Middle,
    /// The last timestep of the window.
    Last,
}

/// Second argument of a binary step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepOperand {
    /// Another file, optionally restricted to one variable.
    File {
        path: PathBuf,
        variable: Option<String>,
    },
    /// A variable taken from the invocation's own input.
    Input { variable: String },
}

/// One operator in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub operator: String,
    pub params: Vec<String>,
    pub operand: Option<StepOperand>,
}

impl Step {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            params: Vec::new(),
            operand: None,
        }
    }

    pub fn param(mut self, value: impl ToString) -> Self {
        self.params.push(value.to_string());
        self
    }

    pub fn params<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.params.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    pub fn operand(mut self, operand: StepOperand) -> Self {
        self.operand = Some(operand);
        self
    }

    /// The `-name,p1,p2` token for this step.
    pub fn token(&self) -> String {
        if self.params.is_empty() {
            format!("-{}", self.operator)
        } else {
            format!("-{},{}", self.operator, self.params.join(","))
        }
    }
}

/// Where an invocation writes its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputTarget {
    File(PathBuf),
    /// Engine writes several files named `<prefix><key>.nc`.
    Split { prefix: PathBuf },
}

/// A single external-process call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub steps: Vec<Step>,
    pub inputs: Vec<PathBuf>,
    pub output: OutputTarget,
    pub precision: Option<Precision>,
    #[serde(default)]
    pub stat_date: StatDate,
}

impl Invocation {
    pub fn new(steps: Vec<Step>, inputs: Vec<PathBuf>, output: OutputTarget) -> Self {
        Self {
            steps,
            inputs,
            output,
            precision: None,
            stat_date: StatDate::Middle,
        }
    }

    pub fn with_precision(mut self, precision: Option<Precision>) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_stat_date(mut self, stat_date: StatDate) -> Self {
        self.stat_date = stat_date;
        self
    }

    /// The output file, when the target is a single file.
    pub fn output_file(&self) -> Option<&Path> {
        match &self.output {
            OutputTarget::File(path) => Some(path),
            OutputTarget::Split { .. } => None,
        }
    }

    /// The operator chain alone, e.g. `-fldmean -addc,1`.
    pub fn expression(&self) -> String {
        self.steps
            .iter()
            .rev()
            .map(Step::token)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Arguments for the engine program, in order.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.stat_date == StatDate::Last {
            args.push("--timestat_date".to_string());
            args.push("last".to_string());
        }
        if let Some(precision) = self.precision {
            args.push("-b".to_string());
            args.push(precision.as_str().to_string());
        }
        args.extend(self.steps.iter().rev().map(Step::token));
        args.extend(self.inputs.iter().map(|p| p.display().to_string()));

        // Binary operands follow the nested first argument, innermost first.
        let input = self.inputs.first();
        for step in &self.steps {
            match &step.operand {
                Some(StepOperand::File { path, variable }) => {
                    if let Some(var) = variable {
                        args.push(format!("-selname,{}", var));
                    }
                    args.push(path.display().to_string());
                }
                Some(StepOperand::Input { variable }) => {
                    args.push(format!("-selname,{}", variable));
                    if let Some(input) = input {
                        args.push(input.display().to_string());
                    }
                }
                None => {}
            }
        }

        match &self.output {
            OutputTarget::File(path) => args.push(path.display().to_string()),
            OutputTarget::Split { prefix } => args.push(prefix.display().to_string()),
        }
        args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_renders_outermost_first() {
        let inv = Invocation::new(
            vec![
                Step::new("addc").param(1),
                Step::new("sub").operand(StepOperand::File {
                    path: "b.nc".into(),
                    variable: None,
                }),
                Step::new("fldmean"),
            ],
            vec!["in.nc".into()],
            OutputTarget::File("out.nc".into()),
        );
        assert_eq!(inv.expression(), "-fldmean -sub -addc,1");
        assert_eq!(inv.to_string(), "-fldmean -sub -addc,1 in.nc b.nc out.nc");
    }

    #[test]
    fn test_operands_in_application_order() {
        let inv = Invocation::new(
            vec![
                Step::new("add").operand(StepOperand::File {
                    path: "a.nc".into(),
                    variable: Some("tos".into()),
                }),
                Step::new("mul").operand(StepOperand::Input {
                    variable: "sst".into(),
                }),
            ],
            vec!["in.nc".into()],
            OutputTarget::File("out.nc".into()),
        )
        .with_precision(Some(Precision::F32));
        assert_eq!(
            inv.args(),
            vec![
                "-b", "F32", "-mul", "-add", "in.nc", "-selname,tos", "a.nc", "-selname,sst",
                "in.nc", "out.nc"
            ]
        );
    }

    #[test]
    fn test_last_stat_date_comes_before_precision() {
        let inv = Invocation::new(
            vec![Step::new("runmean").param(3)],
            vec!["in.nc".into()],
            OutputTarget::File("out.nc".into()),
        );
        assert_eq!(inv.to_string(), "-runmean,3 in.nc out.nc");

        let inv = inv
            .with_precision(Some(Precision::F64))
            .with_stat_date(StatDate::Last);
        assert_eq!(
            inv.to_string(),
            "--timestat_date last -b F64 -runmean,3 in.nc out.nc"
        );
    }

    #[test]
    fn test_split_target() {
        let inv = Invocation::new(
            vec![Step::new("splityear")],
            vec!["in.nc".into()],
            OutputTarget::Split {
                prefix: "/tmp/part_".into(),
            },
        );
        assert!(inv.output_file().is_none());
        assert_eq!(inv.to_string(), "-splityear in.nc /tmp/part_");
    }

    #[test]
    fn test_precision_parse() {
        assert_eq!(Precision::parse("f64"), Some(Precision::F64));
        assert_eq!(Precision::parse("F32"), Some(Precision::F32));
        assert_eq!(Precision::parse("I8"), None);
    }
}
