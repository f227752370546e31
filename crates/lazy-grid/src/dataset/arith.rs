//! Arithmetic: binary operators with validated operands, plus the
//! element-wise unary functions.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::Dataset;
use crate::error::{type_error, value_error, Result};
use crate::pipeline::{CommandNode, Operand, Operator, Snapshot};
use crate::session::TrackedFiles;
use crate::validate::{self, DynamicOperand, TimeMatch};

/// Anything that can stand on the right-hand side of a binary operation.
///
/// Strings name a variable of the receiver itself; paths name a file on
/// disk. [`OperandArg::Dynamic`] accepts untyped input (e.g. from a recipe)
/// and classifies it, rejecting lists, booleans and nulls with a TypeError.
#[derive(Debug)]
pub enum OperandArg<'a> {
    Scalar(f64),
    Dataset(&'a mut Dataset),
    Snapshot(Snapshot),
    File(PathBuf),
    Variable(String),
    Dynamic(Value),
}

impl From<f64> for OperandArg<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for OperandArg<'_> {
    fn from(value: f32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<i32> for OperandArg<'_> {
    fn from(value: i32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<i64> for OperandArg<'_> {
    fn from(value: i64) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<u32> for OperandArg<'_> {
    fn from(value: u32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl<'a> From<&'a mut Dataset> for OperandArg<'a> {
    fn from(value: &'a mut Dataset) -> Self {
        Self::Dataset(value)
    }
}

impl From<Snapshot> for OperandArg<'_> {
    fn from(value: Snapshot) -> Self {
        Self::Snapshot(value)
    }
}

impl From<&Snapshot> for OperandArg<'_> {
    fn from(value: &Snapshot) -> Self {
        Self::Snapshot(value.clone())
    }
}

impl From<&Path> for OperandArg<'_> {
    fn from(value: &Path) -> Self {
        Self::File(value.to_path_buf())
    }
}

impl From<&PathBuf> for OperandArg<'_> {
    fn from(value: &PathBuf) -> Self {
        Self::File(value.clone())
    }
}

impl From<PathBuf> for OperandArg<'_> {
    fn from(value: PathBuf) -> Self {
        Self::File(value)
    }
}

impl From<&str> for OperandArg<'_> {
    fn from(value: &str) -> Self {
        Self::Variable(value.to_string())
    }
}

impl From<String> for OperandArg<'_> {
    fn from(value: String) -> Self {
        Self::Variable(value)
    }
}

impl From<Value> for OperandArg<'_> {
    fn from(value: Value) -> Self {
        Self::Dynamic(value)
    }
}

impl Dataset {
    pub fn add<'a>(&mut self, operand: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        self.binary(Operator::Add, operand.into(), None)
    }

    pub fn subtract<'a>(&mut self, operand: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        self.binary(Operator::Subtract, operand.into(), None)
    }

    pub fn multiply<'a>(&mut self, operand: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        self.binary(Operator::Multiply, operand.into(), None)
    }

    pub fn divide<'a>(&mut self, operand: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        self.binary(Operator::Divide, operand.into(), None)
    }

    /// Add a single variable of a dataset or file to every variable.
    pub fn add_var<'a>(
        &mut self,
        operand: impl Into<OperandArg<'a>>,
        var: &str,
    ) -> Result<&mut Self> {
        self.binary(Operator::Add, operand.into(), Some(var))
    }

    pub fn subtract_var<'a>(
        &mut self,
        operand: impl Into<OperandArg<'a>>,
        var: &str,
    ) -> Result<&mut Self> {
        self.binary(Operator::Subtract, operand.into(), Some(var))
    }

    pub fn multiply_var<'a>(
        &mut self,
        operand: impl Into<OperandArg<'a>>,
        var: &str,
    ) -> Result<&mut Self> {
        self.binary(Operator::Multiply, operand.into(), Some(var))
    }

    pub fn divide_var<'a>(
        &mut self,
        operand: impl Into<OperandArg<'a>>,
        var: &str,
    ) -> Result<&mut Self> {
        self.binary(Operator::Divide, operand.into(), Some(var))
    }

    /// Root-mean-square difference to another dataset, over time.
    pub fn rmse<'a>(&mut self, operand: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        self.binary(Operator::Rmse, operand.into(), None)
    }

    /// Raise every value to a numeric exponent.
    pub fn power<'a>(&mut self, exponent: impl Into<OperandArg<'a>>) -> Result<&mut Self> {
        let exponent = match exponent.into() {
            OperandArg::Scalar(e) => e,
            OperandArg::Dynamic(value) => validate::number_from_value(Some(&value), "exponent")?,
            _ => return Err(type_error("exponent must be a number")),
        };
        self.require_data()?;
        self.submit(CommandNode::new(Operator::Power, Operand::Scalar(exponent)))
    }

    pub fn abs(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Abs)
    }

    pub fn sqrt(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Sqrt)
    }

    pub fn exp(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Exp)
    }

    /// Natural logarithm.
    pub fn log(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Log)
    }

    pub fn log10(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Log10)
    }

    pub fn square(&mut self) -> Result<&mut Self> {
        self.unary(Operator::Square)
    }

    pub(crate) fn unary(&mut self, operator: Operator) -> Result<&mut Self> {
        self.require_data()?;
        self.submit(CommandNode::unary(operator))
    }

    /// Validate the operand against the receiver, then queue the node.
    ///
    /// Argument types are checked before the receiver's contents, so a
    /// malformed operand is a TypeError even on an empty dataset. A dataset
    /// operand is only executed (snapshotted) once every check has passed,
    /// so a rejected call leaves both sides untouched.
    pub(crate) fn binary(
        &mut self,
        operator: Operator,
        operand: OperandArg<'_>,
        var: Option<&str>,
    ) -> Result<&mut Self> {
        if let OperandArg::Dynamic(value) = operand {
            let operand = match validate::operand_from_value(&value)? {
                DynamicOperand::Scalar(k) => OperandArg::Scalar(k),
                DynamicOperand::File(path) => OperandArg::File(path),
                DynamicOperand::Variable(name) => OperandArg::Variable(name),
            };
            return self.binary(operator, operand, var);
        }
        if operator == Operator::Rmse && matches!(operand, OperandArg::Scalar(_)) {
            return Err(type_error("rmse needs a dataset or file operand"));
        }
        self.require_data()?;

        let node = match operand {
            OperandArg::Dynamic(value) => {
                return Err(type_error(format!("unsupported operand {}", value)));
            }
            OperandArg::Scalar(k) => {
                if var.is_some() {
                    return Err(value_error("var can only select from a dataset or file operand"));
                }
                CommandNode::new(operator, Operand::Scalar(k))
            }
            OperandArg::Dataset(other) => {
                validate::require_data(other.current().len(), "operand dataset")?;
                let alignment = validate::check_binary(&self.layout()?, &other.layout()?, var)?;
                let snapshot = other.snapshot()?;
                dataset_node(operator, snapshot, var, alignment)
            }
            OperandArg::Snapshot(snapshot) => {
                validate::require_data(snapshot.len(), "operand")?;
                let alignment = validate::check_binary(&self.layout()?, snapshot.layout(), var)?;
                dataset_node(operator, snapshot, var, alignment)
            }
            OperandArg::File(path) => {
                if !path.is_file() {
                    return Err(value_error(format!(
                        "file {} does not exist",
                        path.display()
                    )));
                }
                let info = self.session().inspect(&path)?;
                let alignment =
                    validate::check_binary(&self.layout()?, std::slice::from_ref(&info), var)?;
                let files = TrackedFiles::claim(self.session(), vec![path]);
                dataset_node(operator, Snapshot::new(files, vec![info]), var, alignment)
            }
            OperandArg::Variable(name) => {
                if var.is_some() {
                    return Err(value_error("var can only select from a dataset or file operand"));
                }
                validate::check_has_variable(&self.layout()?, &name)?;
                CommandNode::new(operator, Operand::VariableName(name))
            }
        };

        self.submit(node)
    }
}

fn dataset_node(
    operator: Operator,
    snapshot: Snapshot,
    var: Option<&str>,
    alignment: TimeMatch,
) -> CommandNode {
    CommandNode::new(operator, Operand::DatasetRef(snapshot))
        .with_target(var.map(str::to_string))
        .with_alignment(alignment)
}
