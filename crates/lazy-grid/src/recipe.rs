//! Operation lists loaded from YAML or JSON.
//!
//! ```yaml
//! - op: subtract
//!   operand: { file: climatology.nc }
//!   var: sst
//! - op: spatial_mean
//! - op: annual_anomaly
//!   baseline: [1970, 1979]
//!   metric: relative
//! ```
//!
//! Arguments arrive untyped, so this is where wrongly typed values are
//! reported as [`GridError::TypeError`].

use std::path::Path;

use grid_engine::Precision;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::anomaly::AnomalyOptions;
use crate::dataset::{Dataset, OperandArg};
use crate::error::{type_error, value_error, GridError, Result};
use crate::pipeline::{SplitBy, TimeGroup};
use crate::validate;

/// One operation and its named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub op: String,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe {
    pub steps: Vec<RecipeStep>,
}

impl Recipe {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Err(GridError::Recipe(format!(
                "unsupported recipe format: {}",
                path.display()
            ))),
        }
    }
}

impl Dataset {
    /// Apply every step of a recipe in order, stopping at the first error.
    pub fn apply_recipe(&mut self, recipe: &Recipe) -> Result<&mut Self> {
        for step in &recipe.steps {
            self.apply_step(&step.op, &step.args)?;
        }
        Ok(self)
    }

    /// Apply one named operation with untyped arguments.
    pub fn apply_step(&mut self, op: &str, args: &Map<String, Value>) -> Result<&mut Self> {
        debug!(op, "Applying recipe step");
        match op {
            "set_precision" => {
                let name = validate::string_from_value(args.get("precision"), "precision")?;
                let precision = Precision::parse(&name)
                    .ok_or_else(|| value_error(format!("unknown precision '{}'", name)))?;
                return Ok(self.set_precision(precision));
            }
            "run" => {
                self.run()?;
                return Ok(self);
            }
            _ => {}
        }

        // Each operation checks its arguments before the dataset's contents.
        match op {
            "add" | "subtract" | "multiply" | "divide" | "rmse" => {
                let operand = args
                    .get("operand")
                    .cloned()
                    .ok_or_else(|| type_error(format!("{} needs an operand", op)))?;
                let var = validate::var_from_value(args.get("var"))?;
                let operand = OperandArg::Dynamic(operand);
                match (op, var.as_deref()) {
                    ("add", None) => self.add(operand),
                    ("add", Some(v)) => self.add_var(operand, v),
                    ("subtract", None) => self.subtract(operand),
                    ("subtract", Some(v)) => self.subtract_var(operand, v),
                    ("multiply", None) => self.multiply(operand),
                    ("multiply", Some(v)) => self.multiply_var(operand, v),
                    ("divide", None) => self.divide(operand),
                    ("divide", Some(v)) => self.divide_var(operand, v),
                    (_, None) => self.rmse(operand),
                    (_, Some(_)) => Err(value_error("rmse does not take var")),
                }
            }
            "power" => {
                let exponent = args
                    .get("exponent")
                    .cloned()
                    .ok_or_else(|| type_error("power needs an exponent"))?;
                self.power(OperandArg::Dynamic(exponent))
            }
            "abs" => self.abs(),
            "sqrt" => self.sqrt(),
            "exp" => self.exp(),
            "log" => self.log(),
            "log10" => self.log10(),
            "square" => self.square(),
            "spatial_mean" => self.spatial_mean(),
            "spatial_sum" => self.spatial_sum(),
            "tmean" => self.tmean(time_group(args.get("by"))?),
            "subset" => self.subset(args),
            "select" => {
                self.select_variables(validate::strings_from_value(args.get("variables"), "variables")?)
            }
            "rename" => {
                let from = validate::string_from_value(args.get("from"), "from")?;
                let to = validate::string_from_value(args.get("to"), "to")?;
                self.rename(&from, &to)
            }
            "merge" => {
                match args.get("dim") {
                    None | Some(Value::Null) => {}
                    Some(Value::String(dim)) if dim == "time" => {}
                    Some(Value::String(dim)) => {
                        return Err(value_error(format!("cannot merge along '{}'", dim)));
                    }
                    Some(_) => return Err(type_error("dim must be a string")),
                }
                self.merge_time()
            }
            "split" => {
                let by = match args.get("by") {
                    None | Some(Value::Null) => SplitBy::Year,
                    value => match validate::string_from_value(value, "by")?.as_str() {
                        "year" => SplitBy::Year,
                        "yearmonth" => SplitBy::YearMonth,
                        other => return Err(value_error(format!("cannot split by '{}'", other))),
                    },
                };
                self.split(by)
            }
            "annual_anomaly" => self.annual_anomaly(AnomalyOptions::from_args(args)?),
            "monthly_anomaly" => self.monthly_anomaly(AnomalyOptions::from_args(args)?),
            other => Err(value_error(format!("unknown operation '{}'", other))),
        }
    }

    fn subset(&mut self, args: &Map<String, Value>) -> Result<&mut Self> {
        let mut applied = false;
        if let Some(value) = args.get("years") {
            let years = validate::integers_from_value(Some(value), "years")?
                .into_iter()
                .map(|y| i32::try_from(y).map_err(|_| value_error(format!("year {} is out of range", y))))
                .collect::<Result<Vec<_>>>()?;
            self.subset_years(years)?;
            applied = true;
        }
        if let Some(value) = args.get("months") {
            let months = validate::integers_from_value(Some(value), "months")?
                .into_iter()
                .map(|m| u32::try_from(m).map_err(|_| value_error(format!("month {} is outside 1-12", m))))
                .collect::<Result<Vec<_>>>()?;
            self.subset_months(months)?;
            applied = true;
        }
        if let Some(value) = args.get("timesteps") {
            let steps = validate::integers_from_value(Some(value), "timesteps")?
                .into_iter()
                .map(|s| usize::try_from(s).map_err(|_| value_error(format!("timestep {} is negative", s))))
                .collect::<Result<Vec<_>>>()?;
            self.subset_timesteps(steps)?;
            applied = true;
        }
        if !applied {
            return Err(type_error("subset needs years, months or timesteps"));
        }
        Ok(self)
    }
}

/// `null`/`"all"`, `"year"`, `"month"`, `"yearmonth"` or `["year", "month"]`.
fn time_group(value: Option<&Value>) -> Result<TimeGroup> {
    let keys = match value {
        None | Some(Value::Null) => return Ok(TimeGroup::All),
        value => validate::strings_from_value(value, "by")?,
    };
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    match keys.as_slice() {
        [] | ["all"] => Ok(TimeGroup::All),
        ["year"] => Ok(TimeGroup::Year),
        ["month"] => Ok(TimeGroup::Month),
        ["yearmonth"] | ["year", "month"] | ["month", "year"] => Ok(TimeGroup::YearMonth),
        _ => Err(value_error(format!("cannot group time by {:?}", keys))),
    }
}
