//! Operand compatibility checks and parsing of loosely typed arguments.
//!
//! Everything here is pure: callers pass in file metadata (usually the
//! projected layout of a dataset) and get back either a verdict or a
//! [`GridError::TypeError`] / [`GridError::ValueError`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use grid_engine::FileInfo;
use serde_json::Value;

use crate::error::{type_error, value_error, Result};

/// How the time axis of an operand lines up with the receiver's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeMatch {
    /// Same number of timesteps, applied step by step.
    Pairwise,
    /// The operand has a single timestep applied to every step.
    Broadcast,
    /// One operand step per year.
    Yearly,
    /// One operand step per month of the year.
    MonthOfYear,
    /// One operand step per calendar month.
    YearMonth,
}

impl TimeMatch {
    /// Prefix for engine arithmetic operators (`yearsub`, `ymonadd`, ...).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Pairwise | Self::Broadcast => "",
            Self::Yearly => "year",
            Self::MonthOfYear => "ymon",
            Self::YearMonth => "mon",
        }
    }
}

/// Fail with a ValueError when a dataset holds no files.
pub fn require_data(files: usize, what: &str) -> Result<()> {
    if files == 0 {
        return Err(value_error(format!("{} contains no data", what)));
    }
    Ok(())
}

/// The operand must have one file per receiver file, or exactly one.
pub fn check_file_counts(lhs: usize, rhs: usize) -> Result<()> {
    if rhs == lhs || rhs == 1 {
        return Ok(());
    }
    Err(value_error(format!(
        "operand has {} files but the dataset has {}",
        rhs, lhs
    )))
}

/// Variables must agree, or the operand must carry a single variable that
/// the dataset also has.
///
/// With `var` set, only that variable of the operand is used and it must
/// exist there.
pub fn check_variables(lhs: &FileInfo, rhs: &FileInfo, var: Option<&str>) -> Result<()> {
    if let Some(var) = var {
        if !rhs.has_variable(var) {
            return Err(value_error(format!(
                "unknown variable '{}' in operand (has: {})",
                var,
                rhs.variables.join(", ")
            )));
        }
        return Ok(());
    }
    if let [only] = rhs.variables.as_slice() {
        if !lhs.has_variable(only) {
            return Err(value_error(format!(
                "operand variable '{}' is not in the dataset (has: {})",
                only,
                lhs.variables.join(", ")
            )));
        }
        return Ok(());
    }
    let left: BTreeSet<&String> = lhs.variables.iter().collect();
    let right: BTreeSet<&String> = rhs.variables.iter().collect();
    if left != right {
        return Err(value_error(format!(
            "operand variables ({}) do not match dataset variables ({})",
            rhs.variables.join(", "),
            lhs.variables.join(", ")
        )));
    }
    Ok(())
}

pub fn check_grids(lhs: &FileInfo, rhs: &FileInfo) -> Result<()> {
    if lhs.grid != rhs.grid {
        return Err(value_error(format!(
            "grids are incompatible: dataset is {}, operand is {}",
            lhs.grid, rhs.grid
        )));
    }
    Ok(())
}

/// Decide how the operand's time axis applies to the receiver's.
pub fn match_timesteps(lhs: &[NaiveDate], rhs: &[NaiveDate]) -> Result<TimeMatch> {
    if rhs.is_empty() {
        return Err(value_error("operand has no timesteps"));
    }
    if rhs.len() == 1 {
        return Ok(TimeMatch::Broadcast);
    }
    if rhs.len() == lhs.len() {
        return Ok(TimeMatch::Pairwise);
    }
    if covers(lhs, rhs, |d| (d.year(), 0)) {
        return Ok(TimeMatch::Yearly);
    }
    if covers(lhs, rhs, |d| (0, d.month())) {
        return Ok(TimeMatch::MonthOfYear);
    }
    if covers(lhs, rhs, |d| (d.year(), d.month())) {
        return Ok(TimeMatch::YearMonth);
    }
    Err(value_error(format!(
        "time axes are incompatible: dataset has {} timesteps, operand has {}",
        lhs.len(),
        rhs.len()
    )))
}

/// True when `rhs` has exactly one date per key and every key of `lhs`
/// appears in it.
fn covers(lhs: &[NaiveDate], rhs: &[NaiveDate], key: impl Fn(&NaiveDate) -> (i32, u32)) -> bool {
    let right: BTreeSet<(i32, u32)> = rhs.iter().map(&key).collect();
    if right.len() != rhs.len() {
        return false;
    }
    lhs.iter().all(|d| right.contains(&key(d)))
}

/// Full binary compatibility check between two layouts.
///
/// Returns the time alignment shared by every file pair.
pub fn check_binary(lhs: &[FileInfo], rhs: &[FileInfo], var: Option<&str>) -> Result<TimeMatch> {
    require_data(lhs.len(), "dataset")?;
    require_data(rhs.len(), "operand")?;
    check_file_counts(lhs.len(), rhs.len())?;

    let mut alignment = None;
    for (index, left) in lhs.iter().enumerate() {
        let right = if rhs.len() == 1 { &rhs[0] } else { &rhs[index] };
        check_variables(left, right, var)?;
        check_grids(left, right)?;
        let matched = match_timesteps(&left.dates, &right.dates)?;
        match alignment {
            None => alignment = Some(matched),
            Some(previous) if previous != matched => {
                return Err(value_error(
                    "ensemble members align differently with the operand's time axis",
                ));
            }
            Some(_) => {}
        }
    }
    Ok(alignment.unwrap_or(TimeMatch::Pairwise))
}

/// Every receiver file must carry `variable`.
pub fn check_has_variable(layout: &[FileInfo], variable: &str) -> Result<()> {
    for info in layout {
        if !info.has_variable(variable) {
            return Err(value_error(format!(
                "unknown variable '{}' (has: {})",
                variable,
                info.variables.join(", ")
            )));
        }
    }
    Ok(())
}

/// Calendar months must be in 1..=12.
pub fn check_months(months: &[u32]) -> Result<()> {
    if months.is_empty() {
        return Err(value_error("no months given"));
    }
    if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(value_error(format!("month {} is outside 1-12", bad)));
    }
    Ok(())
}

/// A loosely typed binary operand after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOperand {
    Scalar(f64),
    File(PathBuf),
    Variable(String),
}

/// Classify a JSON value used as a binary operand.
///
/// Numbers are scalars, strings are variable names and `{"file": path}`
/// names a file. Anything else has the wrong type.
pub fn operand_from_value(value: &Value) -> Result<DynamicOperand> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(DynamicOperand::Scalar)
            .ok_or_else(|| type_error(format!("operand {} is not representable", n))),
        Value::String(s) => Ok(DynamicOperand::Variable(s.clone())),
        Value::Object(map) => match map.get("file") {
            Some(Value::String(path)) if map.len() == 1 => {
                Ok(DynamicOperand::File(PathBuf::from(path)))
            }
            _ => Err(type_error("operand object must be {\"file\": <path>}")),
        },
        other => Err(type_error(format!(
            "operand must be a number, a variable name or a file, not {}",
            kind(other)
        ))),
    }
}

/// Optional variable name: absent/null or a string.
pub fn var_from_value(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(type_error(format!(
            "var must be a string, not {}",
            kind(other)
        ))),
    }
}

pub fn number_from_value(value: Option<&Value>, what: &str) -> Result<f64> {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| type_error(format!("{} is not representable", what))),
        Some(other) => Err(type_error(format!(
            "{} must be a number, not {}",
            what,
            kind(other)
        ))),
        None => Err(type_error(format!("missing argument '{}'", what))),
    }
}

pub fn string_from_value(value: Option<&Value>, what: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(type_error(format!(
            "{} must be a string, not {}",
            what,
            kind(other)
        ))),
        None => Err(type_error(format!("missing argument '{}'", what))),
    }
}

/// A string or a list of strings.
pub fn strings_from_value(value: Option<&Value>, what: &str) -> Result<Vec<String>> {
    match value {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| string_from_value(Some(item), what))
            .collect(),
        Some(other) => Err(type_error(format!(
            "{} must be a string or a list of strings, not {}",
            what,
            kind(other)
        ))),
        None => Err(type_error(format!("missing argument '{}'", what))),
    }
}

/// An integer or a list of integers.
pub fn integers_from_value(value: Option<&Value>, what: &str) -> Result<Vec<i64>> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| integer(item, what))
            .collect(),
        Some(item) => Ok(vec![integer(item, what)?]),
        None => Err(type_error(format!("missing argument '{}'", what))),
    }
}

/// A baseline `[start, end]` of two integer years.
pub fn baseline_from_value(value: Option<&Value>) -> Result<(i32, i32)> {
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(type_error(format!(
                "baseline must be a list of two years, not {}",
                kind(other)
            )));
        }
        None => return Err(type_error("missing argument 'baseline'")),
    };
    if items.len() != 2 {
        return Err(value_error(format!(
            "baseline must have two years, got {}",
            items.len()
        )));
    }
    let start = year(&items[0])?;
    let end = year(&items[1])?;
    Ok((start, end))
}

/// Optional smoothing window: absent/null, or a positive integer.
pub fn window_from_value(value: Option<&Value>) -> Result<Option<usize>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(w) if w > 0 => usize::try_from(w)
                .map(Some)
                .map_err(|_| type_error("window is too large")),
            _ => Err(type_error(format!("window must be a positive integer, not {}", n))),
        },
        Some(other) => Err(type_error(format!(
            "window must be a positive integer, not {}",
            kind(other)
        ))),
    }
}

fn year(value: &Value) -> Result<i32> {
    let raw = integer(value, "baseline year")?;
    i32::try_from(raw).map_err(|_| value_error(format!("year {} is out of range", raw)))
}

fn integer(value: &Value, what: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| type_error(format!("{} must be an integer, not {}", what, kind(value))))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_engine::GridShape;
    use serde_json::json;

    fn monthly(years: std::ops::RangeInclusive<i32>) -> Vec<NaiveDate> {
        years
            .flat_map(|y| (1..=12).filter_map(move |m| NaiveDate::from_ymd_opt(y, m, 15)))
            .collect()
    }

    fn info(vars: &[&str], nx: usize, dates: Vec<NaiveDate>) -> FileInfo {
        FileInfo::new(
            vars.iter().map(|v| v.to_string()).collect(),
            GridShape::new(nx, 2),
            dates,
        )
    }

    #[test]
    fn test_file_counts() {
        assert!(check_file_counts(3, 3).is_ok());
        assert!(check_file_counts(3, 1).is_ok());
        assert!(check_file_counts(1, 3).unwrap_err().is_value_error());
        assert!(check_file_counts(2, 3).unwrap_err().is_value_error());
    }

    #[test]
    fn test_variables() {
        let sst = info(&["sst"], 4, vec![]);
        let both = info(&["sst", "tos"], 4, vec![]);
        let swapped = info(&["tos", "sst"], 4, vec![]);

        assert!(check_variables(&both, &sst, None).is_ok());
        assert!(check_variables(&both, &swapped, None).is_ok());
        assert!(check_variables(&sst, &both, None).unwrap_err().is_value_error());
        assert!(check_variables(&sst, &both, Some("tos")).is_ok());
        assert!(check_variables(&sst, &both, Some("x"))
            .unwrap_err()
            .is_value_error());
    }

    #[test]
    fn test_single_variable_operand_must_exist_in_dataset() {
        let sst = info(&["sst"], 4, vec![]);
        let tos = info(&["tos"], 4, vec![]);
        let both = info(&["sst", "tos"], 4, vec![]);

        assert!(check_variables(&sst, &tos, None).unwrap_err().is_value_error());
        assert!(check_variables(&both, &tos, None).is_ok());
        assert!(check_variables(&sst, &sst, None).is_ok());
    }

    #[test]
    fn test_grids() {
        let a = info(&["sst"], 4, vec![]);
        let b = info(&["sst"], 5, vec![]);
        assert!(check_grids(&a, &a).is_ok());
        assert!(check_grids(&a, &b).unwrap_err().is_value_error());
    }

    #[test]
    fn test_time_matching() {
        let series = monthly(1970..=1972);
        let annual: Vec<NaiveDate> = (1970..=1972)
            .filter_map(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .collect();
        let climatology = monthly(1990..=1990);

        assert_eq!(match_timesteps(&series, &series).unwrap(), TimeMatch::Pairwise);
        assert_eq!(match_timesteps(&series, &series[..1]).unwrap(), TimeMatch::Broadcast);
        assert_eq!(match_timesteps(&series, &annual).unwrap(), TimeMatch::Yearly);
        assert_eq!(
            match_timesteps(&series, &climatology).unwrap(),
            TimeMatch::MonthOfYear
        );
        assert!(match_timesteps(&series, &series[..5])
            .unwrap_err()
            .is_value_error());
        assert!(match_timesteps(&series, &[]).unwrap_err().is_value_error());
    }

    #[test]
    fn test_year_month_matching() {
        let daily: Vec<NaiveDate> = (1..=28)
            .flat_map(|d| {
                [
                    NaiveDate::from_ymd_opt(1970, 1, d),
                    NaiveDate::from_ymd_opt(1971, 1, d),
                ]
            })
            .flatten()
            .collect();
        let monthly = vec![
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1971, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1972, 1, 1).unwrap(),
        ];
        // One step per year also covers each year-month here, so the yearly
        // form wins.
        assert_eq!(match_timesteps(&daily, &monthly).unwrap(), TimeMatch::Yearly);

        let months = vec![
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1970, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(1971, 1, 1).unwrap(),
        ];
        assert_eq!(match_timesteps(&daily, &months).unwrap(), TimeMatch::YearMonth);
    }

    #[test]
    fn test_check_binary() {
        let lhs = vec![info(&["sst"], 4, monthly(1970..=1971)); 2];
        let rhs = vec![info(&["sst"], 4, monthly(1970..=1971))];
        assert_eq!(check_binary(&lhs, &rhs, None).unwrap(), TimeMatch::Pairwise);
        assert!(check_binary(&lhs, &[], None).unwrap_err().is_value_error());
        assert!(check_binary(&[], &rhs, None).unwrap_err().is_value_error());
    }

    #[test]
    fn test_operand_from_value() {
        assert_eq!(operand_from_value(&json!(2)).unwrap(), DynamicOperand::Scalar(2.0));
        assert_eq!(
            operand_from_value(&json!("sst")).unwrap(),
            DynamicOperand::Variable("sst".into())
        );
        assert_eq!(
            operand_from_value(&json!({"file": "a.nc"})).unwrap(),
            DynamicOperand::File("a.nc".into())
        );
        assert!(operand_from_value(&json!([1, 2])).unwrap_err().is_type_error());
        assert!(operand_from_value(&json!(true)).unwrap_err().is_type_error());
        assert!(operand_from_value(&json!(null)).unwrap_err().is_type_error());
        assert!(operand_from_value(&json!({"path": "a.nc"}))
            .unwrap_err()
            .is_type_error());
    }

    #[test]
    fn test_var_and_number() {
        assert_eq!(var_from_value(None).unwrap(), None);
        assert_eq!(var_from_value(Some(&json!("sst"))).unwrap(), Some("sst".into()));
        assert!(var_from_value(Some(&json!(1))).unwrap_err().is_type_error());
        assert!(number_from_value(Some(&json!("x")), "exponent")
            .unwrap_err()
            .is_type_error());
        assert_eq!(number_from_value(Some(&json!(2)), "exponent").unwrap(), 2.0);
    }

    #[test]
    fn test_baseline_from_value() {
        assert_eq!(baseline_from_value(Some(&json!([1970, 1979]))).unwrap(), (1970, 1979));
        assert!(baseline_from_value(Some(&json!("x"))).unwrap_err().is_type_error());
        assert!(baseline_from_value(Some(&json!([1, 2, 3])))
            .unwrap_err()
            .is_value_error());
        assert!(baseline_from_value(Some(&json!([1, "x"])))
            .unwrap_err()
            .is_type_error());
        assert!(baseline_from_value(Some(&json!([1970.5, 1980])))
            .unwrap_err()
            .is_type_error());
    }

    #[test]
    fn test_window_from_value() {
        assert_eq!(window_from_value(None).unwrap(), None);
        assert_eq!(window_from_value(Some(&json!(3))).unwrap(), Some(3));
        assert!(window_from_value(Some(&json!(0))).unwrap_err().is_type_error());
        assert!(window_from_value(Some(&json!(-2))).unwrap_err().is_type_error());
        assert!(window_from_value(Some(&json!("x"))).unwrap_err().is_type_error());
        assert!(window_from_value(Some(&json!(2.5))).unwrap_err().is_type_error());
    }

    #[test]
    fn test_months() {
        assert!(check_months(&[1, 12]).is_ok());
        assert!(check_months(&[]).unwrap_err().is_value_error());
        assert!(check_months(&[13]).unwrap_err().is_value_error());
    }
}
