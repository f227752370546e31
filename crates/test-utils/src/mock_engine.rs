//! An in-process [`Engine`] over [`GridFile`]s.
//!
//! Implements the operator vocabulary lazy-grid emits, so pipelines can be
//! executed end to end without CDO. Every invocation is recorded, and
//! individual operators can be made to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Datelike, NaiveDate};
use grid_engine::{
    Engine, EngineError, EngineResult, FileInfo, Invocation, OutputTarget, Precision, StatDate,
    Step, StepOperand, Table,
};

use crate::grid_file::{GridFile, GridVariable};

type StepResult<T> = std::result::Result<T, String>;

#[derive(Debug, Default)]
pub struct MockEngine {
    invocations: Mutex<Vec<Invocation>>,
    failing: Mutex<BTreeSet<String>>,
}

enum Output {
    Single(GridFile),
    Parts(Vec<(String, GridFile)>),
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation containing `operator` fail (after writing a
    /// partial output file).
    pub fn fail_on(&self, operator: &str) {
        lock(&self.failing).insert(operator.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    /// Invocations executed so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    pub fn invocation_count(&self) -> usize {
        lock(&self.invocations).len()
    }

    pub fn reset(&self) {
        lock(&self.invocations).clear();
    }

    fn failing_operator(&self, invocation: &Invocation) -> Option<String> {
        let failing = lock(&self.failing);
        invocation
            .steps
            .iter()
            .find(|s| failing.contains(&s.operator))
            .map(|s| s.operator.clone())
    }

    fn evaluate(&self, invocation: &Invocation) -> StepResult<Output> {
        let mut steps = invocation.steps.as_slice();
        let mut data = match steps.first() {
            Some(step) if step.operator == "mergetime" => {
                steps = &steps[1..];
                merge_time(&invocation.inputs)?
            }
            _ => match invocation.inputs.as_slice() {
                [input] => read(input)?,
                inputs => return Err(format!("expected one input, got {}", inputs.len())),
            },
        };

        for (i, step) in steps.iter().enumerate() {
            if let Some(split) = split_key(&step.operator) {
                if i + 1 != steps.len() {
                    return Err(format!("{} must be the last operator", step.operator));
                }
                let parts = split_time(&data, split)
                    .into_iter()
                    .map(|(key, part)| (key, round(part, invocation.precision)))
                    .collect();
                return Ok(Output::Parts(parts));
            }
            data = apply(step, data, invocation)?;
        }
        Ok(Output::Single(round(data, invocation.precision)))
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn execute(&self, invocation: &Invocation) -> EngineResult<Vec<PathBuf>> {
        lock(&self.invocations).push(invocation.clone());
        let command = format!("mock {}", invocation);

        if let Some(operator) = self.failing_operator(invocation) {
            if let OutputTarget::File(path) = &invocation.output {
                std::fs::write(path, b"partial")?;
            }
            return Err(EngineError::command_failed(
                command,
                format!("Operator ({}): injected failure", operator),
            ));
        }

        let output = self
            .evaluate(invocation)
            .map_err(|message| EngineError::command_failed(command, message))?;

        match (&invocation.output, output) {
            (OutputTarget::File(path), Output::Single(data)) => {
                data.write(path)?;
                Ok(vec![path.clone()])
            }
            (OutputTarget::Split { prefix }, Output::Parts(parts)) => {
                let mut paths = Vec::with_capacity(parts.len());
                for (key, data) in parts {
                    let path = PathBuf::from(format!("{}{}.nc", prefix.display(), key));
                    data.write(&path)?;
                    paths.push(path);
                }
                Ok(paths)
            }
            _ => Err(EngineError::invalid_format(
                "output target does not match the operator chain",
            )),
        }
    }

    fn inspect(&self, path: &Path) -> EngineResult<FileInfo> {
        Ok(GridFile::read(path)?.info())
    }

    fn read_table(&self, path: &Path) -> EngineResult<Table> {
        Ok(GridFile::read(path)?.to_table())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read(path: &Path) -> StepResult<GridFile> {
    GridFile::read(path).map_err(|e| e.to_string())
}

fn apply(step: &Step, data: GridFile, invocation: &Invocation) -> StepResult<GridFile> {
    let op = step.operator.as_str();
    match op {
        "addc" | "subc" | "mulc" | "divc" => {
            let k = param_f64(step, 0)?;
            let stem = &op[..3];
            Ok(map_values(data, |v| arith(stem, v, k)))
        }
        "pow" => {
            let k = param_f64(step, 0)?;
            Ok(map_values(data, |v| v.powf(k)))
        }
        "abs" => Ok(map_values(data, f64::abs)),
        "sqrt" => Ok(map_values(data, f64::sqrt)),
        "exp" => Ok(map_values(data, f64::exp)),
        "ln" => Ok(map_values(data, f64::ln)),
        "log10" => Ok(map_values(data, f64::log10)),
        "sqr" => Ok(map_values(data, |v| v * v)),
        "fldmean" => Ok(field_reduce(data, true)),
        "fldsum" => Ok(field_reduce(data, false)),
        "timmean" => Ok(group_time(data, |_| (0, 0))),
        "yearmean" => Ok(group_time(data, |d| (d.year(), 0))),
        "ymonmean" => Ok(group_time(data, |d| (0, d.month()))),
        "monmean" => Ok(group_time(data, |d| (d.year(), d.month()))),
        "runmean" => {
            let window = param_f64(step, 0)? as usize;
            run_mean(data, window, invocation.stat_date)
        }
        "selyear" => {
            let years = param_ranges(step)?;
            let keep = indices(&data, |d| years.contains(&i64::from(d.year())));
            select_times(data, keep)
        }
        "selmon" => {
            let months = param_ranges(step)?;
            let keep = indices(&data, |d| months.contains(&i64::from(d.month())));
            select_times(data, keep)
        }
        "seltimestep" => {
            let steps = param_ranges(step)?;
            let mut keep = Vec::new();
            for s in steps {
                let index = usize::try_from(s - 1).map_err(|_| format!("timestep {}", s))?;
                if index >= data.dates.len() {
                    return Err(format!("timestep {} out of range", s));
                }
                keep.push(index);
            }
            select_times(data, keep)
        }
        "selname" => select_names(data, &step.params),
        "chname" => rename(data, &step.params),
        _ => match binary_operator(op) {
            Some((prefix, stem)) => {
                let operand = load_operand(step, invocation.inputs.first())?;
                binary(data, &operand, prefix, stem)
            }
            None => Err(format!("Operator ({}) not found", op)),
        },
    }
}

fn param_f64(step: &Step, index: usize) -> StepResult<f64> {
    step.params
        .get(index)
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| format!("{}: bad parameter", step.operator))
}

/// Integer parameters, expanding `a/b` ranges.
fn param_ranges(step: &Step) -> StepResult<BTreeSet<i64>> {
    let mut out = BTreeSet::new();
    for param in &step.params {
        let bad = || format!("{}: bad parameter '{}'", step.operator, param);
        match param.split_once('/') {
            Some((a, b)) => {
                let a: i64 = a.parse().map_err(|_| bad())?;
                let b: i64 = b.parse().map_err(|_| bad())?;
                out.extend(a..=b);
            }
            None => {
                out.insert(param.parse().map_err(|_| bad())?);
            }
        }
    }
    Ok(out)
}

fn arith(stem: &str, a: f64, b: f64) -> f64 {
    match stem {
        "add" => a + b,
        "sub" => a - b,
        "mul" => a * b,
        _ => a / b,
    }
}

fn binary_operator(op: &str) -> Option<(&'static str, &str)> {
    for prefix in ["ymon", "year", "mon", ""] {
        if let Some(stem) = op.strip_prefix(prefix) {
            if matches!(stem, "add" | "sub" | "mul" | "div") {
                return Some((prefix, stem));
            }
        }
    }
    None
}

fn load_operand(step: &Step, input: Option<&PathBuf>) -> StepResult<GridFile> {
    match &step.operand {
        Some(StepOperand::File { path, variable }) => {
            let file = read(path)?;
            match variable {
                Some(var) => select_names(file, std::slice::from_ref(var)),
                None => Ok(file),
            }
        }
        Some(StepOperand::Input { variable }) => {
            let input = input.ok_or("no input for self operand")?;
            select_names(read(input)?, std::slice::from_ref(variable))
        }
        None => Err(format!("{}: missing operand", step.operator)),
    }
}

fn binary(mut data: GridFile, operand: &GridFile, prefix: &str, stem: &str) -> StepResult<GridFile> {
    if operand.cells() != data.cells() {
        return Err("grids have different sizes".to_string());
    }

    let mut rows = Vec::with_capacity(data.dates.len());
    for (t, date) in data.dates.iter().enumerate() {
        let row = match prefix {
            "" if operand.dates.len() == 1 => Some(0),
            "" => (t < operand.dates.len()).then_some(t),
            "year" => operand.dates.iter().position(|d| d.year() == date.year()),
            "ymon" => operand.dates.iter().position(|d| d.month() == date.month()),
            _ => operand
                .dates
                .iter()
                .position(|d| d.year() == date.year() && d.month() == date.month()),
        };
        rows.push(row.ok_or_else(|| format!("no operand timestep for {}", date))?);
    }

    for var in &mut data.variables {
        let rhs = if operand.variables.len() == 1 {
            &operand.variables[0]
        } else {
            operand
                .variable(&var.name)
                .ok_or_else(|| format!("variable {} not in operand", var.name))?
        };
        for (t, values) in var.values.iter_mut().enumerate() {
            let other = &rhs.values[rows[t]];
            for (v, r) in values.iter_mut().zip(other) {
                *v = arith(stem, *v, *r);
            }
        }
    }
    Ok(data)
}

fn map_values(mut data: GridFile, f: impl Fn(f64) -> f64) -> GridFile {
    for var in &mut data.variables {
        for v in var.values.iter_mut().flatten() {
            *v = f(*v);
        }
    }
    data
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn field_reduce(mut data: GridFile, average: bool) -> GridFile {
    for var in &mut data.variables {
        for values in &mut var.values {
            let total: f64 = values.iter().sum();
            let reduced = if average {
                total / values.len() as f64
            } else {
                total
            };
            *values = vec![reduced];
        }
    }
    data.lons = vec![mean(&data.lons)];
    data.lats = vec![mean(&data.lats)];
    data
}

fn group_time(mut data: GridFile, key: impl Fn(&NaiveDate) -> (i32, u32)) -> GridFile {
    let mut groups: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
    for (t, date) in data.dates.iter().enumerate() {
        groups.entry(key(date)).or_default().push(t);
    }

    let dates = groups.values().map(|ts| data.dates[ts[0]]).collect();
    for var in &mut data.variables {
        var.values = groups
            .values()
            .map(|ts| average_rows(ts.iter().map(|t| &var.values[*t])))
            .collect();
    }
    data.dates = dates;
    data
}

fn average_rows<'a>(rows: impl Iterator<Item = &'a Vec<f64>>) -> Vec<f64> {
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for row in rows {
        if sum.is_empty() {
            sum = vec![0.0; row.len()];
        }
        for (s, v) in sum.iter_mut().zip(row) {
            *s += v;
        }
        count += 1;
    }
    sum.into_iter().map(|s| s / count as f64).collect()
}

/// Running mean over `window` timesteps, each stamped with the middle or
/// the last date of its window.
fn run_mean(mut data: GridFile, window: usize, stat_date: StatDate) -> StepResult<GridFile> {
    let n = data.dates.len();
    if window == 0 || window > n {
        return Err(format!("runmean: window {} for {} timesteps", window, n));
    }
    let offset = match stat_date {
        StatDate::Middle => (window - 1) / 2,
        StatDate::Last => window - 1,
    };
    data.dates = (0..=n - window).map(|i| data.dates[i + offset]).collect();
    for var in &mut data.variables {
        var.values = (0..=n - window)
            .map(|i| average_rows(var.values[i..i + window].iter()))
            .collect();
    }
    Ok(data)
}

fn indices(data: &GridFile, keep: impl Fn(&NaiveDate) -> bool) -> Vec<usize> {
    data.dates
        .iter()
        .enumerate()
        .filter(|(_, d)| keep(d))
        .map(|(t, _)| t)
        .collect()
}

fn select_times(mut data: GridFile, keep: Vec<usize>) -> StepResult<GridFile> {
    if keep.is_empty() {
        return Err("no timesteps selected".to_string());
    }
    data.dates = keep.iter().map(|t| data.dates[*t]).collect();
    for var in &mut data.variables {
        var.values = keep.iter().map(|t| var.values[*t].clone()).collect();
    }
    Ok(data)
}

fn select_names(mut data: GridFile, names: &[String]) -> StepResult<GridFile> {
    if let Some(missing) = names.iter().find(|n| data.variable(n).is_none()) {
        return Err(format!("variable {} not found", missing));
    }
    data.variables.retain(|v| names.contains(&v.name));
    Ok(data)
}

fn rename(mut data: GridFile, params: &[String]) -> StepResult<GridFile> {
    for pair in params.chunks(2) {
        let [from, to] = pair else {
            return Err("chname needs pairs of names".to_string());
        };
        for var in data.variables.iter_mut().filter(|v| &v.name == from) {
            var.name = to.clone();
        }
    }
    Ok(data)
}

fn merge_time(inputs: &[PathBuf]) -> StepResult<GridFile> {
    let mut files = inputs.iter().map(|p| read(p));
    let mut merged = files.next().ok_or("mergetime: no inputs")??;

    for file in files {
        let file = file?;
        if file.cells() != merged.cells() {
            return Err("mergetime: grids differ".to_string());
        }
        merged.dates.extend(file.dates.iter().copied());
        for var in &mut merged.variables {
            let other = file
                .variable(&var.name)
                .ok_or_else(|| format!("mergetime: variable {} missing", var.name))?;
            var.values.extend(other.values.iter().cloned());
        }
    }

    let mut order: Vec<usize> = (0..merged.dates.len()).collect();
    order.sort_by_key(|t| merged.dates[*t]);
    select_times(merged, order)
}

type SplitKey = fn(&NaiveDate) -> String;

fn split_key(operator: &str) -> Option<SplitKey> {
    match operator {
        "splityear" => Some(year_key),
        "splityearmon" => Some(year_month_key),
        _ => None,
    }
}

fn year_key(date: &NaiveDate) -> String {
    format!("{:04}", date.year())
}

fn year_month_key(date: &NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

fn split_time(data: &GridFile, key: SplitKey) -> Vec<(String, GridFile)> {
    let mut parts: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (t, date) in data.dates.iter().enumerate() {
        parts.entry(key(date)).or_default().push(t);
    }
    parts
        .into_iter()
        .map(|(k, ts)| {
            let part = GridFile {
                lons: data.lons.clone(),
                lats: data.lats.clone(),
                dates: ts.iter().map(|t| data.dates[*t]).collect(),
                variables: data
                    .variables
                    .iter()
                    .map(|v| GridVariable {
                        name: v.name.clone(),
                        values: ts.iter().map(|t| v.values[*t].clone()).collect(),
                    })
                    .collect(),
            };
            (k, part)
        })
        .collect()
}

fn round(data: GridFile, precision: Option<Precision>) -> GridFile {
    match precision {
        Some(Precision::F32) => map_values(data, |v| v as f32 as f64),
        _ => data,
    }
}
