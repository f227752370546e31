//! Engine implementation backed by the `cdo` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::invocation::{Invocation, OutputTarget};
use crate::metadata::{FileInfo, GridShape};
use crate::table::{Record, Table};
use crate::Engine;

/// Runs Climate Data Operators as a subprocess.
#[derive(Debug, Clone)]
pub struct CdoEngine {
    program: String,
}

impl Default for CdoEngine {
    fn default() -> Self {
        Self::new("cdo")
    }
}

impl CdoEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the program silently and return stdout.
    fn run(&self, args: &[String]) -> EngineResult<String> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "Running engine");

        let output = Command::new(&self.program)
            .arg("-s")
            .args(args)
            .output()
            .map_err(|e| EngineError::LaunchFailed {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::command_failed(
                command,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn query(&self, operator: &str, path: &Path) -> EngineResult<String> {
        self.run(&[operator.to_string(), path.display().to_string()])
    }
}

impl Engine for CdoEngine {
    fn name(&self) -> &str {
        "cdo"
    }

    fn execute(&self, invocation: &Invocation) -> EngineResult<Vec<PathBuf>> {
        self.run(&invocation.args())?;

        match &invocation.output {
            OutputTarget::File(path) => {
                if !path.exists() {
                    return Err(EngineError::invalid_format(format!(
                        "engine reported success but {} was not written",
                        path.display()
                    )));
                }
                Ok(vec![path.clone()])
            }
            OutputTarget::Split { prefix } => split_outputs(prefix),
        }
    }

    fn inspect(&self, path: &Path) -> EngineResult<FileInfo> {
        let variables = parse_showname(&self.query("showname", path)?);
        let grid = parse_griddes(&self.query("griddes", path)?)?;
        let dates = parse_showdate(&self.query("showdate", path)?)?;
        Ok(FileInfo::new(variables, grid, dates))
    }

    fn read_table(&self, path: &Path) -> EngineResult<Table> {
        let out = self.query("-outputtab,date,lon,lat,name,value", path)?;
        parse_outputtab(&out)
    }
}

/// Files produced by a split, sorted by name.
pub fn split_outputs(prefix: &Path) -> EngineResult<Vec<PathBuf>> {
    let dir = prefix
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = prefix
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::MissingData(format!("split prefix {}", prefix.display())))?;

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(&stem))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse `showname` output: whitespace separated variable names.
pub fn parse_showname(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// Parse `griddes` output for the first grid's `xsize`/`ysize`.
///
/// Unstructured grids only report `gridsize`; they map to `gridsize x 1`.
pub fn parse_griddes(output: &str) -> EngineResult<GridShape> {
    let mut xsize = None;
    let mut ysize = None;
    let mut gridsize = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().parse::<usize>().ok();
        match key.trim() {
            "xsize" if xsize.is_none() => xsize = value,
            "ysize" if ysize.is_none() => ysize = value,
            "gridsize" if gridsize.is_none() => gridsize = value,
            _ => {}
        }
    }

    match (xsize, ysize, gridsize) {
        (Some(nx), Some(ny), _) => Ok(GridShape::new(nx, ny)),
        (_, _, Some(n)) => Ok(GridShape::new(n, 1)),
        _ => Err(EngineError::MissingData("grid size in griddes output".to_string())),
    }
}

/// Parse `showdate` output: whitespace separated `YYYY-MM-DD` dates.
pub fn parse_showdate(output: &str) -> EngineResult<Vec<NaiveDate>> {
    output
        .split_whitespace()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| EngineError::invalid_format(format!("date '{}': {}", s, e)))
        })
        .collect()
}

/// Parse `outputtab,date,lon,lat,name,value` output.
pub fn parse_outputtab(output: &str) -> EngineResult<Table> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [date, lon, lat, name, value] = fields.as_slice() else {
            return Err(EngineError::invalid_format(format!("table row '{}'", line)));
        };
        records.push(Record {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| EngineError::invalid_format(format!("date '{}': {}", date, e)))?,
            lon: parse_number(lon)?,
            lat: parse_number(lat)?,
            variable: name.to_string(),
            value: parse_number(value)?,
        });
    }
    Ok(Table::new(records))
}

fn parse_number(s: &str) -> EngineResult<f64> {
    s.parse()
        .map_err(|_| EngineError::invalid_format(format!("number '{}'", s)))
}
