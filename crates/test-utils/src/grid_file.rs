//! A small JSON file format standing in for NetCDF in tests.
//!
//! Values are stored per variable as `[time][cell]`, where cells run
//! row-major (`lat` outer, `lon` inner).

use std::path::Path;

use chrono::NaiveDate;
use grid_engine::{EngineError, EngineResult, FileInfo, GridShape, Record, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridVariable {
    pub name: String,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFile {
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub variables: Vec<GridVariable>,
}

impl GridFile {
    /// An empty file on the given axes.
    pub fn new(lons: Vec<f64>, lats: Vec<f64>, dates: Vec<NaiveDate>) -> Self {
        Self {
            lons,
            lats,
            dates,
            variables: Vec::new(),
        }
    }

    /// Add a variable whose value at (time, cell) is `f(t, cell)`.
    pub fn with_variable(
        mut self,
        name: &str,
        f: impl Fn(usize, usize) -> f64,
    ) -> Self {
        let cells = self.cells();
        let values = (0..self.dates.len())
            .map(|t| (0..cells).map(|c| f(t, c)).collect())
            .collect();
        self.variables.push(GridVariable {
            name: name.to_string(),
            values,
        });
        self
    }

    pub fn cells(&self) -> usize {
        self.lons.len() * self.lats.len()
    }

    pub fn grid(&self) -> GridShape {
        GridShape::new(self.lons.len(), self.lats.len())
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn info(&self) -> FileInfo {
        FileInfo::new(
            self.variables.iter().map(|v| v.name.clone()).collect(),
            self.grid(),
            self.dates.clone(),
        )
    }

    pub fn to_table(&self) -> Table {
        let mut records = Vec::new();
        for (t, date) in self.dates.iter().enumerate() {
            for (row, lat) in self.lats.iter().enumerate() {
                for (col, lon) in self.lons.iter().enumerate() {
                    for var in &self.variables {
                        let cell = row * self.lons.len() + col;
                        let value = var
                            .values
                            .get(t)
                            .and_then(|step| step.get(cell))
                            .copied()
                            .unwrap_or(f64::NAN);
                        records.push(Record {
                            date: *date,
                            lon: *lon,
                            lat: *lat,
                            variable: var.name.clone(),
                            value,
                        });
                    }
                }
            }
        }
        Table::new(records)
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            EngineError::invalid_format(format!("{}: {}", path.display(), e))
        })
    }

    pub fn write(&self, path: &Path) -> EngineResult<()> {
        let text = serde_json::to_string(self)
            .map_err(|e| EngineError::invalid_format(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
