//! In-memory exports of a data file.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One value of one variable at one cell and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub lon: f64,
    pub lat: f64,
    pub variable: String,
    pub value: f64,
}

/// Long-format table of records, the dataframe export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append the rows of another table.
    pub fn extend(&mut self, other: Table) {
        self.records.extend(other.records);
    }

    /// Variable names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.variable.clone()))
            .map(|r| r.variable.clone())
            .collect()
    }

    /// All values of one variable, in table order.
    pub fn values(&self, variable: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.variable == variable)
            .map(|r| r.value)
            .collect()
    }

    pub fn max(&self, variable: &str) -> Option<f64> {
        self.values(variable).into_iter().reduce(f64::max)
    }

    pub fn min(&self, variable: &str) -> Option<f64> {
        self.values(variable).into_iter().reduce(f64::min)
    }

    /// Reshape one variable into a `[time][lat][lon]` array.
    ///
    /// Returns `None` when the variable is absent.
    pub fn to_array(&self, variable: &str) -> Option<GridArray> {
        let rows: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| r.variable == variable)
            .collect();
        if rows.is_empty() {
            return None;
        }

        let dates: Vec<NaiveDate> = rows
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let lats = sorted_unique(rows.iter().map(|r| r.lat));
        let lons = sorted_unique(rows.iter().map(|r| r.lon));

        let mut data = vec![f64::NAN; dates.len() * lats.len() * lons.len()];
        for r in rows {
            let t = dates.binary_search(&r.date).ok()?;
            let row = position(&lats, r.lat)?;
            let col = position(&lons, r.lon)?;
            data[(t * lats.len() + row) * lons.len() + col] = r.value;
        }

        Some(GridArray {
            dates,
            lats,
            lons,
            data,
        })
    }
}

/// Dense `[time][lat][lon]` array, the array export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridArray {
    pub dates: Vec<NaiveDate>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub data: Vec<f64>,
}

impl GridArray {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.dates.len(), self.lats.len(), self.lons.len())
    }

    /// Value at a (time, row, col) index.
    pub fn get(&self, t: usize, row: usize, col: usize) -> Option<f64> {
        let (nt, ny, nx) = self.shape();
        if t >= nt || row >= ny || col >= nx {
            return None;
        }
        self.data.get((t * ny + row) * nx + col).copied()
    }
}

fn sorted_unique(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn position(axis: &[f64], value: f64) -> Option<usize> {
    axis.binary_search_by(|x| x.total_cmp(&value)).ok()
}
