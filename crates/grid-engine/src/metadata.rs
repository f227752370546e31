//! Metadata describing a gridded data file.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Horizontal shape of a regular grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    /// Number of points in X (longitude) direction
    pub nx: usize,
    /// Number of points in Y (latitude) direction
    pub ny: usize,
}

impl GridShape {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny }
    }

    /// Shape of a field reduced to a single cell.
    pub fn point() -> Self {
        Self { nx: 1, ny: 1 }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.nx, self.ny)
    }
}

/// What a file holds: variable names, grid and time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub variables: Vec<String>,
    pub grid: GridShape,
    pub dates: Vec<NaiveDate>,
}

impl FileInfo {
    pub fn new(variables: Vec<String>, grid: GridShape, dates: Vec<NaiveDate>) -> Self {
        Self {
            variables,
            grid,
            dates,
        }
    }

    /// Number of timesteps on the time axis.
    pub fn timesteps(&self) -> usize {
        self.dates.len()
    }

    /// Distinct years present on the time axis, ascending.
    pub fn years(&self) -> BTreeSet<i32> {
        self.dates.iter().map(|d| d.year()).collect()
    }

    /// First and last year on the time axis.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        let years = self.years();
        Some((*years.first()?, *years.last()?))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(start_year: i32, years: i32) -> Vec<NaiveDate> {
        (start_year..start_year + years)
            .flat_map(|y| (1..=12).filter_map(move |m| NaiveDate::from_ymd_opt(y, m, 15)))
            .collect()
    }

    #[test]
    fn test_year_range() {
        let info = FileInfo::new(vec!["sst".into()], GridShape::new(4, 3), monthly(1970, 3));
        assert_eq!(info.timesteps(), 36);
        assert_eq!(info.year_range(), Some((1970, 1972)));
        assert_eq!(info.years().len(), 3);
    }

    #[test]
    fn test_empty_time_axis() {
        let info = FileInfo::new(vec![], GridShape::point(), vec![]);
        assert_eq!(info.year_range(), None);
        assert!(!info.has_variable("sst"));
        assert_eq!(info.grid.to_string(), "1x1");
    }
}
