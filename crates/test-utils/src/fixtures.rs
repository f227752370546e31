//! Common on-disk fixtures.
//!
//! A [`Fixtures`] owns a scratch directory that holds the source files of a
//! test; it is removed when the value is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::generators::{constant_series, monthly_dates, sst_series};
use crate::grid_file::GridFile;

/// Standard grid for fixtures: 4 columns, 3 rows.
pub const NX: usize = 4;
pub const NY: usize = 3;

pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create fixture directory"),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write `file` under `name` and return its path.
    pub fn write(&self, name: &str, file: &GridFile) -> PathBuf {
        let path = self.dir.path().join(name);
        file.write(&path).expect("write fixture");
        path
    }

    /// Ten years (1970-1979) of monthly `sst` on the standard grid.
    pub fn sst(&self) -> PathBuf {
        self.write("sst.nc", &sst_series(1970, 10, NX, NY))
    }

    /// One file per year, 1970 onwards: an ensemble of `n` members.
    pub fn sst_ensemble(&self, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let year = 1970 + i as i32;
                self.write(&format!("sst_{}.nc", year), &sst_series(year, 1, NX, NY))
            })
            .collect()
    }

    /// `sst` and `tos` (= sst + 1) in one file, 1970-1979.
    pub fn two_variables(&self) -> PathBuf {
        let base = sst_series(1970, 10, NX, NY);
        let tos = base
            .variable("sst")
            .map(|v| v.values.clone())
            .unwrap_or_default();
        let file = base.with_variable("tos", |t, c| tos[t][c] + 1.0);
        self.write("sst_tos.nc", &file)
    }

    /// Same dates as [`Fixtures::sst`] on a 2x2 grid.
    pub fn coarse(&self) -> PathBuf {
        self.write("coarse.nc", &sst_series(1970, 10, 2, 2))
    }

    /// A constant monthly field, 1970-1979.
    pub fn constant(&self, variable: &str, value: f64) -> PathBuf {
        self.write(
            &format!("{}_const.nc", variable),
            &constant_series(variable, value, monthly_dates(1970, 10), NX, NY),
        )
    }
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new()
    }
}
