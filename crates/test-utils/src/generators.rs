//! Test data generators for synthetic gridded series.
//!
//! Values are deterministic so tests can check exact results.

use chrono::NaiveDate;

use crate::grid_file::GridFile;

/// Mid-month dates (15th) for `years` whole years from `start_year`.
///
/// # Example
///
/// ```
/// use test_utils::monthly_dates;
///
/// let dates = monthly_dates(1970, 2);
/// assert_eq!(dates.len(), 24);
/// ```
pub fn monthly_dates(start_year: i32, years: usize) -> Vec<NaiveDate> {
    (start_year..start_year + years as i32)
        .flat_map(|y| (1..=12).filter_map(move |m| NaiveDate::from_ymd_opt(y, m, 15)))
        .collect()
}

/// `n` consecutive days from `start`.
pub fn daily_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    start.iter_days().take(n).collect()
}

/// `n` evenly spaced coordinates.
pub fn regular_axis(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Sea-surface-temperature-like monthly series.
///
/// Value at timestep `t`, cell `c` is `15 + c + 5 * month_index / 11 + year_offset`,
/// where `month_index` is 0 for January and `year_offset` counts years from the
/// start. Every value is positive.
pub fn sst_series(start_year: i32, years: usize, nx: usize, ny: usize) -> GridFile {
    GridFile::new(
        regular_axis(nx, -20.0, 1.0),
        regular_axis(ny, 50.0, 1.0),
        monthly_dates(start_year, years),
    )
    .with_variable("sst", |t, c| {
        let month = (t % 12) as f64;
        let year = (t / 12) as f64;
        15.0 + c as f64 + 5.0 * month / 11.0 + year
    })
}

/// A field that has the same value everywhere and always.
pub fn constant_series(
    variable: &str,
    value: f64,
    dates: Vec<NaiveDate>,
    nx: usize,
    ny: usize,
) -> GridFile {
    GridFile::new(
        regular_axis(nx, -20.0, 1.0),
        regular_axis(ny, 50.0, 1.0),
        dates,
    )
    .with_variable(variable, |_, _| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_dates() {
        let dates = monthly_dates(1970, 1);
        assert_eq!(dates.len(), 12);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(1970, 1, 15).unwrap());
        assert_eq!(dates[11], NaiveDate::from_ymd_opt(1970, 12, 15).unwrap());
    }

    #[test]
    fn test_daily_dates() {
        let start = NaiveDate::from_ymd_opt(2000, 2, 28).unwrap();
        let dates = daily_dates(start, 3);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2000, 3, 1).unwrap());
    }

    #[test]
    fn test_sst_series_values() {
        let file = sst_series(1970, 2, 3, 2);
        assert_eq!(file.cells(), 6);
        let sst = file.variable("sst").unwrap();
        assert_eq!(sst.values.len(), 24);
        assert_eq!(sst.values[0][0], 15.0);
        assert_eq!(sst.values[11][1], 21.0);
        assert_eq!(sst.values[12][0], 16.0);
    }
}
