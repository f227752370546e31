//! Anomalies relative to a baseline climatology.
//!
//! An anomaly runs as two engine calls per file. The first reduces the
//! baseline years to a climatology (one step for annual anomalies, twelve
//! for monthly ones) in a tracked temp file; the second compares the full
//! series against it:
//!
//! ```text
//! annual:   selyear,b0/b1 -> yearmean -> timmean                  = clim
//!           yearmean -> [runmean,w] -> sub|div clim
//! monthly:  selyear,b0/b1 -> ymonmean                             = clim
//!           [runmean,w] -> ymonsub|ymondiv clim
//! ```
//!
//! The optional window smooths the compared series. Each smoothed step
//! carries the date of the last step in its window, so the first `w - 1`
//! steps of the series have no anomaly.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use grid_engine::{FileInfo, StatDate, Step, StepOperand};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::Dataset;
use crate::error::{type_error, value_error, GridError, Result};
use crate::pipeline::{CommandNode, Operator, TimeGroup};
use crate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    Annual,
    Monthly,
}

/// How the series is compared with the climatology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Series minus climatology.
    #[default]
    Absolute,
    /// Series divided by climatology.
    Relative,
}

impl Metric {
    fn stem(&self) -> &'static str {
        match self {
            Self::Absolute => "sub",
            Self::Relative => "div",
        }
    }
}

impl FromStr for Metric {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "relative" => Ok(Self::Relative),
            other => Err(value_error(format!(
                "metric must be 'absolute' or 'relative', not '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => f.write_str("absolute"),
            Self::Relative => f.write_str("relative"),
        }
    }
}

/// Inclusive range of baseline years, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Baseline {
    start: i32,
    end: i32,
}

impl Baseline {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start >= end {
            return Err(value_error(format!(
                "baseline start {} must be before its end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

/// User-facing options for [`Dataset::annual_anomaly`] and
/// [`Dataset::monthly_anomaly`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyOptions {
    pub baseline: (i32, i32),
    pub metric: Metric,
    pub window: Option<usize>,
}

impl AnomalyOptions {
    pub fn new(start: i32, end: i32) -> Self {
        Self {
            baseline: (start, end),
            metric: Metric::Absolute,
            window: None,
        }
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Parse `baseline`, `metric` and `window` from loosely typed arguments.
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let (start, end) = validate::baseline_from_value(args.get("baseline"))?;
        let metric = match args.get("metric") {
            None | Some(Value::Null) => Metric::Absolute,
            Some(value) => validate::string_from_value(Some(value), "metric")?.parse()?,
        };
        let window = validate::window_from_value(args.get("window"))?;
        Ok(Self {
            baseline: (start, end),
            metric,
            window,
        })
    }
}

/// A validated anomaly request, stored in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySpec {
    pub period: Period,
    pub baseline: Baseline,
    pub metric: Metric,
    pub window: Option<usize>,
}

impl AnomalySpec {
    pub fn new(period: Period, options: &AnomalyOptions) -> Result<Self> {
        let (start, end) = options.baseline;
        let baseline = Baseline::new(start, end)?;
        if options.window == Some(0) {
            return Err(type_error("window must be a positive integer, not 0"));
        }
        Ok(Self {
            period,
            baseline,
            metric: options.metric,
            window: options.window,
        })
    }

    /// Check the request against the metadata of the files it will run on.
    pub fn check_layout(&self, layout: &[FileInfo]) -> Result<()> {
        for info in layout {
            let Some((first, last)) = info.year_range() else {
                return Err(value_error("dataset has no timesteps"));
            };
            if self.baseline.start < first || self.baseline.end > last {
                return Err(value_error(format!(
                    "baseline {}-{} is outside the dataset's years {}-{}",
                    self.baseline.start, self.baseline.end, first, last
                )));
            }
            if let Some(window) = self.window {
                self.check_window(info, window)?;
            }
        }
        Ok(())
    }

    fn check_window(&self, info: &FileInfo, window: usize) -> Result<()> {
        let (available, unit) = match self.period {
            Period::Annual => (info.years().len(), "years"),
            Period::Monthly => (info.timesteps(), "timesteps"),
        };
        if available < window {
            return Err(value_error(format!(
                "window {} is too wide for a series of {} {}",
                window, available, unit
            )));
        }
        Ok(())
    }

    /// Steps reducing a file to its baseline climatology.
    pub fn climatology_steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::new("selyear").param(format!(
            "{}/{}",
            self.baseline.start, self.baseline.end
        ))];
        if self.period == Period::Annual {
            steps.push(Step::new("yearmean"));
        }
        steps.push(Step::new(match self.period {
            Period::Annual => "timmean",
            Period::Monthly => "ymonmean",
        }));
        steps
    }

    /// Steps comparing a file with the climatology in `climatology`.
    pub fn comparison_steps(&self, climatology: &Path) -> Vec<Step> {
        let operand = StepOperand::File {
            path: climatology.to_path_buf(),
            variable: None,
        };
        let mut steps = Vec::new();
        if self.period == Period::Annual {
            steps.push(Step::new("yearmean"));
        }
        if let Some(window) = self.window {
            steps.push(Step::new("runmean").param(window));
        }
        steps.push(match self.period {
            Period::Annual => Step::new(self.metric.stem()).operand(operand),
            Period::Monthly => Step::new(format!("ymon{}", self.metric.stem())).operand(operand),
        });
        steps
    }

    /// Date convention for the comparison call.
    pub fn stat_date(&self) -> StatDate {
        match self.window {
            Some(_) => StatDate::Last,
            None => StatDate::Middle,
        }
    }

    pub fn project(&self, mut info: FileInfo) -> FileInfo {
        if self.period == Period::Annual {
            info.dates = TimeGroup::Year.group_dates(&info.dates);
        }
        if let Some(window) = self.window {
            info.dates = info.dates.split_off((window - 1).min(info.dates.len()));
        }
        info
    }
}

impl Dataset {
    /// Queue the difference (or ratio) of each year's mean to the mean of
    /// the baseline years.
    pub fn annual_anomaly(&mut self, options: AnomalyOptions) -> Result<&mut Self> {
        self.anomaly(Period::Annual, &options)
    }

    /// Queue the difference (or ratio) of each month to the baseline mean
    /// of the same calendar month.
    pub fn monthly_anomaly(&mut self, options: AnomalyOptions) -> Result<&mut Self> {
        self.anomaly(Period::Monthly, &options)
    }

    fn anomaly(&mut self, period: Period, options: &AnomalyOptions) -> Result<&mut Self> {
        let spec = AnomalySpec::new(period, options)?;
        self.require_data()?;
        spec.check_layout(&self.layout()?)?;
        self.submit(CommandNode::unary(Operator::Anomaly(spec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use grid_engine::GridShape;
    use serde_json::json;

    fn info(years: std::ops::RangeInclusive<i32>) -> FileInfo {
        let dates = years
            .flat_map(|y| (1..=12).filter_map(move |m| NaiveDate::from_ymd_opt(y, m, 15)))
            .collect();
        FileInfo::new(vec!["sst".into()], GridShape::new(2, 2), dates)
    }

    fn spec(period: Period, options: AnomalyOptions) -> AnomalySpec {
        AnomalySpec::new(period, &options).unwrap()
    }

    #[test]
    fn test_baseline_order() {
        assert!(Baseline::new(1970, 1979).is_ok());
        assert!(Baseline::new(1980, 1970).unwrap_err().is_value_error());
        assert!(Baseline::new(1970, 1970).unwrap_err().is_value_error());
    }

    #[test]
    fn test_zero_window_is_type_error() {
        let err = AnomalySpec::new(Period::Annual, &AnomalyOptions::new(1970, 1979).window(0))
            .unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("relative".parse::<Metric>().unwrap(), Metric::Relative);
        assert!("x".parse::<Metric>().unwrap_err().is_value_error());
    }

    #[test]
    fn test_baseline_outside_range() {
        let s = spec(Period::Annual, AnomalyOptions::new(1960, 1975));
        assert!(s.check_layout(&[info(1970..=1979)]).unwrap_err().is_value_error());

        let s = spec(Period::Annual, AnomalyOptions::new(1970, 1975));
        assert!(s.check_layout(&[info(1970..=1979)]).is_ok());
    }

    #[test]
    fn test_window_must_fit_series() {
        // The window spans the whole series, not only the baseline years.
        let s = spec(Period::Annual, AnomalyOptions::new(1970, 1972).window(10));
        assert!(s.check_layout(&[info(1970..=1979)]).is_ok());
        let s = spec(Period::Annual, AnomalyOptions::new(1970, 1972).window(11));
        assert!(s.check_layout(&[info(1970..=1979)]).unwrap_err().is_value_error());

        let s = spec(Period::Monthly, AnomalyOptions::new(1970, 1971).window(120));
        assert!(s.check_layout(&[info(1970..=1979)]).is_ok());
        let s = spec(Period::Monthly, AnomalyOptions::new(1970, 1971).window(121));
        assert!(s.check_layout(&[info(1970..=1979)]).unwrap_err().is_value_error());
    }

    #[test]
    fn test_annual_steps() {
        let s = spec(
            Period::Annual,
            AnomalyOptions::new(1970, 1979).metric(Metric::Relative).window(2),
        );
        let tokens: Vec<String> = s.climatology_steps().iter().map(Step::token).collect();
        assert_eq!(tokens, vec!["-selyear,1970/1979", "-yearmean", "-timmean"]);

        let apply: Vec<String> = s
            .comparison_steps(Path::new("/tmp/clim.nc"))
            .iter()
            .map(Step::token)
            .collect();
        assert_eq!(apply, vec!["-yearmean", "-runmean,2", "-div"]);
        assert_eq!(s.stat_date(), StatDate::Last);

        // The first smoothed year is the end of the first window.
        let projected = s.project(info(1970..=1979));
        assert_eq!(projected.timesteps(), 9);
        assert_eq!(projected.year_range(), Some((1971, 1979)));
    }

    #[test]
    fn test_monthly_steps_and_projection() {
        let s = spec(Period::Monthly, AnomalyOptions::new(1970, 1979));
        let tokens: Vec<String> = s.climatology_steps().iter().map(Step::token).collect();
        assert_eq!(tokens, vec!["-selyear,1970/1979", "-ymonmean"]);
        assert_eq!(s.comparison_steps(Path::new("c.nc"))[0].operator, "ymonsub");
        assert_eq!(s.project(info(1970..=1979)).timesteps(), 120);
        assert_eq!(s.stat_date(), StatDate::Middle);

        let smoothed = spec(Period::Monthly, AnomalyOptions::new(1970, 1979).window(3));
        let ops: Vec<String> = smoothed
            .comparison_steps(Path::new("c.nc"))
            .into_iter()
            .map(|s| s.operator)
            .collect();
        assert_eq!(ops, vec!["runmean", "ymonsub"]);
        let projected = smoothed.project(info(1970..=1979));
        assert_eq!(projected.timesteps(), 118);
        assert_eq!(projected.dates[0], NaiveDate::from_ymd_opt(1970, 3, 15).unwrap());

        let annual = spec(Period::Annual, AnomalyOptions::new(1970, 1979));
        assert_eq!(annual.project(info(1970..=1979)).timesteps(), 10);
    }

    #[test]
    fn test_options_from_args() {
        let args = json!({"baseline": [1970, 1979], "metric": "relative", "window": 2});
        let options = AnomalyOptions::from_args(args.as_object().unwrap()).unwrap();
        assert_eq!(options, AnomalyOptions::new(1970, 1979).metric(Metric::Relative).window(2));

        let args = json!({"baseline": [1970, 1979], "metric": "x"});
        assert!(AnomalyOptions::from_args(args.as_object().unwrap())
            .unwrap_err()
            .is_value_error());

        let args = json!({"baseline": [1970, 1979], "window": "x"});
        assert!(AnomalyOptions::from_args(args.as_object().unwrap())
            .unwrap_err()
            .is_type_error());

        let args = json!({"baseline": "x"});
        assert!(AnomalyOptions::from_args(args.as_object().unwrap())
            .unwrap_err()
            .is_type_error());
    }
}
