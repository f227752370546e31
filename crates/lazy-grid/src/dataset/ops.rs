//! Reductions, selections and structural operations.

use std::collections::BTreeSet;

use chrono::Datelike;

use super::Dataset;
use crate::error::{value_error, Result};
use crate::pipeline::{CommandNode, Operator, SplitBy, TimeGroup};
use crate::validate;

impl Dataset {
    /// Area mean of every field, leaving a single cell.
    pub fn spatial_mean(&mut self) -> Result<&mut Self> {
        self.unary(Operator::SpatialMean)
    }

    pub fn spatial_sum(&mut self) -> Result<&mut Self> {
        self.unary(Operator::SpatialSum)
    }

    /// Mean over time, optionally per year, month or year-month.
    pub fn tmean(&mut self, by: TimeGroup) -> Result<&mut Self> {
        self.unary(Operator::TimeMean(by))
    }

    /// Keep only the given years. At least one must be present.
    pub fn subset_years<I>(&mut self, years: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = i32>,
    {
        self.require_data()?;
        let years: Vec<i32> = years.into_iter().collect();
        if years.is_empty() {
            return Err(value_error("no years given"));
        }
        let layout = self.layout()?;
        let present = layout
            .iter()
            .all(|info| info.dates.iter().any(|d| years.contains(&d.year())));
        if !present {
            return Err(value_error(format!(
                "none of the years {:?} are in the dataset",
                years
            )));
        }
        self.submit(CommandNode::unary(Operator::SelectYears(years)))
    }

    /// Keep only the given calendar months (1-12).
    pub fn subset_months<I>(&mut self, months: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = u32>,
    {
        self.require_data()?;
        let months: Vec<u32> = months.into_iter().collect();
        validate::check_months(&months)?;
        self.submit(CommandNode::unary(Operator::SelectMonths(months)))
    }

    /// Keep only the given timesteps, counted from 0.
    pub fn subset_timesteps<I>(&mut self, steps: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = usize>,
    {
        self.require_data()?;
        let steps: Vec<usize> = steps.into_iter().collect();
        if steps.is_empty() {
            return Err(value_error("no timesteps given"));
        }
        let available = self
            .layout()?
            .iter()
            .map(|info| info.timesteps())
            .min()
            .unwrap_or(0);
        if let Some(bad) = steps.iter().find(|s| **s >= available) {
            return Err(value_error(format!(
                "timestep {} is out of range (dataset has {})",
                bad, available
            )));
        }
        self.submit(CommandNode::unary(Operator::SelectTimesteps(steps)))
    }

    /// Keep only the named variables.
    pub fn select_variables<I, S>(&mut self, variables: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_data()?;
        let variables: Vec<String> = variables.into_iter().map(Into::into).collect();
        if variables.is_empty() {
            return Err(value_error("no variables given"));
        }
        let layout = self.layout()?;
        for variable in &variables {
            validate::check_has_variable(&layout, variable)?;
        }
        self.submit(CommandNode::unary(Operator::SelectVariables(variables)))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        self.require_data()?;
        validate::check_has_variable(&self.layout()?, from)?;
        if to.trim().is_empty() {
            return Err(value_error("new variable name is empty"));
        }
        self.submit(CommandNode::unary(Operator::Rename {
            from: from.to_string(),
            to: to.to_string(),
        }))
    }

    /// Concatenate every file along the time axis into one file.
    ///
    /// Files must share variables and grid.
    pub fn merge_time(&mut self) -> Result<&mut Self> {
        self.require_data()?;
        let layout = self.layout()?;
        if let Some((first, rest)) = layout.split_first() {
            let variables: BTreeSet<&String> = first.variables.iter().collect();
            for info in rest {
                if info.variables.iter().collect::<BTreeSet<_>>() != variables {
                    return Err(value_error("cannot merge files with different variables"));
                }
                validate::check_grids(first, info)?;
            }
        }
        self.submit(CommandNode::unary(Operator::MergeTime))
    }

    /// Split every file into one file per year (or year-month).
    pub fn split(&mut self, by: SplitBy) -> Result<&mut Self> {
        self.unary(Operator::Split(by))
    }
}
