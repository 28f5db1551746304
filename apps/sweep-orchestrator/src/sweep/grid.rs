//! Parameter grid for sweep trials.
//!
//! The grid is the row-major cartesian product of the declared ranges: the
//! first range is the outer loop, the last range varies fastest.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::SweepError;
use super::types::ParameterPoint;

/// How range bounds are interpreted. One convention applies to a whole grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeConvention {
    /// `[low, high)`.
    #[default]
    HalfOpen,
    /// `[low, high]`.
    Inclusive,
}

/// A named integer range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    /// Parameter name.
    pub name: String,
    /// Lower bound (always inclusive).
    pub low: i64,
    /// Upper bound, interpreted per [`RangeConvention`].
    pub high: i64,
    /// Distance between consecutive values.
    #[serde(default = "default_step")]
    pub step: i64,
}

const fn default_step() -> i64 {
    1
}

impl ParamRange {
    /// Create a unit-step range.
    #[must_use]
    pub fn new(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            step: 1,
        }
    }

    fn values(&self, convention: RangeConvention) -> Result<Vec<i64>, SweepError> {
        let invalid = |reason: String| SweepError::InvalidRange {
            name: self.name.clone(),
            reason,
        };

        if self.step <= 0 {
            return Err(invalid(format!("step must be positive, got {}", self.step)));
        }
        if self.low > self.high {
            return Err(invalid(format!(
                "inverted bounds: low {} > high {}",
                self.low, self.high
            )));
        }

        let step = self.step.unsigned_abs() as usize;
        let values: Vec<i64> = match convention {
            RangeConvention::HalfOpen => (self.low..self.high).step_by(step).collect(),
            RangeConvention::Inclusive => (self.low..=self.high).step_by(step).collect(),
        };

        if values.is_empty() {
            return Err(invalid(format!(
                "empty range [{}, {})",
                self.low, self.high
            )));
        }
        Ok(values)
    }
}

/// A validated parameter grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGrid {
    names: Vec<String>,
    values: Vec<Vec<i64>>,
    total: usize,
}

impl ParameterGrid {
    /// Create a new parameter grid builder.
    #[must_use]
    pub fn builder() -> ParameterGridBuilder {
        ParameterGridBuilder::new()
    }

    /// Build a grid from declared ranges.
    pub fn from_ranges(
        ranges: &[ParamRange],
        convention: RangeConvention,
    ) -> Result<Self, SweepError> {
        ranges
            .iter()
            .cloned()
            .fold(ParameterGrid::builder().convention(convention), |b, r| {
                b.add(r)
            })
            .build()
    }

    /// Get the total number of parameter combinations.
    #[must_use]
    pub const fn total_combinations(&self) -> usize {
        self.total
    }

    /// Dimension names in declared order.
    #[must_use]
    pub fn dimension_names(&self) -> &[String] {
        &self.names
    }

    /// The point at `index` in generation order.
    #[must_use]
    pub fn point_at(&self, index: usize) -> Option<ParameterPoint> {
        if index >= self.total {
            return None;
        }

        let mut entries = vec![(String::new(), 0); self.names.len()];
        let mut rem = index;
        for dim in (0..self.names.len()).rev() {
            let values = &self.values[dim];
            entries[dim] = (self.names[dim].clone(), values[rem % values.len()]);
            rem /= values.len();
        }
        Some(ParameterPoint::new(index, entries))
    }

    /// Iterate all points in generation order. Each call starts over.
    #[must_use]
    pub const fn points(&self) -> GridPoints<'_> {
        GridPoints {
            grid: self,
            next: 0,
        }
    }
}

/// Iterator over the points of a [`ParameterGrid`].
#[derive(Debug, Clone)]
pub struct GridPoints<'a> {
    grid: &'a ParameterGrid,
    next: usize,
}

impl Iterator for GridPoints<'_> {
    type Item = ParameterPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let point = self.grid.point_at(self.next)?;
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridPoints<'_> {}

/// Builder for parameter grids.
#[derive(Debug, Default)]
pub struct ParameterGridBuilder {
    convention: RangeConvention,
    ranges: Vec<ParamRange>,
}

impl ParameterGridBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bound convention for every range.
    #[must_use]
    pub const fn convention(mut self, convention: RangeConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Add a declared range.
    #[must_use]
    pub fn add(mut self, range: ParamRange) -> Self {
        self.ranges.push(range);
        self
    }

    /// Add a unit-step range.
    #[must_use]
    pub fn add_range(self, name: &str, low: i64, high: i64) -> Self {
        self.add(ParamRange::new(name, low, high))
    }

    /// Add a range with an explicit step.
    #[must_use]
    pub fn add_stepped_range(self, name: &str, low: i64, high: i64, step: i64) -> Self {
        self.add(ParamRange {
            name: name.to_string(),
            low,
            high,
            step,
        })
    }

    /// Validate the ranges and build the grid.
    pub fn build(self) -> Result<ParameterGrid, SweepError> {
        if self.ranges.is_empty() {
            return Err(SweepError::InvalidRange {
                name: String::new(),
                reason: "no dimensions declared".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.ranges.len());
        let mut values = Vec::with_capacity(self.ranges.len());
        let mut total: usize = 1;

        for range in &self.ranges {
            if range.name.trim().is_empty() {
                return Err(SweepError::InvalidRange {
                    name: range.name.clone(),
                    reason: "parameter name is empty".to_string(),
                });
            }
            if !seen.insert(range.name.as_str()) {
                return Err(SweepError::InvalidRange {
                    name: range.name.clone(),
                    reason: "parameter declared more than once".to_string(),
                });
            }

            let range_values = range.values(self.convention)?;
            total = total
                .checked_mul(range_values.len())
                .ok_or_else(|| SweepError::InvalidRange {
                    name: range.name.clone(),
                    reason: "grid size overflows".to_string(),
                })?;

            names.push(range.name.clone());
            values.push(range_values);
        }

        Ok(ParameterGrid {
            names,
            values,
            total,
        })
    }
}
