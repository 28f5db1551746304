//! Core types for sweep trials and their outcomes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::error::{TrialError, TrialFailure};

/// Identifier of the asset a sweep is run against (e.g. `btc`, `eth`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create a new asset identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy conditions handed to the trial engine unchanged.
///
/// The orchestrator never interprets these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConditions {
    /// Opening price of the structure (0 = use market price at entry).
    #[serde(default)]
    pub open_price: f64,
    /// Holding period in days.
    pub period_days: u32,
    /// Profit band below the entry price, as a fraction.
    pub profit_below_price_factor: f64,
    /// Profit band above the entry price, as a fraction.
    pub profit_above_price_factor: f64,
    /// Liquidation band below the entry price, as a fraction.
    pub liquidate_below_price_factor: f64,
    /// Liquidation band above the entry price, as a fraction.
    pub liquidate_above_price_factor: f64,
}

/// A single point of the parameter grid.
///
/// Entries keep the declared dimension order. Two points compare by their
/// position in the generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPoint {
    index: usize,
    entries: Vec<(String, i64)>,
}

impl ParameterPoint {
    /// Create a point at `index` in the generation order.
    #[must_use]
    pub const fn new(index: usize, entries: Vec<(String, i64)>) -> Self {
        Self { index, entries }
    }

    /// Position in the generation order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Value of the named parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Iterate `(name, value)` pairs in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Iterate values in dimension order.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the point has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialOrd for ParameterPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParameterPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.entries.cmp(&other.entries))
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" - ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

impl Serialize for ParameterPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Everything needed to execute one trial.
#[derive(Debug, Clone)]
pub struct TrialSpec {
    /// Grid point for this trial.
    pub point: ParameterPoint,
    /// Strategy conditions shared by every trial in the sweep.
    pub strategy: StrategyConditions,
    /// Target asset.
    pub asset: AssetId,
    /// First date the simulation may open positions.
    pub start_date: NaiveDate,
}

/// Summary statistics of a completed trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    /// Fraction of positions closed in profit.
    pub percent_profitable: f64,
    /// Number of positions opened over the simulation.
    pub total_positions: u64,
    /// Fraction of positions liquidated.
    pub percent_liquidated: f64,
    /// Fraction of positions closed at a loss.
    pub percent_unprofitable: f64,
}

impl TrialStats {
    /// Column names, in output order.
    pub const COLUMNS: [&'static str; 4] = [
        "percent_profitable",
        "total_positions",
        "percent_liquidated",
        "percent_unprofitable",
    ];

    /// Extract the required metrics from an engine summary.
    pub fn from_summary(summary: &BTreeMap<String, f64>) -> Result<Self, TrialError> {
        let metric = |name: &str| {
            summary
                .get(name)
                .copied()
                .ok_or_else(|| TrialError::MissingMetric {
                    metric: name.to_string(),
                })
        };

        let total_positions = metric("total_positions")?;
        if !total_positions.is_finite() || total_positions < 0.0 || total_positions.fract() != 0.0 {
            return Err(TrialError::MalformedResponse {
                message: format!("total_positions must be a non-negative whole count, got {total_positions}"),
            });
        }

        Ok(Self {
            percent_profitable: metric("percent_profitable")?,
            total_positions: total_positions as u64,
            percent_liquidated: metric("percent_liquidated")?,
            percent_unprofitable: metric("percent_unprofitable")?,
        })
    }

    /// Cells in [`Self::COLUMNS`] order.
    #[must_use]
    pub fn cells(&self) -> [CellValue; 4] {
        [
            CellValue::Number(self.percent_profitable),
            CellValue::Int(self.total_positions as i64),
            CellValue::Number(self.percent_liquidated),
            CellValue::Number(self.percent_unprofitable),
        ]
    }
}

/// Outcome of one trial, produced exactly once per [`TrialSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// The trial ran and produced statistics.
    Success {
        /// Originating grid point.
        point: ParameterPoint,
        /// Summary statistics.
        stats: TrialStats,
    },
    /// The trial produced no statistics.
    Failure {
        /// Originating grid point.
        point: ParameterPoint,
        /// What went wrong.
        failure: TrialFailure,
    },
}

impl TrialOutcome {
    /// Grid point the outcome belongs to.
    #[must_use]
    pub const fn point(&self) -> &ParameterPoint {
        match self {
            Self::Success { point, .. } | Self::Failure { point, .. } => point,
        }
    }

    /// Whether the trial succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A single cell of a published result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Integer cell.
    Int(i64),
    /// Floating point cell.
    Number(f64),
    /// Text cell.
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn point_label_lists_dimensions_in_order() {
        let point = ParameterPoint::new(
            0,
            vec![("fear_and_greed".to_string(), 5), ("volatility".to_string(), 36)],
        );

        assert_eq!(point.to_string(), "fear_and_greed: 5 - volatility: 36");
        assert_eq!(point.get("volatility"), Some(36));
        assert_eq!(point.get("missing"), None);
    }

    #[test]
    fn points_order_by_generation_index() {
        let later = ParameterPoint::new(3, vec![("a".to_string(), 1)]);
        let earlier = ParameterPoint::new(1, vec![("a".to_string(), 9)]);

        assert!(earlier < later);
    }

    #[test]
    fn point_serializes_as_ordered_map() {
        let point = ParameterPoint::new(0, vec![("zeta".to_string(), 1), ("alpha".to_string(), 2)]);
        let json = serde_json::to_string(&point).unwrap();

        assert_eq!(json, r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn stats_from_complete_summary() {
        let stats = TrialStats::from_summary(&summary(&[
            ("percent_profitable", 0.61),
            ("total_positions", 150.0),
            ("percent_liquidated", 0.1),
            ("percent_unprofitable", 0.29),
            ("average_hold_days", 12.0),
        ]))
        .unwrap();

        assert_eq!(stats.total_positions, 150);
        assert!((stats.percent_profitable - 0.61).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_missing_metric_is_an_error() {
        let result = TrialStats::from_summary(&summary(&[
            ("percent_profitable", 0.61),
            ("total_positions", 150.0),
        ]));

        assert_eq!(
            result,
            Err(TrialError::MissingMetric {
                metric: "percent_liquidated".to_string()
            })
        );
    }

    #[test]
    fn stats_reject_negative_position_count() {
        let result = TrialStats::from_summary(&summary(&[
            ("percent_profitable", 0.5),
            ("total_positions", -3.0),
            ("percent_liquidated", 0.0),
            ("percent_unprofitable", 0.5),
        ]));

        assert!(matches!(result, Err(TrialError::MalformedResponse { .. })));
    }

    #[test]
    fn stats_reject_fractional_position_count() {
        let result = TrialStats::from_summary(&summary(&[
            ("percent_profitable", 0.5),
            ("total_positions", 100.4),
            ("percent_liquidated", 0.0),
            ("percent_unprofitable", 0.5),
        ]));

        assert!(matches!(
            result,
            Err(TrialError::MalformedResponse { ref message }) if message.contains("100.4")
        ));
    }

    #[test]
    fn cell_values_serialize_untagged() {
        let row = vec![CellValue::Int(5), CellValue::Number(0.5), CellValue::from("x")];
        let json = serde_json::to_string(&row).unwrap();

        assert_eq!(json, r#"[5,0.5,"x"]"#);
    }
}
