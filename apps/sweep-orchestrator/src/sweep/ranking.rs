//! Final ranking of the result table.
//!
//! Ranks use standard competition ordering ("1224"): rank 1 is the highest
//! value, tied values share the best rank of their group, and the next
//! distinct value skips the positions the tie consumed. NaN ranks last.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::types::TrialStats;

/// Metric the table can be ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    /// Fraction of profitable positions.
    #[default]
    PercentProfitable,
    /// Number of positions.
    TotalPositions,
    /// Fraction of liquidated positions.
    PercentLiquidated,
    /// Fraction of unprofitable positions.
    PercentUnprofitable,
}

impl RankMetric {
    /// Metric value of a row.
    #[must_use]
    pub const fn value(&self, stats: &TrialStats) -> f64 {
        match self {
            Self::PercentProfitable => stats.percent_profitable,
            Self::TotalPositions => stats.total_positions as f64,
            Self::PercentLiquidated => stats.percent_liquidated,
            Self::PercentUnprofitable => stats.percent_unprofitable,
        }
    }
}

/// Descending order with NaN after every number.
fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Competition ranks for `values`, aligned with the input order.
#[must_use]
pub fn competition_ranks(values: &[f64]) -> Vec<u64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| descending(values[a], values[b]));

    let mut ranks = vec![0; values.len()];
    let mut current_rank = 0;
    for (position, &idx) in order.iter().enumerate() {
        let ties_previous = position > 0
            && descending(values[order[position - 1]], values[idx]) == Ordering::Equal;
        if !ties_previous {
            current_rank = position as u64 + 1;
        }
        ranks[idx] = current_rank;
    }
    ranks
}
