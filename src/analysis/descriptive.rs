//! Unweighted per-column summary statistics.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::stats;
use crate::types::TabularDataset;

/// Summary of a column's parseable numeric values, rounded to 4 decimal places.
///
/// A column without numeric values yields an all-zero record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DescriptiveStat {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Describe each requested column.
pub fn describe<S: AsRef<str>>(
    dataset: &TabularDataset,
    columns: &[S],
) -> EngineResult<Vec<DescriptiveStat>> {
    dataset
        .require_indices(columns)?
        .into_iter()
        .map(|col| Ok(describe_values(&dataset.headers[col], &dataset.numeric_values(col))))
        .collect()
}

fn describe_values(column: &str, values: &[f64]) -> DescriptiveStat {
    let sorted = stats::sorted(values);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return DescriptiveStat {
            column: column.to_string(),
            ..Default::default()
        };
    };
    DescriptiveStat {
        column: column.to_string(),
        count: sorted.len(),
        mean: stats::round4(stats::mean(&sorted).unwrap_or_default()),
        median: stats::round4(stats::median_sorted(&sorted).unwrap_or_default()),
        std: stats::round4(stats::population_std(&sorted).unwrap_or_default()),
        min: stats::round4(min),
        max: stats::round4(max),
    }
}
