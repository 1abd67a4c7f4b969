//! Per-column outlier detection and treatment.
//!
//! Bounds for every selected column are computed once from the stage's input snapshot, then each
//! row is checked column by column in configuration order.

use serde::Serialize;

use crate::config::{OutlierAction, OutlierMethod, OutlierSpec};
use crate::error::{EngineError, EngineResult};
use crate::execution::ExecutionEngine;
use crate::stats;
use crate::types::{TabularDataset, Value};

use super::StageResult;

/// Inclusive acceptance interval for a column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    pub fn clamp(&self, v: f64) -> f64 {
        if v < self.lower {
            self.lower
        } else if v > self.upper {
            self.upper
        } else {
            v
        }
    }
}

/// Compute outlier bounds from a column's parsed values. `None` if there are no values.
///
/// - iqr: `Q1`/`Q3` are the sorted values at `floor(n*0.25)` and `floor(n*0.75)`
/// - z-score: population mean and standard deviation
/// - winsorization: sorted values at `floor(n*lower)` and `floor(n*upper)`
pub fn compute_bounds(values: &[f64], method: OutlierMethod) -> Option<Bounds> {
    match method {
        OutlierMethod::Iqr { threshold } => {
            let sorted = stats::sorted(values);
            let q1 = stats::quantile_floor(&sorted, 0.25)?;
            let q3 = stats::quantile_floor(&sorted, 0.75)?;
            let iqr = q3 - q1;
            Some(Bounds {
                lower: q1 - threshold * iqr,
                upper: q3 + threshold * iqr,
            })
        }
        OutlierMethod::ZScore { threshold } => {
            let mean = stats::mean(values)?;
            let std = stats::population_std(values)?;
            Some(Bounds {
                lower: mean - threshold * std,
                upper: mean + threshold * std,
            })
        }
        OutlierMethod::Winsorization { lower, upper } => {
            let sorted = stats::sorted(values);
            Some(Bounds {
                lower: stats::quantile_floor(&sorted, lower)?,
                upper: stats::quantile_floor(&sorted, upper)?,
            })
        }
    }
}

/// Treat outliers on the calling thread.
pub fn treat_outliers(
    dataset: &TabularDataset,
    spec: &OutlierSpec,
) -> EngineResult<TabularDataset> {
    Ok(treat_outliers_on(&ExecutionEngine::sequential(), dataset, spec)?.dataset)
}

/// Bounds per selected column index, in configuration order.
pub(crate) fn column_bounds(
    dataset: &TabularDataset,
    spec: &OutlierSpec,
) -> EngineResult<Vec<(usize, Bounds)>> {
    spec.method.validate()?;
    dataset
        .require_indices(&spec.columns)?
        .into_iter()
        .map(|col| {
            compute_bounds(&dataset.numeric_values(col), spec.method)
                .map(|b| (col, b))
                .ok_or_else(|| EngineError::EmptyColumn {
                    column: dataset.headers[col].clone(),
                })
        })
        .collect()
}

pub(crate) fn treat_outliers_on(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    spec: &OutlierSpec,
) -> EngineResult<StageResult> {
    let bounds = column_bounds(dataset, spec)?;

    let treated = engine.map_indices(dataset.row_count(), |r| {
        treat_row(&dataset.rows[r], &bounds, spec.action)
    });

    let mut modified = 0;
    let rows = treated
        .into_iter()
        .flatten()
        .map(|(row, n)| {
            modified += n;
            row
        })
        .collect();
    Ok(StageResult::new(dataset.with_rows(rows), modified))
}

/// `None` if the row is removed; otherwise the new row and how many cells changed.
fn treat_row(
    row: &[Value],
    bounds: &[(usize, Bounds)],
    action: OutlierAction,
) -> Option<(Vec<Value>, usize)> {
    let mut out = row.to_vec();
    let mut modified = 0;
    for &(col, b) in bounds {
        let Some(v) = row[col].as_number() else {
            continue;
        };
        if b.contains(v) {
            continue;
        }
        match action {
            OutlierAction::Remove => return None,
            OutlierAction::Cap => {
                out[col] = Value::Number(b.clamp(v));
                modified += 1;
            }
            OutlierAction::Transform => {
                if v > 0.0 {
                    out[col] = Value::Number(v.ln());
                    modified += 1;
                }
            }
        }
    }
    Some((out, modified))
}
