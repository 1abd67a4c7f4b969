//! Missing-value imputation.
//!
//! Replacement values are derived from the stage's input snapshot: every selected column is
//! filled independently, and a column's statistic never sees values imputed for another column (or
//! earlier rows of the same column). The output therefore does not depend on row or column
//! processing order.
//!
//! Columns are classified once with [`crate::types::classify_values`]. `mean` and `median` on a
//! text column fall back to the mode; KNN averages numeric targets and votes on text targets.

use crate::config::{DistanceMetric, ImputationMethod, ImputationSpec, KnnParams};
use crate::error::{EngineError, EngineResult};
use crate::execution::ExecutionEngine;
use crate::stats;
use crate::types::{ColumnKind, TabularDataset, Value};

use super::StageResult;

/// Offset added to KNN distances before inverting them into weights.
const DISTANCE_EPSILON: f64 = 1e-8;

/// Impute the selected columns on the calling thread.
///
/// ```rust
/// use survey_engine::cleaning::impute;
/// use survey_engine::config::{ImputationMethod, ImputationSpec};
/// use survey_engine::types::{TabularDataset, Value};
///
/// let ds = TabularDataset::new(
///     vec!["x".to_string()],
///     vec![
///         vec![Value::Number(1.0)],
///         vec![Value::Number(2.0)],
///         vec![Value::Number(3.0)],
///         vec![Value::Missing],
///         vec![Value::Number(5.0)],
///     ],
/// ).unwrap();
///
/// let out = impute(&ds, &ImputationSpec::new(ImputationMethod::Mean, ["x"])).unwrap();
/// assert_eq!(out.rows[3][0], Value::Number(2.75));
/// ```
pub fn impute(dataset: &TabularDataset, spec: &ImputationSpec) -> EngineResult<TabularDataset> {
    Ok(impute_on(&ExecutionEngine::sequential(), dataset, spec)?.dataset)
}

pub(crate) fn impute_on(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    spec: &ImputationSpec,
) -> EngineResult<StageResult> {
    let targets = dataset.require_indices(&spec.columns)?;

    if spec.method == ImputationMethod::Remove {
        let out = dataset.filter_rows(|row| targets.iter().all(|&c| !row[c].is_missing()));
        return Ok(StageResult::new(out, 0));
    }

    let mut fills: Vec<(usize, usize, Value)> = Vec::new();
    for &col in &targets {
        let missing: Vec<usize> = (0..dataset.row_count())
            .filter(|&r| dataset.rows[r][col].is_missing())
            .collect();
        if missing.is_empty() {
            continue;
        }
        let values = match spec.method {
            ImputationMethod::Mean | ImputationMethod::Median | ImputationMethod::Mode => {
                let fill = column_statistic(dataset, col, spec.method)?;
                vec![fill; missing.len()]
            }
            ImputationMethod::Knn(params) => knn_fill(engine, dataset, col, &missing, params)?,
            ImputationMethod::ForwardFill => directional_fill(dataset, col, &missing, true)?,
            ImputationMethod::BackwardFill => directional_fill(dataset, col, &missing, false)?,
            ImputationMethod::Remove => unreachable!("handled above"),
        };
        fills.extend(missing.into_iter().zip(values).map(|(r, v)| (r, col, v)));
    }

    let filled = fills.len();
    let mut rows = dataset.rows.clone();
    for (r, c, v) in fills {
        rows[r][c] = v;
    }
    Ok(StageResult::new(dataset.with_rows(rows), filled))
}

fn empty_column(dataset: &TabularDataset, col: usize) -> EngineError {
    EngineError::EmptyColumn {
        column: dataset.headers[col].clone(),
    }
}

fn column_statistic(
    dataset: &TabularDataset,
    col: usize,
    method: ImputationMethod,
) -> EngineResult<Value> {
    let fill = match (dataset.classify_column(col), method) {
        (ColumnKind::Numeric, ImputationMethod::Mean) => {
            stats::mean(&dataset.numeric_values(col)).map(Value::Number)
        }
        (ColumnKind::Numeric, ImputationMethod::Median) => {
            stats::median(&dataset.numeric_values(col)).map(Value::Number)
        }
        _ => stats::mode(dataset.column(col)),
    };
    fill.ok_or_else(|| empty_column(dataset, col))
}

/// Propagate the nearest present value in the fill direction.
///
/// A gap with nothing to propagate from (leading gap under forward fill, trailing gap under
/// backward fill) takes the nearest present value from the other side.
fn directional_fill(
    dataset: &TabularDataset,
    col: usize,
    missing: &[usize],
    forward: bool,
) -> EngineResult<Vec<Value>> {
    let n = dataset.row_count();
    let mut preceding: Vec<Option<&Value>> = vec![None; n];
    let mut following: Vec<Option<&Value>> = vec![None; n];

    let mut last = None;
    for r in 0..n {
        let v = &dataset.rows[r][col];
        if !v.is_missing() {
            last = Some(v);
        }
        preceding[r] = last;
    }
    last = None;
    for r in (0..n).rev() {
        let v = &dataset.rows[r][col];
        if !v.is_missing() {
            last = Some(v);
        }
        following[r] = last;
    }

    missing
        .iter()
        .map(|&r| {
            let (first, second) = if forward {
                (preceding[r], following[r])
            } else {
                (following[r], preceding[r])
            };
            first
                .or(second)
                .cloned()
                .ok_or_else(|| empty_column(dataset, col))
        })
        .collect()
}

/// Per-column state shared by every missing-cell search.
struct KnnColumn<'a> {
    dataset: &'a TabularDataset,
    target: usize,
    kind: ColumnKind,
    features: Vec<usize>,
    /// Eligible neighbour rows and their target value.
    candidates: Vec<(usize, Value)>,
    params: KnnParams,
}

impl KnnColumn<'_> {
    fn distance(&self, a: usize, b: usize) -> Option<f64> {
        let (ra, rb) = (&self.dataset.rows[a], &self.dataset.rows[b]);
        let mut shared = 0usize;
        let mut acc = 0.0;
        for &f in &self.features {
            let (Some(x), Some(y)) = (ra[f].as_number(), rb[f].as_number()) else {
                continue;
            };
            shared += 1;
            acc += match self.params.metric {
                DistanceMetric::Euclidean => (x - y).powi(2),
                DistanceMetric::Manhattan => (x - y).abs(),
            };
        }
        if shared == 0 {
            return None;
        }
        Some(match self.params.metric {
            DistanceMetric::Euclidean => acc.sqrt(),
            DistanceMetric::Manhattan => acc,
        })
    }

    /// `None` when no neighbour is usable and the column fallback applies.
    fn impute_row(&self, row: usize) -> Option<Value> {
        let mut neighbours: Vec<(f64, &Value)> = self
            .candidates
            .iter()
            .filter_map(|(c, v)| self.distance(row, *c).map(|d| (d, v)))
            .collect();
        // Stable sort keeps original row order among equal distances.
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbours.truncate(self.params.k);
        if neighbours.is_empty() {
            return None;
        }

        match self.kind {
            ColumnKind::Numeric => {
                let (mut weighted, mut total) = (0.0, 0.0);
                for (d, v) in &neighbours {
                    let w = if *d == 0.0 {
                        1.0
                    } else {
                        1.0 / (d + DISTANCE_EPSILON)
                    };
                    weighted += w * v.as_number()?;
                    total += w;
                }
                (total > 0.0).then(|| Value::Number(weighted / total))
            }
            ColumnKind::Text => stats::mode(neighbours.iter().map(|(_, v)| *v)),
        }
    }
}

fn knn_fill(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    target: usize,
    missing: &[usize],
    params: KnnParams,
) -> EngineResult<Vec<Value>> {
    let kind = dataset.classify_column(target);
    let features = (0..dataset.headers.len())
        .filter(|&c| c != target && dataset.classify_column(c) == ColumnKind::Numeric)
        .collect();
    let candidates = dataset
        .rows
        .iter()
        .enumerate()
        .filter_map(|(r, row)| {
            let v = &row[target];
            let eligible = match kind {
                ColumnKind::Numeric => v.as_number().is_some(),
                ColumnKind::Text => !v.is_missing(),
            };
            eligible.then(|| (r, v.clone()))
        })
        .collect();

    let knn = KnnColumn {
        dataset,
        target,
        kind,
        features,
        candidates,
        params,
    };

    let imputed = engine.map_indices(missing.len(), |i| knn.impute_row(missing[i]));

    if imputed.iter().all(Option::is_some) {
        return Ok(imputed.into_iter().flatten().collect());
    }
    let fallback = knn.fallback()?;
    Ok(imputed
        .into_iter()
        .map(|v| v.unwrap_or_else(|| fallback.clone()))
        .collect())
}

impl KnnColumn<'_> {
    /// Column mean for numeric targets, mode for text targets.
    fn fallback(&self) -> EngineResult<Value> {
        let method = match self.kind {
            ColumnKind::Numeric => ImputationMethod::Mean,
            ColumnKind::Text => ImputationMethod::Mode,
        };
        column_statistic(self.dataset, self.target, method)
    }
}
