//! Weighted point estimates with confidence intervals.
//!
//! For each target column the engine pairs every parseable value with its row weight (missing or
//! unparseable weights count as `1`) and reports:
//!
//! - `estimate = Σ(w·x) / Σw`
//! - `standardError = sqrt(Σ w·(x − estimate)² / Σw / n)` with `n` the number of valid values
//! - `marginOfError = t(df) · standardError`, `df = cleaned row count − 1` shared by all targets
//! - `confidenceInterval = [estimate − marginOfError, estimate + marginOfError]`
//!
//! The t critical value comes from a coarse step table that depends on `df` only; the configured
//! confidence level is carried in [`AnalysisConfig`] but does not change it.

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, WeightConfig};
use crate::error::{EngineError, EngineResult};
use crate::execution::{ExecutionEngine, ExecutionEvent};
use crate::types::TabularDataset;

/// Weighted estimate for one target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResult {
    pub variable: String,
    pub estimate: f64,
    pub standard_error: f64,
    pub margin_of_error: f64,
    /// `[low, high]`.
    pub confidence_interval: [f64; 2],
    pub sample_size: usize,
}

/// Critical value lookup by degrees of freedom.
pub fn t_critical(df: i64) -> f64 {
    match df {
        d if d >= 30 => 1.96,
        d if d >= 20 => 2.086,
        d if d >= 10 => 2.228,
        _ => 2.571,
    }
}

/// Compute one [`EstimateResult`] per target column that has at least one parseable value.
///
/// ```rust
/// use survey_engine::analysis::estimate;
/// use survey_engine::config::{AnalysisConfig, WeightConfig};
/// use survey_engine::types::{TabularDataset, Value};
///
/// let ds = TabularDataset::new(
///     vec!["income".to_string(), "w".to_string()],
///     vec![
///         vec![Value::Number(10.0), Value::Number(1.0)],
///         vec![Value::Number(20.0), Value::Number(3.0)],
///     ],
/// ).unwrap();
///
/// let results = estimate(
///     &ds,
///     &AnalysisConfig::for_targets(["income"]),
///     &WeightConfig::weighted_by("w"),
/// ).unwrap();
/// assert_eq!(results[0].estimate, 17.5);
/// assert_eq!(results[0].sample_size, 2);
/// ```
pub fn estimate(
    dataset: &TabularDataset,
    analysis: &AnalysisConfig,
    weights: &WeightConfig,
) -> EngineResult<Vec<EstimateResult>> {
    estimate_on(&ExecutionEngine::sequential(), dataset, analysis, weights)
}

pub(crate) fn estimate_on(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    analysis: &AnalysisConfig,
    weights: &WeightConfig,
) -> EngineResult<Vec<EstimateResult>> {
    let targets = dataset.require_indices(&analysis.target_columns)?;
    let weight_idx = weights
        .weight_column
        .as_deref()
        .map(|c| dataset.require_index(c))
        .transpose()?;
    dataset.require_indices(&analysis.group_by_columns)?;
    dataset.require_indices(&weights.stratification_columns)?;

    let df = dataset.row_count() as i64 - 1;
    let t = t_critical(df);

    let mut out = Vec::with_capacity(targets.len());
    for col in targets {
        let variable = dataset.headers[col].clone();
        let pairs: Vec<(f64, f64)> = dataset
            .rows
            .iter()
            .filter_map(|row| {
                let value = row[col].as_number()?;
                let weight = weight_idx.and_then(|w| row[w].as_number()).unwrap_or(1.0);
                Some((value, weight))
            })
            .collect();

        if pairs.is_empty() {
            engine.emit(ExecutionEvent::EstimateSkipped { column: variable });
            continue;
        }

        let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
        if total_weight == 0.0 {
            return Err(EngineError::ZeroTotalWeight { column: variable });
        }

        let n = pairs.len();
        let mean = pairs.iter().map(|(x, w)| x * w).sum::<f64>() / total_weight;
        let weighted_ss: f64 = pairs.iter().map(|(x, w)| w * (x - mean).powi(2)).sum();
        let standard_error = (weighted_ss / total_weight / n as f64).sqrt();
        let margin_of_error = t * standard_error;

        out.push(EstimateResult {
            variable,
            estimate: mean,
            standard_error,
            margin_of_error,
            confidence_interval: [mean - margin_of_error, mean + margin_of_error],
            sample_size: n,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{estimate, t_critical};
    use crate::config::{AnalysisConfig, ConfidenceLevel, WeightConfig};
    use crate::error::EngineError;
    use crate::types::tests::{dataset, nums};
    use crate::types::Value;

    #[test]
    fn t_table_steps_on_degrees_of_freedom() {
        assert_eq!(t_critical(100), 1.96);
        assert_eq!(t_critical(30), 1.96);
        assert_eq!(t_critical(29), 2.086);
        assert_eq!(t_critical(20), 2.086);
        assert_eq!(t_critical(10), 2.228);
        assert_eq!(t_critical(9), 2.571);
        assert_eq!(t_critical(-1), 2.571);
    }

    #[test]
    fn unweighted_estimate_matches_formula() {
        let ds = dataset(&[("x", nums(&[Some(2.0), Some(4.0), Some(6.0), Some(8.0)]))]);
        let r = &estimate(&ds, &AnalysisConfig::for_targets(["x"]), &WeightConfig::default())
            .unwrap()[0];

        // mean 5, Σ(x-5)² = 20, /Σw = 5, /n = 1.25
        assert_eq!(r.estimate, 5.0);
        assert!((r.standard_error - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(r.margin_of_error, 2.571 * r.standard_error);
        assert_eq!(r.sample_size, 4);
        assert_eq!(r.confidence_interval, [5.0 - r.margin_of_error, 5.0 + r.margin_of_error]);
    }

    #[test]
    fn unparseable_weights_default_to_one_and_bad_values_are_dropped() {
        let ds = dataset(&[
            ("x", vec![Value::Number(1.0), Value::Number(3.0), Value::text("?"), Value::Missing]),
            (
                "w",
                vec![
                    Value::Number(3.0),
                    Value::text("n/a"),
                    Value::Number(9.0),
                    Value::Number(9.0),
                ],
            ),
        ]);
        let r = &estimate(
            &ds,
            &AnalysisConfig::for_targets(["x"]),
            &WeightConfig::weighted_by("w"),
        )
        .unwrap()[0];
        assert_eq!(r.sample_size, 2);
        assert_eq!(r.estimate, (1.0 * 3.0 + 3.0 * 1.0) / 4.0);
    }

    #[test]
    fn degrees_of_freedom_use_total_row_count() {
        // 12 rows overall but only 2 valid values in `x`: df = 11 -> 2.228.
        let mut x = vec![None; 10];
        x.extend([Some(1.0), Some(3.0)]);
        let ds = dataset(&[("x", nums(&x))]);
        let r = &estimate(&ds, &AnalysisConfig::for_targets(["x"]), &WeightConfig::default())
            .unwrap()[0];
        assert_eq!(r.margin_of_error, 2.228 * r.standard_error);
    }

    #[test]
    fn confidence_level_does_not_change_the_margin() {
        let ds = dataset(&[("x", nums(&[Some(1.0), Some(5.0), Some(9.0)]))]);
        let mut analysis = AnalysisConfig::for_targets(["x"]);
        let at95 = estimate(&ds, &analysis, &WeightConfig::default()).unwrap();
        analysis.confidence_level = ConfidenceLevel::P99;
        let at99 = estimate(&ds, &analysis, &WeightConfig::default()).unwrap();
        assert_eq!(at95, at99);
    }

    #[test]
    fn columns_without_numbers_are_skipped() {
        let ds = dataset(&[
            ("x", nums(&[Some(1.0), Some(2.0)])),
            ("name", vec![Value::text("a"), Value::Missing]),
        ]);
        let results = estimate(
            &ds,
            &AnalysisConfig::for_targets(["name", "x"]),
            &WeightConfig::default(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].variable, "x");
    }

    #[test]
    fn zero_total_weight_is_an_error() {
        let ds = dataset(&[
            ("x", nums(&[Some(1.0), Some(2.0)])),
            ("w", nums(&[Some(1.0), Some(-1.0)])),
        ]);
        let err = estimate(
            &ds,
            &AnalysisConfig::for_targets(["x"]),
            &WeightConfig::weighted_by("w"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ZeroTotalWeight { ref column } if column == "x"));
    }

    #[test]
    fn unknown_weight_or_group_column_is_an_error() {
        let ds = dataset(&[("x", nums(&[Some(1.0)]))]);
        let err = estimate(
            &ds,
            &AnalysisConfig::for_targets(["x"]),
            &WeightConfig::weighted_by("missing"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { .. }));

        let mut analysis = AnalysisConfig::for_targets(["x"]);
        analysis.group_by_columns = vec!["region".into()];
        assert!(estimate(&ds, &analysis, &WeightConfig::default()).is_err());
    }
}
