//! Estimation over cleaned data.
//!
//! - [`estimation`]: weighted estimates, standard errors and confidence intervals
//! - [`descriptive`]: unweighted summary statistics
//!
//! [`run_analysis`] chains a [`crate::cleaning::CleaningPipeline`] pass with both engines and
//! returns everything the report layer needs in one [`AnalysisReport`].

pub mod descriptive;
pub mod estimation;

use serde::{Deserialize, Serialize};

use crate::cleaning::{CleaningPipeline, RuleFlag, StageReport};
use crate::config::{AnalysisConfig, CleaningConfig, WeightConfig};
use crate::error::EngineResult;
use crate::execution::{ExecutionEngine, ExecutionEvent, Stage};
use crate::types::TabularDataset;

pub use descriptive::{describe, DescriptiveStat};
pub use estimation::{estimate, t_critical, EstimateResult};

/// Everything produced by one end-to-end invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub cleaned: TabularDataset,
    pub stages: Vec<StageReport>,
    pub flags: Vec<RuleFlag>,
    pub estimates: Vec<EstimateResult>,
    /// Descriptive statistics for the analysis target columns.
    pub descriptive: Vec<DescriptiveStat>,
}

/// Clean `dataset`, then estimate and describe the target columns, on a sequential engine.
pub fn run_analysis(
    dataset: &TabularDataset,
    cleaning: &CleaningConfig,
    weights: &WeightConfig,
    analysis: &AnalysisConfig,
) -> EngineResult<AnalysisReport> {
    run_analysis_on(&ExecutionEngine::sequential(), dataset, cleaning, weights, analysis)
}

/// Like [`run_analysis`], on the given engine.
pub fn run_analysis_on(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    cleaning: &CleaningConfig,
    weights: &WeightConfig,
    analysis: &AnalysisConfig,
) -> EngineResult<AnalysisReport> {
    engine.run(|e| {
        let cleaned = CleaningPipeline::new(cleaning.clone()).execute(e, dataset)?;

        e.emit(ExecutionEvent::StageStarted {
            stage: Stage::Estimation,
        });
        let estimates = estimation::estimate_on(e, &cleaned.dataset, analysis, weights)?;
        e.emit(ExecutionEvent::StageFinished {
            report: StageReport {
                stage: Stage::Estimation,
                rows_in: cleaned.dataset.row_count(),
                rows_out: cleaned.dataset.row_count(),
                cells_modified: 0,
            },
        });

        e.emit(ExecutionEvent::StageStarted {
            stage: Stage::Descriptive,
        });
        let descriptive = describe(&cleaned.dataset, &analysis.target_columns)?;
        e.emit(ExecutionEvent::StageFinished {
            report: StageReport {
                stage: Stage::Descriptive,
                rows_in: cleaned.dataset.row_count(),
                rows_out: cleaned.dataset.row_count(),
                cells_modified: 0,
            },
        });

        Ok(AnalysisReport {
            cleaned: cleaned.dataset,
            stages: cleaned.stages,
            flags: cleaned.flags,
            estimates,
            descriptive,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::run_analysis;
    use crate::config::{AnalysisConfig, CleaningConfig, WeightConfig};
    use crate::types::tests::{dataset, nums};

    #[test]
    fn report_covers_cleaning_estimation_and_description() {
        let ds = dataset(&[
            ("income", nums(&[Some(10.0), None, Some(30.0), Some(20.0)])),
            ("w", nums(&[Some(1.0), Some(1.0), Some(2.0), Some(1.0)])),
        ]);
        let cleaning = CleaningConfig::from_json_str(
            r#"{"imputation": {"method": "median", "columns": ["income"]}}"#,
        )
        .unwrap();
        let report = run_analysis(
            &ds,
            &cleaning,
            &WeightConfig::weighted_by("w"),
            &AnalysisConfig::for_targets(["income"]),
        )
        .unwrap();

        assert_eq!(report.cleaned.rows[1][0], nums(&[Some(20.0)])[0]);
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.estimates.len(), 1);
        assert_eq!(report.estimates[0].estimate, (10.0 + 20.0 + 60.0 + 20.0) / 5.0);
        assert_eq!(report.descriptive[0].count, 4);
        assert_eq!(report.descriptive[0].mean, 20.0);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["estimates"][0]["standardError"].is_number());
        assert_eq!(json["stages"][0]["stage"], "imputation");
    }
}
