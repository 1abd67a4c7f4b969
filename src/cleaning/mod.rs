//! Dataset cleaning: imputation, outlier treatment and rule validation.
//!
//! Each stage is a pure function from a dataset to a new, exclusively owned dataset. The
//! [`CleaningPipeline`] runs the configured stages in a fixed order:
//!
//! 1. [`imputation`]: fill (or drop) missing cells
//! 2. [`outliers`]: cap, log-transform or drop out-of-bound values
//! 3. [`validation`]: drop rows violating `remove` rules, report `flag` rules
//!
//! Every stage computes its statistics from its own input, so outlier bounds are derived from
//! already-imputed data. A section absent from [`CleaningConfig`] is skipped.
//!
//! ## Example
//!
//! ```rust
//! use survey_engine::cleaning::CleaningPipeline;
//! use survey_engine::config::CleaningConfig;
//! use survey_engine::types::{TabularDataset, Value};
//!
//! let ds = TabularDataset::new(
//!     vec!["age".to_string()],
//!     vec![
//!         vec![Value::Number(34.0)],
//!         vec![Value::Missing],
//!         vec![Value::Number(-1.0)],
//!     ],
//! ).unwrap();
//!
//! let config = CleaningConfig::from_json_str(r#"{
//!     "imputation": {"method": "median", "columns": ["age"]},
//!     "rules": [{"column": "age", "condition": "greater-than", "value": 0, "action": "remove"}]
//! }"#).unwrap();
//!
//! let outcome = CleaningPipeline::new(config).run(&ds).unwrap();
//! assert_eq!(outcome.dataset.rows, vec![vec![Value::Number(34.0)], vec![Value::Number(16.5)]]);
//! assert_eq!(outcome.stages.len(), 2);
//! ```

pub mod imputation;
pub mod outliers;
pub mod validation;

use serde::{Deserialize, Serialize};

use crate::config::CleaningConfig;
use crate::error::EngineResult;
use crate::execution::{ExecutionEngine, ExecutionEvent, Stage};
use crate::types::TabularDataset;

pub use imputation::impute;
pub use outliers::{compute_bounds, treat_outliers, Bounds};
pub use validation::{apply_rules, violates, RuleFlag};

/// Output of a single stage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StageResult {
    pub dataset: TabularDataset,
    pub cells_modified: usize,
    pub flags: Vec<RuleFlag>,
}

impl StageResult {
    pub(crate) fn new(dataset: TabularDataset, cells_modified: usize) -> Self {
        Self {
            dataset,
            cells_modified,
            flags: Vec::new(),
        }
    }
}

/// Summary of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Cells imputed, capped or transformed.
    pub cells_modified: usize,
}

/// Result of a full cleaning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningOutcome {
    pub dataset: TabularDataset,
    /// One report per executed stage, in execution order.
    pub stages: Vec<StageReport>,
    pub flags: Vec<RuleFlag>,
}

/// Composes imputation, outlier treatment and validation.
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    config: CleaningConfig,
}

impl CleaningPipeline {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Run on a sequential engine.
    pub fn run(&self, dataset: &TabularDataset) -> EngineResult<CleaningOutcome> {
        self.run_on(&ExecutionEngine::sequential(), dataset)
    }

    /// Run on the given engine, emitting run and stage events to its observer.
    pub fn run_on(
        &self,
        engine: &ExecutionEngine,
        dataset: &TabularDataset,
    ) -> EngineResult<CleaningOutcome> {
        engine.run(|e| self.execute(e, dataset))
    }

    /// Fail before any stage runs if the configuration references unknown columns or carries
    /// out-of-domain parameters.
    fn check(&self, dataset: &TabularDataset) -> EngineResult<()> {
        if let Some(spec) = &self.config.imputation {
            dataset.require_indices(&spec.columns)?;
        }
        if let Some(spec) = &self.config.outliers {
            spec.method.validate()?;
            dataset.require_indices(&spec.columns)?;
        }
        for rule in &self.config.rules {
            dataset.require_index(&rule.column)?;
        }
        Ok(())
    }

    pub(crate) fn execute(
        &self,
        engine: &ExecutionEngine,
        dataset: &TabularDataset,
    ) -> EngineResult<CleaningOutcome> {
        self.check(dataset)?;

        let mut current = dataset.clone();
        let mut stages = Vec::new();
        let mut flags = Vec::new();

        if let Some(spec) = &self.config.imputation {
            let result = run_stage(engine, Stage::Imputation, &current, &mut stages, |ds| {
                imputation::impute_on(engine, ds, spec)
            })?;
            current = result.dataset;
        }

        if let Some(spec) = &self.config.outliers {
            let result = run_stage(engine, Stage::Outliers, &current, &mut stages, |ds| {
                outliers::treat_outliers_on(engine, ds, spec)
            })?;
            current = result.dataset;
        }

        if !self.config.rules.is_empty() {
            let result = run_stage(engine, Stage::Validation, &current, &mut stages, |ds| {
                validation::apply_rules_on(engine, ds, &self.config.rules)
            })?;
            for flag in &result.flags {
                engine.emit(ExecutionEvent::RuleFlagged { flag: flag.clone() });
            }
            flags = result.flags;
            current = result.dataset;
        }

        Ok(CleaningOutcome {
            dataset: current,
            stages,
            flags,
        })
    }
}

fn run_stage<F>(
    engine: &ExecutionEngine,
    stage: Stage,
    input: &TabularDataset,
    reports: &mut Vec<StageReport>,
    body: F,
) -> EngineResult<StageResult>
where
    F: FnOnce(&TabularDataset) -> EngineResult<StageResult>,
{
    engine.emit(ExecutionEvent::StageStarted { stage });
    let result = body(input)?;
    let report = StageReport {
        stage,
        rows_in: input.row_count(),
        rows_out: result.dataset.row_count(),
        cells_modified: result.cells_modified,
    };
    engine.emit(ExecutionEvent::StageFinished {
        report: report.clone(),
    });
    reports.push(report);
    Ok(result)
}

/// Clean `dataset` with `config` on a sequential engine.
pub fn clean(dataset: &TabularDataset, config: &CleaningConfig) -> EngineResult<CleaningOutcome> {
    CleaningPipeline::new(config.clone()).run(dataset)
}
