//! `survey-engine` cleans rectangular survey datasets and produces weighted population estimates.
//!
//! The crate is a pure, in-memory transformation: callers hand over a [`types::TabularDataset`]
//! (already parsed by their ingestion layer) plus configuration, and get back new owned result
//! structures. No file I/O, rendering or state between invocations.
//!
//! ## Pipeline
//!
//! ```text
//! raw rows -> imputation -> outliers -> validation -> cleaned rows -> { estimation, descriptive }
//! ```
//!
//! - **Imputation**: mean, median, mode, KNN (k = 5, inverse-distance weighted), forward/backward
//!   fill, or remove
//! - **Outliers**: IQR, z-score or winsorization bounds; cap, remove or log-transform
//! - **Validation**: `greater-than`, `less-than`, `equals`, `not-equals`, `range` rules that
//!   remove or flag rows
//! - **Estimation**: weighted mean, standard error, margin of error and confidence interval per
//!   target column
//! - **Descriptive**: count, mean, median, population std, min and max
//!
//! Cells are [`types::Value`]s: `Missing`, `Number` or `Text`. Whether a cell takes part in a
//! numeric computation is decided by [`types::Value::as_number`]; cells that do not parse are
//! skipped, never treated as zero.
//!
//! ## Example
//!
//! ```rust
//! use survey_engine::analysis::run_analysis;
//! use survey_engine::config::{AnalysisConfig, CleaningConfig, WeightConfig};
//! use survey_engine::types::{TabularDataset, Value};
//!
//! # fn main() -> Result<(), survey_engine::EngineError> {
//! let ds = TabularDataset::new(
//!     vec!["income".to_string(), "weight".to_string()],
//!     vec![
//!         vec![Value::Number(1200.0), Value::Number(1.0)],
//!         vec![Value::Missing, Value::Number(2.0)],
//!         vec![Value::Number(1800.0), Value::Number(1.0)],
//!     ],
//! )?;
//!
//! let cleaning = CleaningConfig::from_json_str(r#"{
//!     "imputation": {"method": "mean", "columns": ["income"]},
//!     "outliers": {"method": "iqr", "threshold": 1.5, "action": "cap", "columns": ["income"]}
//! }"#)?;
//! let weights = WeightConfig::weighted_by("weight");
//! let analysis = AnalysisConfig::for_targets(["income"]);
//!
//! let report = run_analysis(&ds, &cleaning, &weights, &analysis)?;
//! let income = &report.estimates[0];
//! assert_eq!(income.estimate, 1500.0);
//! assert!(income.confidence_interval[0] < 1500.0 && income.confidence_interval[1] > 1500.0);
//! assert!(report.flags.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Parallel execution
//!
//! The default engine is sequential. [`execution::ExecutionEngine::new`] builds a rayon-backed
//! engine that chunks KNN searches and per-row outlier/rule checks; its output is identical to the
//! sequential engine. Attach an [`execution::ExecutionObserver`] to receive stage and chunk events.
//!
//! ## Modules
//!
//! - [`types`]: dataset and cell types, numeric column classification
//! - [`config`]: cleaning, weighting and analysis configuration (serde/JSON)
//! - [`cleaning`]: imputation, outlier and validation stages plus the pipeline
//! - [`analysis`]: estimation, descriptive statistics and the end-to-end entrypoint
//! - [`execution`]: execution engine, observers and metrics
//! - [`error`]: the shared error type

pub mod analysis;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod execution;
mod stats;
pub mod types;

pub use error::{EngineError, EngineResult};
