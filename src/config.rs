//! Configuration types consumed by the engine.
//!
//! The UI layer hands these over as JSON. Wire shapes are loose (a single `threshold` field carries
//! either a number or a `{lower, upper}` pair, a rule's `value` depends on its condition), so each
//! section is decoded through a private raw struct and converted with `TryFrom`. Once decoded, the
//! method enums carry exactly the parameters their method needs.
//!
//! ```rust
//! use survey_engine::config::{CleaningConfig, OutlierMethod};
//!
//! let cfg = CleaningConfig::from_json_str(r#"{
//!     "outliers": {
//!         "method": "winsorization",
//!         "threshold": {"lower": 0.1, "upper": 0.9},
//!         "action": "cap",
//!         "columns": ["income"]
//!     }
//! }"#).unwrap();
//!
//! let outliers = cfg.outliers.unwrap();
//! assert_eq!(outliers.method, OutlierMethod::Winsorization { lower: 0.1, upper: 0.9 });
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::Value;

/// Default number of neighbours for KNN imputation.
pub const DEFAULT_KNN_K: usize = 5;
/// Default IQR multiplier.
pub const DEFAULT_IQR_THRESHOLD: f64 = 1.5;
/// Default z-score cutoff.
pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;
/// Default winsorization quantiles.
pub const DEFAULT_WINSOR_LOWER: f64 = 0.05;
pub const DEFAULT_WINSOR_UPPER: f64 = 0.95;

/// The three independent cleaning sections. An absent section is a pass-through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imputation: Option<ImputationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierSpec>,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

impl CleaningConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------------------------
// Imputation
// ---------------------------------------------------------------------------------------------

/// Distance used when ranking KNN candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnnParams {
    pub k: usize,
    pub metric: DistanceMetric,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_KNN_K,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// How missing cells are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImputationMethod {
    Mean,
    Median,
    Mode,
    Knn(KnnParams),
    ForwardFill,
    BackwardFill,
    /// Drop rows with a missing value in any selected column.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImputationSpec", into = "RawImputationSpec")]
pub struct ImputationSpec {
    pub method: ImputationMethod,
    pub columns: Vec<String>,
}

impl ImputationSpec {
    pub fn new<S: Into<String>>(
        method: ImputationMethod,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            method,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ImputationMethodName {
    Mean,
    Median,
    Mode,
    Knn,
    ForwardFill,
    BackwardFill,
    Remove,
}

#[derive(Serialize, Deserialize)]
struct RawImputationSpec {
    method: ImputationMethodName,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metric: Option<DistanceMetric>,
}

impl TryFrom<RawImputationSpec> for ImputationSpec {
    type Error = EngineError;

    fn try_from(raw: RawImputationSpec) -> Result<Self, Self::Error> {
        if raw.method != ImputationMethodName::Knn && (raw.k.is_some() || raw.metric.is_some()) {
            return Err(EngineError::invalid_config(
                "`k` and `metric` only apply to knn imputation",
            ));
        }
        let method = match raw.method {
            ImputationMethodName::Mean => ImputationMethod::Mean,
            ImputationMethodName::Median => ImputationMethod::Median,
            ImputationMethodName::Mode => ImputationMethod::Mode,
            ImputationMethodName::Knn => {
                let k = raw.k.unwrap_or(DEFAULT_KNN_K);
                if k == 0 {
                    return Err(EngineError::invalid_config("knn `k` must be > 0"));
                }
                ImputationMethod::Knn(KnnParams {
                    k,
                    metric: raw.metric.unwrap_or_default(),
                })
            }
            ImputationMethodName::ForwardFill => ImputationMethod::ForwardFill,
            ImputationMethodName::BackwardFill => ImputationMethod::BackwardFill,
            ImputationMethodName::Remove => ImputationMethod::Remove,
        };
        Ok(Self {
            method,
            columns: raw.columns,
        })
    }
}

impl From<ImputationSpec> for RawImputationSpec {
    fn from(spec: ImputationSpec) -> Self {
        let (method, k, metric) = match spec.method {
            ImputationMethod::Mean => (ImputationMethodName::Mean, None, None),
            ImputationMethod::Median => (ImputationMethodName::Median, None, None),
            ImputationMethod::Mode => (ImputationMethodName::Mode, None, None),
            ImputationMethod::Knn(p) => (ImputationMethodName::Knn, Some(p.k), Some(p.metric)),
            ImputationMethod::ForwardFill => (ImputationMethodName::ForwardFill, None, None),
            ImputationMethod::BackwardFill => (ImputationMethodName::BackwardFill, None, None),
            ImputationMethod::Remove => (ImputationMethodName::Remove, None, None),
        };
        Self {
            method,
            columns: spec.columns,
            k,
            metric,
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Outliers
// ---------------------------------------------------------------------------------------------

/// Outlier bound computation. Each variant carries its own threshold shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierMethod {
    /// Tukey fences: `[Q1 - t*IQR, Q3 + t*IQR]`.
    Iqr { threshold: f64 },
    /// `[mean - t*std, mean + t*std]`.
    ZScore { threshold: f64 },
    /// Fixed quantile bounds.
    Winsorization { lower: f64, upper: f64 },
}

impl OutlierMethod {
    pub fn iqr() -> Self {
        Self::Iqr {
            threshold: DEFAULT_IQR_THRESHOLD,
        }
    }

    pub fn z_score() -> Self {
        Self::ZScore {
            threshold: DEFAULT_Z_THRESHOLD,
        }
    }

    pub fn winsorization() -> Self {
        Self::Winsorization {
            lower: DEFAULT_WINSOR_LOWER,
            upper: DEFAULT_WINSOR_UPPER,
        }
    }

    /// Check parameter domains.
    pub fn validate(&self) -> EngineResult<()> {
        match *self {
            Self::Iqr { threshold } | Self::ZScore { threshold } => {
                if !(threshold.is_finite() && threshold >= 0.0) {
                    return Err(EngineError::invalid_config(format!(
                        "outlier threshold must be a non-negative number, got {threshold}"
                    )));
                }
            }
            Self::Winsorization { lower, upper } => {
                if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower > upper {
                    return Err(EngineError::invalid_config(format!(
                        "winsorization bounds must satisfy 0 <= lower <= upper <= 1, \
                         got [{lower}, {upper}]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierAction {
    /// Clamp to the nearer bound.
    Cap,
    /// Drop the whole row.
    Remove,
    /// Replace positive out-of-bound values with their natural logarithm.
    Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutlierSpec", into = "RawOutlierSpec")]
pub struct OutlierSpec {
    pub method: OutlierMethod,
    pub action: OutlierAction,
    pub columns: Vec<String>,
}

impl OutlierSpec {
    pub fn new<S: Into<String>>(
        method: OutlierMethod,
        action: OutlierAction,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            method,
            action,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum OutlierMethodName {
    Iqr,
    ZScore,
    Winsorization,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Scalar(f64),
    Bounds { lower: f64, upper: f64 },
}

#[derive(Serialize, Deserialize)]
struct RawOutlierSpec {
    method: OutlierMethodName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<RawThreshold>,
    action: OutlierAction,
    #[serde(default)]
    columns: Vec<String>,
}

impl TryFrom<RawOutlierSpec> for OutlierSpec {
    type Error = EngineError;

    fn try_from(raw: RawOutlierSpec) -> Result<Self, Self::Error> {
        let method = match (raw.method, raw.threshold) {
            (OutlierMethodName::Iqr, None) => OutlierMethod::iqr(),
            (OutlierMethodName::Iqr, Some(RawThreshold::Scalar(threshold))) => {
                OutlierMethod::Iqr { threshold }
            }
            (OutlierMethodName::ZScore, None) => OutlierMethod::z_score(),
            (OutlierMethodName::ZScore, Some(RawThreshold::Scalar(threshold))) => {
                OutlierMethod::ZScore { threshold }
            }
            (OutlierMethodName::Winsorization, None) => OutlierMethod::winsorization(),
            (OutlierMethodName::Winsorization, Some(RawThreshold::Bounds { lower, upper })) => {
                OutlierMethod::Winsorization { lower, upper }
            }
            (OutlierMethodName::Winsorization, Some(RawThreshold::Scalar(_))) => {
                return Err(EngineError::invalid_config(
                    "winsorization threshold must be a {lower, upper} pair",
                ));
            }
            (_, Some(RawThreshold::Bounds { .. })) => {
                return Err(EngineError::invalid_config(
                    "iqr and z-score thresholds must be a single number",
                ));
            }
        };
        method.validate()?;
        Ok(Self {
            method,
            action: raw.action,
            columns: raw.columns,
        })
    }
}

impl From<OutlierSpec> for RawOutlierSpec {
    fn from(spec: OutlierSpec) -> Self {
        let (method, threshold) = match spec.method {
            OutlierMethod::Iqr { threshold } => {
                (OutlierMethodName::Iqr, RawThreshold::Scalar(threshold))
            }
            OutlierMethod::ZScore { threshold } => {
                (OutlierMethodName::ZScore, RawThreshold::Scalar(threshold))
            }
            OutlierMethod::Winsorization { lower, upper } => (
                OutlierMethodName::Winsorization,
                RawThreshold::Bounds { lower, upper },
            ),
        };
        Self {
            method,
            threshold: Some(threshold),
            action: spec.action,
            columns: spec.columns,
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Validation rules
// ---------------------------------------------------------------------------------------------

/// Predicate a row must satisfy. A row violates the rule when the predicate is false.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    GreaterThan(f64),
    LessThan(f64),
    Equals(Value),
    NotEquals(Value),
    /// Inclusive `[min, max]`.
    Range { min: f64, max: f64 },
    /// Accepted in configuration, never evaluated.
    Pattern(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    /// Report the violation without dropping the row.
    Flag,
    /// Drop violating rows.
    Remove,
    /// Accepted in configuration; has no effect.
    Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawValidationRule", into = "RawValidationRule")]
pub struct ValidationRule {
    pub column: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl ValidationRule {
    pub fn new(column: impl Into<String>, condition: RuleCondition, action: RuleAction) -> Self {
        Self {
            column: column.into(),
            condition,
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ConditionName {
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    Range,
    Pattern,
}

#[derive(Serialize, Deserialize)]
struct RawValidationRule {
    column: String,
    condition: ConditionName,
    #[serde(default)]
    value: serde_json::Value,
    action: RuleAction,
}

fn numeric_operand(column: &str, value: &serde_json::Value) -> EngineResult<f64> {
    Value::from(value).as_number().ok_or_else(|| {
        EngineError::invalid_config(format!(
            "rule on '{column}' needs a numeric value, got {value}"
        ))
    })
}

impl TryFrom<RawValidationRule> for ValidationRule {
    type Error = EngineError;

    fn try_from(raw: RawValidationRule) -> Result<Self, Self::Error> {
        let condition = match raw.condition {
            ConditionName::GreaterThan => {
                RuleCondition::GreaterThan(numeric_operand(&raw.column, &raw.value)?)
            }
            ConditionName::LessThan => {
                RuleCondition::LessThan(numeric_operand(&raw.column, &raw.value)?)
            }
            ConditionName::Equals => RuleCondition::Equals(Value::from(&raw.value)),
            ConditionName::NotEquals => RuleCondition::NotEquals(Value::from(&raw.value)),
            ConditionName::Range => {
                let bound = |key: &str| -> EngineResult<f64> {
                    let v = raw.value.get(key).ok_or_else(|| {
                        EngineError::invalid_config(format!(
                            "range rule on '{}' needs `{key}`",
                            raw.column
                        ))
                    })?;
                    numeric_operand(&raw.column, v)
                };
                let (min, max) = (bound("min")?, bound("max")?);
                if min > max {
                    return Err(EngineError::invalid_config(format!(
                        "range rule on '{}' has min {min} > max {max}",
                        raw.column
                    )));
                }
                RuleCondition::Range { min, max }
            }
            ConditionName::Pattern => RuleCondition::Pattern(match &raw.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };
        Ok(Self {
            column: raw.column,
            condition,
            action: raw.action,
        })
    }
}

impl From<ValidationRule> for RawValidationRule {
    fn from(rule: ValidationRule) -> Self {
        let (condition, value) = match &rule.condition {
            RuleCondition::GreaterThan(v) => (ConditionName::GreaterThan, serde_json::json!(v)),
            RuleCondition::LessThan(v) => (ConditionName::LessThan, serde_json::json!(v)),
            RuleCondition::Equals(v) => (ConditionName::Equals, serde_json::Value::from(v)),
            RuleCondition::NotEquals(v) => (ConditionName::NotEquals, serde_json::Value::from(v)),
            RuleCondition::Range { min, max } => {
                (ConditionName::Range, serde_json::json!({"min": min, "max": max}))
            }
            RuleCondition::Pattern(p) => (ConditionName::Pattern, serde_json::json!(p)),
        };
        Self {
            column: rule.column,
            condition,
            value,
            action: rule.action,
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightConfig {
    #[serde(default)]
    pub weight_column: Option<String>,
    /// Carried through to consumers; estimation does not stratify.
    #[serde(default)]
    pub stratification_columns: Vec<String>,
}

impl WeightConfig {
    pub fn weighted_by(column: impl Into<String>) -> Self {
        Self {
            weight_column: Some(column.into()),
            stratification_columns: Vec::new(),
        }
    }
}

/// Supported confidence levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum ConfidenceLevel {
    P90,
    #[default]
    P95,
    P99,
}

impl ConfidenceLevel {
    pub fn value(self) -> f64 {
        match self {
            Self::P90 => 0.90,
            Self::P95 => 0.95,
            Self::P99 => 0.99,
        }
    }
}

impl TryFrom<f64> for ConfidenceLevel {
    type Error = EngineError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        [Self::P90, Self::P95, Self::P99]
            .into_iter()
            .find(|level| (level.value() - v).abs() < 1e-9)
            .ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "confidence level must be 0.90, 0.95 or 0.99, got {v}"
                ))
            })
    }
}

impl From<ConfidenceLevel> for f64 {
    fn from(level: ConfidenceLevel) -> Self {
        level.value()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default)]
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub confidence_level: ConfidenceLevel,
    /// Carried through to consumers; estimates are not grouped.
    #[serde(default)]
    pub group_by_columns: Vec<String>,
}

impl AnalysisConfig {
    pub fn for_targets<S: Into<String>>(targets: impl IntoIterator<Item = S>) -> Self {
        Self {
            target_columns: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
