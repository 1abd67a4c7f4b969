//! Core data model types for the cleaning and estimation engine.
//!
//! Every stage operates on a [`TabularDataset`]: an ordered list of unique headers plus row-major
//! [`Value`] storage aligned with those headers. Stages never mutate their input; they build new
//! datasets with [`TabularDataset::with_rows`] or [`TabularDataset::filter_rows`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// How many non-missing cells are sampled when classifying a column.
pub const NUMERIC_SAMPLE_SIZE: usize = 100;

/// Share of sampled cells that must parse as finite numbers for a column to be numeric.
pub const NUMERIC_SAMPLE_RATIO: f64 = 0.7;

/// A single cell value.
///
/// `Missing` is distinct from `Number(0.0)` and from `Text("")`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing marker.
    #[default]
    Missing,
    /// Numeric cell (already coerced by ingestion).
    Number(f64),
    /// Any other cell content.
    Text(String),
}

impl Value {
    /// Shorthand for `Value::Text`.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Parse the cell as a finite number.
    ///
    /// Numbers must be finite; text is trimmed and parsed. Everything else is `None`, which callers
    /// treat as "excluded from this computation".
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Number(_) | Self::Missing => None,
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Grouping key used for frequency counts (mode).
    pub(crate) fn group_key(&self) -> String {
        match self {
            Self::Missing => String::new(),
            Self::Number(v) => format!("{v}"),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("null"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Self::Number).unwrap_or(Self::Missing)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Missing),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Missing => serde_json::Value::Null,
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Result of numeric-vs-text column classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Classify a sequence of cells.
///
/// The first [`NUMERIC_SAMPLE_SIZE`] non-missing cells are sampled; the column is numeric when at
/// least [`NUMERIC_SAMPLE_RATIO`] of them parse as finite numbers. A column with no non-missing
/// cells is `Text`.
pub fn classify_values<'a, I>(values: I) -> ColumnKind
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut sampled = 0usize;
    let mut numeric = 0usize;
    for v in values
        .into_iter()
        .filter(|v| !v.is_missing())
        .take(NUMERIC_SAMPLE_SIZE)
    {
        sampled += 1;
        if v.as_number().is_some() {
            numeric += 1;
        }
    }
    if sampled > 0 && numeric as f64 >= NUMERIC_SAMPLE_RATIO * sampled as f64 {
        ColumnKind::Numeric
    } else {
        ColumnKind::Text
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as [`TabularDataset::headers`].
/// Deserialization runs the same checks as [`TabularDataset::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTabularDataset")]
pub struct TabularDataset {
    /// Ordered, unique column names.
    pub headers: Vec<String>,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawTabularDataset {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTabularDataset> for TabularDataset {
    type Error = EngineError;

    fn try_from(raw: RawTabularDataset) -> EngineResult<Self> {
        Self::new(raw.headers, raw.rows)
    }
}

impl TabularDataset {
    /// Create a dataset, checking header uniqueness and row arity.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> EngineResult<Self> {
        let mut seen = HashSet::with_capacity(headers.len());
        for h in &headers {
            if !seen.insert(h.as_str()) {
                return Err(EngineError::DuplicateHeader { column: h.clone() });
            }
        }
        for (row, values) in rows.iter().enumerate() {
            if values.len() != headers.len() {
                return Err(EngineError::RowShape {
                    row,
                    expected: headers.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    /// Build a dataset from JSON row objects as supplied by the ingestion/UI layer.
    ///
    /// Each record's key set must equal `headers`.
    pub fn from_records(
        headers: Vec<String>,
        records: &[serde_json::Map<String, serde_json::Value>],
    ) -> EngineResult<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if let Some(extra) = record.keys().find(|k| !headers.contains(*k)) {
                return Err(EngineError::MissingField {
                    row,
                    column: extra.clone(),
                });
            }
            let values = headers
                .iter()
                .map(|h| {
                    record.get(h).map(Value::from).ok_or_else(|| EngineError::MissingField {
                        row,
                        column: h.clone(),
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            rows.push(values);
        }
        Self::new(headers, rows)
    }

    /// Convert rows back into JSON objects keyed by header.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.clone(), serde_json::Value::from(v)))
                    .collect()
            })
            .collect()
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`Self::index_of`], but an absent column is an error.
    pub fn require_index(&self, name: &str) -> EngineResult<usize> {
        self.index_of(name).ok_or_else(|| EngineError::UnknownColumn {
            column: name.to_string(),
        })
    }

    /// Resolve a list of column names to de-duplicated indices, preserving first occurrence order.
    pub fn require_indices<S: AsRef<str>>(&self, names: &[S]) -> EngineResult<Vec<usize>> {
        let mut out: Vec<usize> = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.require_index(name.as_ref())?;
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        Ok(out)
    }

    /// Iterate the cells of one column in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Parseable numeric values of one column, in row order.
    pub fn numeric_values(&self, idx: usize) -> Vec<f64> {
        self.column(idx).filter_map(Value::as_number).collect()
    }

    /// Classify one column as numeric or text (see [`classify_values`]).
    pub fn classify_column(&self, idx: usize) -> ColumnKind {
        classify_values(self.column(idx))
    }

    /// Create a dataset with the same headers and the given rows.
    pub fn with_rows(&self, rows: Vec<Vec<Value>>) -> Self {
        Self {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Create a new dataset containing only rows that match `predicate`.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        self.with_rows(rows)
    }
}
