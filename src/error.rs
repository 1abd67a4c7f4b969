use thiserror::Error;

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type returned by cleaning and estimation functions.
///
/// This is a single error enum shared by every stage, so callers can propagate failures from
/// imputation, outlier treatment, validation and estimation with `?`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration or call referenced a column that is not in the dataset headers.
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    /// Dataset headers must be unique.
    #[error("duplicate header '{column}'")]
    DuplicateHeader { column: String },

    /// A row does not have one value per header.
    #[error("row {row} has {actual} values, expected {expected}")]
    RowShape {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A record is missing a header key (or carries a key that is not a header).
    #[error("row {row} does not match headers at column '{column}'")]
    MissingField { row: usize, column: String },

    /// A statistic was required from a column with no usable values.
    #[error("column '{column}' has no usable values")]
    EmptyColumn { column: String },

    /// The weights of an estimation target sum to zero.
    #[error("weights for column '{column}' sum to zero")]
    ZeroTotalWeight { column: String },

    /// A configuration value is outside its accepted domain.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration JSON could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker pool for parallel execution could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl EngineError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
