//! Error types for the statement_forecast crate

use crate::context::Stage;
use polars::prelude::PolarsError;
use statement_math::MathError;
use std::fmt;
use thiserror::Error;

/// Where in a run an error surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Ticker being processed
    pub ticker: String,
    /// Pipeline stage
    pub stage: Stage,
    /// Metric being processed, if the failure is metric-specific
    pub metric: Option<String>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.ticker, self.stage)?;
        if let Some(metric) = &self.metric {
            write!(f, " / {}", metric)?;
        }
        write!(f, "]")
    }
}

/// Custom error types for the statement_forecast crate
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input file or table missing or empty
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Too few observations to normalize or derive features
    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    /// Too few observations to split or fit
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Two sequences that must be aligned are not
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Model fit could not find stable parameters
    #[error("Convergence error: {0}")]
    ConvergenceError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input present but structurally wrong
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Any of the above, tagged with the run position it happened at
    #[error("{context}: {source}")]
    InStage {
        context: ErrorContext,
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// The underlying condition with any stage context removed
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::InStage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Innermost context attached to this error, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            PipelineError::InStage { context, source } => source.context().or(Some(context)),
            _ => None,
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PolarsError> for PipelineError {
    fn from(err: PolarsError) -> Self {
        PipelineError::PolarsError(err.to_string())
    }
}

impl From<MathError> for PipelineError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::InsufficientData { required, actual } => {
                PipelineError::InsufficientData { required, actual }
            }
            MathError::InvalidInput(msg) => PipelineError::InvalidParameter(msg),
            MathError::CalculationError(msg) => PipelineError::ConvergenceError(msg),
        }
    }
}
