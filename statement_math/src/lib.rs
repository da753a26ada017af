//! # Statement Math
//!
//! Numerical building blocks for the statement forecasting pipeline.
//! This crate keeps the arithmetic free of any I/O or calendar concerns:
//! trailing rolling windows, Holt level/trend smoothing, and isolation-tree
//! anomaly scoring.

use thiserror::Error;

pub mod isolation;
pub mod rolling;
pub mod smoothing;

/// Errors that can occur in the numerical routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: need at least {required} values, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numerical operations
pub type Result<T> = std::result::Result<T, MathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_counts() {
        let err = MathError::InsufficientData {
            required: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data for calculation: need at least 2 values, got 1"
        );
    }
}
