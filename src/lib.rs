//! # Statement Insight
//!
//! Workspace facade over the two member crates:
//!
//! - [`math`]: rolling windows, Holt smoothing and the isolation forest
//! - [`forecast`]: the quarterly statement pipeline built on them
//!
//! ## Example
//!
//! ```
//! use statement_insight_workspace::forecast::{evaluate_forecast, Splitter};
//!
//! let splitter = Splitter::default();
//! assert_eq!(splitter.cutoff(10), 8);
//!
//! let metrics = evaluate_forecast(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]).unwrap();
//! assert!((metrics.mae - 1.0 / 3.0).abs() < 1e-12);
//! ```

pub use statement_forecast as forecast;
pub use statement_math as math;

/// Name of the workspace facade
pub fn name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_are_reachable() {
        assert_eq!(name(), "statement_insight_workspace");
        assert_eq!(forecast::NAME, "statement_forecast");
        assert_eq!(math::isolation::average_path_length(1), 0.0);
    }
}
