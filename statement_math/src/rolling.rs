//! Trailing rolling-window statistics
//!
//! A rolling statistic over `period` values is undefined until the window
//! has filled, so the batch helpers return `None` for the first
//! `period - 1` positions instead of a partial value.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Trailing mean over a fixed number of observations
#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    /// Create a new rolling mean with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Push a new observation into the window
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }
    }

    /// Current mean, or `None` while the window is still filling
    pub fn value(&self) -> Option<f64> {
        if self.values.len() < self.period {
            return None;
        }

        Some(self.sum / self.period as f64)
    }

    /// Get the window length
    pub fn period(&self) -> usize {
        self.period
    }

    /// Clear the window
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Trailing mean of every position in `values`.
///
/// Position `i` holds the mean of `values[i + 1 - period..=i]`, or `None`
/// when fewer than `period` values precede it (inclusive).
pub fn rolling_mean(values: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    let mut window = RollingMean::new(period)?;

    Ok(values
        .iter()
        .map(|&value| {
            window.update(value);
            window.value()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            RollingMean::new(0),
            Err(MathError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_fills_before_reporting() {
        let mut mean = RollingMean::new(4).unwrap();
        for v in [1.0, 2.0, 3.0] {
            mean.update(v);
            assert!(mean.value().is_none());
        }
        mean.update(4.0);
        assert_approx_eq!(mean.value().unwrap(), 2.5);

        mean.update(10.0);
        assert_approx_eq!(mean.value().unwrap(), 4.75);
    }

    #[test]
    fn test_rolling_mean_batch() {
        let out = rolling_mean(&[2.0, 4.0, 6.0, 8.0, 10.0], 4).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out[..3].iter().all(Option::is_none));
        assert_approx_eq!(out[3].unwrap(), 5.0);
        assert_approx_eq!(out[4].unwrap(), 7.0);
    }

    #[test]
    fn test_reset() {
        let mut mean = RollingMean::new(2).unwrap();
        mean.update(1.0);
        mean.update(3.0);
        assert!(mean.value().is_some());
        mean.reset();
        assert!(mean.value().is_none());
        assert_eq!(mean.period(), 2);
    }
}
