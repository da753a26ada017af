//! Holt linear-trend exponential smoothing
//!
//! The recurrences are
//!
//! ```text
//! l_t = alpha * y_t + (1 - alpha) * (l_{t-1} + b_{t-1})
//! b_t = beta  * (l_t - l_{t-1}) + (1 - beta) * b_{t-1}
//! ```
//!
//! initialised with `l_0 = y_0` and `b_0 = y_1 - y_0`. Smoothing parameters
//! are selected by a coarse-then-fine grid search over the in-sample
//! one-step-ahead squared error.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Smallest number of observations Holt's method can be initialised from
pub const MIN_OBSERVATIONS: usize = 2;

/// Smoothing parameters used when the error surface is flat
pub const FALLBACK_PARAMETER: f64 = 0.5;

const COARSE_STEP: f64 = 0.05;
const FINE_STEP: f64 = 0.01;
const PARAMETER_FLOOR: f64 = 0.01;
const PARAMETER_CEILING: f64 = 0.99;

/// Running level and trend of a Holt model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoltState {
    /// Current level `l_t`
    pub level: f64,
    /// Current trend `b_t`
    pub trend: f64,
}

impl HoltState {
    /// Initialise from the first two observations
    pub fn initialize(values: &[f64]) -> Result<Self> {
        if values.len() < MIN_OBSERVATIONS {
            return Err(MathError::InsufficientData {
                required: MIN_OBSERVATIONS,
                actual: values.len(),
            });
        }

        Ok(Self {
            level: values[0],
            trend: values[1] - values[0],
        })
    }

    /// One-step-ahead prediction from the current state
    pub fn one_step(&self) -> f64 {
        self.level + self.trend
    }

    /// Apply one observation to the state
    pub fn update(&mut self, value: f64, alpha: f64, beta: f64) {
        let prev_level = self.level;
        self.level = alpha * value + (1.0 - alpha) * (self.level + self.trend);
        self.trend = beta * (self.level - prev_level) + (1.0 - beta) * self.trend;
    }

    /// Point forecast `h` periods past the last observation
    pub fn forecast(&self, h: usize) -> f64 {
        self.level + h as f64 * self.trend
    }
}

/// Outcome of running the recurrences over a whole series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoltFit {
    /// Level smoothing parameter
    pub alpha: f64,
    /// Trend smoothing parameter
    pub beta: f64,
    /// State after the last observation
    pub state: HoltState,
    /// Sum of squared one-step-ahead errors
    pub sse: f64,
    /// Whether the flat-error-surface fallback was used
    pub degenerate: bool,
}

fn check_parameter(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "{} must be between 0 and 1 (exclusive), got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_finite(values: &[f64]) -> Result<()> {
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(format!(
            "Non-finite observation at position {}",
            pos
        )));
    }
    Ok(())
}

/// Walk the recurrences over `values`, handing each one-step prediction and
/// the observation it predicts to `on_step`.
fn run_filter(
    values: &[f64],
    alpha: f64,
    beta: f64,
    mut on_step: impl FnMut(f64, f64),
) -> Result<HoltState> {
    check_parameter("alpha", alpha)?;
    check_parameter("beta", beta)?;
    check_finite(values)?;

    let mut state = HoltState::initialize(values)?;
    for &value in &values[1..] {
        on_step(state.one_step(), value);
        state.update(value, alpha, beta);
    }
    Ok(state)
}

/// Run the recurrences with fixed parameters.
pub fn holt_filter(values: &[f64], alpha: f64, beta: f64) -> Result<HoltFit> {
    let mut sse = 0.0;
    let state = run_filter(values, alpha, beta, |predicted, actual| {
        sse += (actual - predicted).powi(2);
    })?;

    Ok(HoltFit {
        alpha,
        beta,
        state,
        sse,
        degenerate: false,
    })
}

/// In-sample one-step-ahead predictions, one per observation.
///
/// The first observation has no prediction and is repeated.
pub fn one_step_predictions(values: &[f64], alpha: f64, beta: f64) -> Result<Vec<f64>> {
    let mut predictions = Vec::with_capacity(values.len());
    predictions.extend(values.first().copied());
    run_filter(values, alpha, beta, |predicted, _| predictions.push(predicted))?;
    Ok(predictions)
}

fn grid(lower: f64, upper: f64, step: f64) -> Vec<f64> {
    let count = ((upper - lower) / step).round() as usize;
    (0..=count)
        .map(|i| lower + i as f64 * step)
        .filter(|p| *p >= PARAMETER_FLOOR - 1e-12 && *p <= PARAMETER_CEILING + 1e-12)
        .collect()
}

fn search(
    values: &[f64],
    alphas: &[f64],
    betas: &[f64],
    best: &mut Option<HoltFit>,
    worst_sse: &mut f64,
) -> Result<()> {
    for &alpha in alphas {
        for &beta in betas {
            let fit = holt_filter(values, alpha, beta)?;
            if !fit.sse.is_finite() {
                continue;
            }
            *worst_sse = worst_sse.max(fit.sse);
            if best.map_or(true, |b| fit.sse < b.sse) {
                *best = Some(fit);
            }
        }
    }
    Ok(())
}

/// Choose `(alpha, beta)` by minimising in-sample squared one-step error.
///
/// When every candidate pair yields the same error (a constant or perfectly
/// linear series) there is no unique optimum and the fit falls back to
/// `alpha = beta = 0.5`.
pub fn optimize_holt(values: &[f64]) -> Result<HoltFit> {
    if values.len() < MIN_OBSERVATIONS {
        return Err(MathError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: values.len(),
        });
    }
    check_finite(values)?;

    let coarse = grid(COARSE_STEP, 1.0 - COARSE_STEP, COARSE_STEP);
    let mut best: Option<HoltFit> = None;
    let mut worst_sse = f64::NEG_INFINITY;
    search(values, &coarse, &coarse, &mut best, &mut worst_sse)?;

    let coarse_best = best.ok_or_else(|| {
        MathError::CalculationError("No smoothing parameters gave a finite error".to_string())
    })?;

    let tolerance = 1e-9 * (1.0 + worst_sse.abs());
    if worst_sse - coarse_best.sse <= tolerance {
        let mut fit = holt_filter(values, FALLBACK_PARAMETER, FALLBACK_PARAMETER)?;
        fit.degenerate = true;
        return Ok(fit);
    }

    let fine_alphas = grid(
        (coarse_best.alpha - COARSE_STEP).max(PARAMETER_FLOOR),
        (coarse_best.alpha + COARSE_STEP).min(PARAMETER_CEILING),
        FINE_STEP,
    );
    let fine_betas = grid(
        (coarse_best.beta - COARSE_STEP).max(PARAMETER_FLOOR),
        (coarse_best.beta + COARSE_STEP).min(PARAMETER_CEILING),
        FINE_STEP,
    );
    search(values, &fine_alphas, &fine_betas, &mut best, &mut worst_sse)?;

    best.ok_or_else(|| {
        MathError::CalculationError("No smoothing parameters gave a finite error".to_string())
    })
}
