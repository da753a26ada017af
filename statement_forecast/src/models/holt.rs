//! Holt linear-trend model over quarterly series

use crate::data::{FinancialSeries, SeriesId};
use crate::error::{PipelineError, Result};
use crate::models::{ForecastModel, ForecastResult, TrainedForecastModel};
use chrono::NaiveDate;
use statement_math::smoothing::{
    holt_filter, one_step_predictions, optimize_holt, HoltFit, MIN_OBSERVATIONS,
};

/// How the smoothing parameters are chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingParams {
    /// Minimise in-sample squared one-step error
    Optimized,
    /// Use the given `(alpha, beta)`
    Fixed { alpha: f64, beta: f64 },
}

/// Holt's level + trend exponential smoothing
#[derive(Debug, Clone)]
pub struct HoltLinearTrend {
    /// Name of the model
    name: String,
    params: SmoothingParams,
}

/// Fitted Holt model
#[derive(Debug, Clone)]
pub struct TrainedHolt {
    /// Name of the model
    name: String,
    id: SeriesId,
    last_period: NaiveDate,
    fit: HoltFit,
    fitted: Vec<f64>,
}

impl Default for HoltLinearTrend {
    fn default() -> Self {
        Self::optimized()
    }
}

impl HoltLinearTrend {
    /// Parameters chosen by optimisation at fit time
    pub fn optimized() -> Self {
        Self {
            name: "Holt Linear Trend (optimized)".to_string(),
            params: SmoothingParams::Optimized,
        }
    }

    /// Fixed smoothing parameters, both in `(0, 1)`
    pub fn with_params(alpha: f64, beta: f64) -> Result<Self> {
        for (label, value) in [("Alpha", alpha), ("Beta", beta)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PipelineError::InvalidParameter(format!(
                    "{} must be between 0 and 1",
                    label
                )));
            }
        }

        Ok(Self {
            name: format!("Holt Linear Trend (alpha={}, beta={})", alpha, beta),
            params: SmoothingParams::Fixed { alpha, beta },
        })
    }

    pub fn params(&self) -> SmoothingParams {
        self.params
    }
}

impl ForecastModel for HoltLinearTrend {
    type Trained = TrainedHolt;

    fn fit(&self, series: &FinancialSeries) -> Result<Self::Trained> {
        let values = series.values();
        let last_period = match series.last_period() {
            Some(period) if values.len() >= MIN_OBSERVATIONS => period,
            _ => {
                return Err(PipelineError::InsufficientData {
                    required: MIN_OBSERVATIONS,
                    actual: values.len(),
                })
            }
        };

        let fit = match self.params {
            SmoothingParams::Optimized => optimize_holt(values),
            SmoothingParams::Fixed { alpha, beta } => holt_filter(values, alpha, beta),
        }?;

        if !(fit.state.level.is_finite() && fit.state.trend.is_finite()) {
            return Err(PipelineError::ConvergenceError(format!(
                "{}: smoothing diverged (alpha={}, beta={})",
                series.metric(),
                fit.alpha,
                fit.beta
            )));
        }

        Ok(TrainedHolt {
            name: self.name.clone(),
            id: series.id().clone(),
            last_period,
            fitted: one_step_predictions(values, fit.alpha, fit.beta)?,
            fit,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TrainedHolt {
    pub fn alpha(&self) -> f64 {
        self.fit.alpha
    }

    pub fn beta(&self) -> f64 {
        self.fit.beta
    }

    pub fn level(&self) -> f64 {
        self.fit.state.level
    }

    pub fn trend(&self) -> f64 {
        self.fit.state.trend
    }

    /// In-sample sum of squared one-step errors
    pub fn sse(&self) -> f64 {
        self.fit.sse
    }

    /// Whether the flat-error fallback `alpha = beta = 0.5` was used
    pub fn is_degenerate(&self) -> bool {
        self.fit.degenerate
    }

    pub fn last_period(&self) -> NaiveDate {
        self.last_period
    }
}

impl TrainedForecastModel for TrainedHolt {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        if horizon == 0 {
            return Err(PipelineError::InvalidParameter(
                "Forecast horizon must be at least 1".to_string(),
            ));
        }

        let values = (1..=horizon).map(|h| self.fit.state.forecast(h)).collect();
        ForecastResult::continuing(self.id.clone(), self.last_period, values)
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn name(&self) -> &str {
        &self.name
    }
}
