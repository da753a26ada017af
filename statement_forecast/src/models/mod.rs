//! Forecasting models for financial series

use crate::calendar::following_quarter_ends;
use crate::data::{FinancialSeries, SeriesId};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use std::fmt::Debug;

/// Point forecast of one metric over future quarters
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    /// Series the forecast extends
    id: SeriesId,
    /// Quarter-end dates following the last observed period
    periods: Vec<NaiveDate>,
    /// Forecasted values
    values: Vec<f64>,
}

impl ForecastResult {
    /// Create a forecast whose periods continue past `last_observed`
    pub fn continuing(id: SeriesId, last_observed: NaiveDate, values: Vec<f64>) -> Result<Self> {
        let periods = following_quarter_ends(last_observed, values.len()).ok_or_else(|| {
            PipelineError::InvalidParameter(format!(
                "{} quarters past {} leave the supported calendar",
                values.len(),
                last_observed
            ))
        })?;
        Ok(Self {
            id,
            periods,
            values,
        })
    }

    /// Create a forecast from explicit periods and values
    pub fn new(id: SeriesId, periods: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if periods.len() != values.len() {
            return Err(PipelineError::LengthMismatch {
                expected: periods.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            id,
            periods,
            values,
        })
    }

    pub fn id(&self) -> &SeriesId {
        &self.id
    }

    pub fn metric(&self) -> &str {
        &self.id.metric
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    /// Get the number of periods forecasted
    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    /// (period, value) pairs in order
    pub fn points(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.periods.iter().copied().zip(self.values.iter().copied())
    }

    /// View the forecast as a financial series
    pub fn to_series(&self) -> Result<FinancialSeries> {
        FinancialSeries::from_parts(self.id.clone(), self.periods.clone(), self.values.clone())
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Generate forecast for the next `horizon` quarters
    fn forecast(&self, horizon: usize) -> Result<ForecastResult>;

    /// In-sample one-step-ahead predictions, aligned with the training periods
    fn fitted_values(&self) -> &[f64];

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be fitted to a financial series
pub trait ForecastModel: Debug + Clone {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Fit the model on a training series
    fn fit(&self, series: &FinancialSeries) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

pub mod holt;

pub use holt::{HoltLinearTrend, TrainedHolt};
