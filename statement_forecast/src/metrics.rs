//! Metrics for evaluating forecasts and anomaly labels

use crate::anomaly::{AnomalyLabel, AnomalyLabels};
use crate::data::FinancialSeries;
use crate::error::{PipelineError, Result};
use crate::models::ForecastResult;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Forecast error against held-out actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        Ok(())
    }
}

/// Anomaly labelling quality against ground truth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl fmt::Display for AnomalyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Anomaly Metrics:")?;
        writeln!(f, "  Precision: {:.4}", self.precision)?;
        writeln!(f, "  Recall:    {:.4}", self.recall)?;
        writeln!(f, "  F1:        {:.4}", self.f1)?;
        Ok(())
    }
}

/// Which evaluation produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Forecast,
    Anomaly,
}

impl EvaluationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationKind::Forecast => "forecast",
            EvaluationKind::Anomaly => "anomaly",
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one evaluation record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationKey {
    pub ticker: String,
    pub metric: String,
    pub kind: EvaluationKind,
}

/// Result of either evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EvaluationMetrics {
    Forecast(ForecastMetrics),
    Anomaly(AnomalyMetrics),
}

impl EvaluationMetrics {
    pub fn kind(&self) -> EvaluationKind {
        match self {
            EvaluationMetrics::Forecast(_) => EvaluationKind::Forecast,
            EvaluationMetrics::Anomaly(_) => EvaluationKind::Anomaly,
        }
    }
}

impl From<ForecastMetrics> for EvaluationMetrics {
    fn from(metrics: ForecastMetrics) -> Self {
        EvaluationMetrics::Forecast(metrics)
    }
}

impl From<AnomalyMetrics> for EvaluationMetrics {
    fn from(metrics: AnomalyMetrics) -> Self {
        EvaluationMetrics::Anomaly(metrics)
    }
}

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::LengthMismatch { expected, actual });
    }
    if expected == 0 {
        return Err(PipelineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    Ok(())
}

/// MAE and RMSE of `forecast` against `actual`, position by position
pub fn evaluate_forecast(actual: &[f64], forecast: &[f64]) -> Result<ForecastMetrics> {
    check_lengths(actual.len(), forecast.len())?;

    let errors: Vec<f64> = actual.iter().zip(forecast).map(|(a, f)| a - f).collect();
    let mae = errors.iter().map(|e| e.abs()).mean();
    let mse = errors.iter().map(|e| e * e).mean();

    Ok(ForecastMetrics {
        mae,
        rmse: mse.sqrt(),
    })
}

/// Evaluate a forecast against the actual series covering the same periods
pub fn evaluate_forecast_series(
    actual: &FinancialSeries,
    forecast: &ForecastResult,
) -> Result<ForecastMetrics> {
    check_lengths(actual.len(), forecast.horizon())?;
    if let Some((a, f)) = actual
        .periods()
        .iter()
        .zip(forecast.periods())
        .find(|(a, f)| a != f)
    {
        return Err(PipelineError::MalformedData(format!(
            "forecast period {} does not line up with actual period {}",
            f, a
        )));
    }
    evaluate_forecast(actual.values(), forecast.values())
}

/// Precision, recall and F1 of `predicted` with anomalous as the positive class.
///
/// A ratio whose denominator is zero is reported as 0.
pub fn evaluate_anomalies(
    true_labels: &[AnomalyLabel],
    predicted_labels: &[AnomalyLabel],
) -> Result<AnomalyMetrics> {
    check_lengths(true_labels.len(), predicted_labels.len())?;

    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (truth, predicted) in true_labels.iter().zip(predicted_labels) {
        match (truth.is_anomalous(), predicted.is_anomalous()) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let share = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = share(tp, tp + fp);
    let recall = share(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    Ok(AnomalyMetrics {
        precision,
        recall,
        f1,
    })
}

/// Evaluate labels aligned by period
pub fn evaluate_anomaly_labels(
    truth: &AnomalyLabels,
    predicted: &AnomalyLabels,
) -> Result<AnomalyMetrics> {
    check_lengths(truth.len(), predicted.len())?;
    if truth.periods() != predicted.periods() {
        return Err(PipelineError::MalformedData(
            "ground-truth and predicted labels cover different periods".to_string(),
        ));
    }
    evaluate_anomalies(truth.labels(), predicted.labels())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use AnomalyLabel::{Anomalous, Normal};

    #[test]
    fn test_forecast_metrics() {
        let metrics = evaluate_forecast(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]).unwrap();
        assert_approx_eq!(metrics.mae, 1.0 / 3.0);
        assert_approx_eq!(metrics.rmse, (1.0f64 / 3.0).sqrt());
    }

    #[test]
    fn test_forecast_length_mismatch() {
        let err = evaluate_forecast(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(evaluate_forecast(&[], &[]).is_err());
    }

    #[test]
    fn test_anomaly_metrics() {
        let truth = [Normal, Anomalous, Normal, Anomalous];
        let predicted = [Normal, Anomalous, Anomalous, Anomalous];
        let metrics = evaluate_anomalies(&truth, &predicted).unwrap();
        assert_approx_eq!(metrics.precision, 2.0 / 3.0);
        assert_approx_eq!(metrics.recall, 1.0);
        assert_approx_eq!(metrics.f1, 0.8);
    }

    #[test]
    fn test_all_true_negatives() {
        let labels = [Normal; 5];
        let metrics = evaluate_anomalies(&labels, &labels).unwrap();
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
    }

    #[test]
    fn test_anomaly_length_mismatch() {
        assert!(matches!(
            evaluate_anomalies(&[Normal], &[Normal, Anomalous]),
            Err(PipelineError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_evaluation_kind() {
        let metrics: EvaluationMetrics = ForecastMetrics { mae: 1.0, rmse: 1.0 }.into();
        assert_eq!(metrics.kind(), EvaluationKind::Forecast);
        assert_eq!(EvaluationKind::Anomaly.to_string(), "anomaly");
    }
}
