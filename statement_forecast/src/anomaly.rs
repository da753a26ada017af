//! Isolation-based anomaly labelling of reporting periods

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::features::FeatureTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statement_math::isolation::{top_fraction, IsolationForest};
use std::fmt;
use std::str::FromStr;

/// Default share of periods labelled anomalous
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
/// Default ensemble size
pub const DEFAULT_TREES: usize = 100;
/// Default rows drawn per tree
pub const DEFAULT_MAX_SAMPLES: usize = 256;
/// Default ensemble seed
pub const DEFAULT_SEED: u64 = 42;

/// Label of one observed period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyLabel::Anomalous)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::Normal => "normal",
            AnomalyLabel::Anomalous => "anomalous",
        }
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyLabel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" | "0" => Ok(AnomalyLabel::Normal),
            "anomalous" | "anomaly" | "1" => Ok(AnomalyLabel::Anomalous),
            other => Err(PipelineError::MalformedData(format!(
                "Unknown anomaly label: {:?}",
                other
            ))),
        }
    }
}

/// One label per observed period, in period order
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyLabels {
    periods: Vec<NaiveDate>,
    labels: Vec<AnomalyLabel>,
}

impl AnomalyLabels {
    pub fn new(periods: Vec<NaiveDate>, labels: Vec<AnomalyLabel>) -> Result<Self> {
        if periods.len() != labels.len() {
            return Err(PipelineError::LengthMismatch {
                expected: periods.len(),
                actual: labels.len(),
            });
        }
        Ok(Self { periods, labels })
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn labels(&self) -> &[AnomalyLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Periods labelled anomalous
    pub fn anomalous_periods(&self) -> Vec<NaiveDate> {
        self.periods
            .iter()
            .zip(&self.labels)
            .filter(|(_, label)| label.is_anomalous())
            .map(|(period, _)| *period)
            .collect()
    }

    /// (period, label) pairs in order
    pub fn points(&self) -> impl Iterator<Item = (NaiveDate, AnomalyLabel)> + '_ {
        self.periods.iter().copied().zip(self.labels.iter().copied())
    }
}

/// Labels together with the scores they were thresholded from
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    /// Feature columns the ensemble was built over
    pub features: Vec<String>,
    /// Isolation score per period; higher is more anomalous
    pub scores: Vec<f64>,
    pub labels: AnomalyLabels,
}

/// Unsupervised isolation-forest detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    contamination: f64,
    n_trees: usize,
    max_samples: usize,
    seed: u64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set contamination (expected share of anomalous periods), in `(0, 0.5]`
    pub fn contamination(mut self, contamination: f64) -> Result<Self> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(PipelineError::InvalidParameter(format!(
                "Contamination must be in (0, 0.5], got {}",
                contamination
            )));
        }
        self.contamination = contamination;
        Ok(self)
    }

    /// Set number of trees in the ensemble
    pub fn n_trees(mut self, n_trees: usize) -> Result<Self> {
        if n_trees == 0 {
            return Err(PipelineError::InvalidParameter(
                "Number of trees must be greater than zero".to_string(),
            ));
        }
        self.n_trees = n_trees;
        Ok(self)
    }

    /// Set maximum number of rows drawn for each tree
    pub fn max_samples(mut self, max_samples: usize) -> Result<Self> {
        if max_samples < 2 {
            return Err(PipelineError::InvalidParameter(
                "Sample size must be at least 2".to_string(),
            ));
        }
        self.max_samples = max_samples;
        Ok(self)
    }

    /// Set random seed for reproducibility
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Score and label each row of `table` over the named feature columns
    pub fn detect(
        &self,
        ctx: &RunContext,
        table: &FeatureTable,
        features: &[&str],
    ) -> Result<AnomalyReport> {
        if features.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "At least one feature column is required".to_string(),
            ));
        }

        let rows = table.rows(features)?;
        let scores = self.score_rows(&rows)?;
        let flagged = top_fraction(&scores, self.contamination)?;

        let mut labels = vec![AnomalyLabel::Normal; rows.len()];
        for row in &flagged {
            labels[*row] = AnomalyLabel::Anomalous;
        }

        ctx.info(format!(
            "flagged {} of {} periods over [{}] (seed {})",
            flagged.len(),
            rows.len(),
            features.join(", "),
            self.seed
        ));

        Ok(AnomalyReport {
            features: features.iter().map(|f| f.to_string()).collect(),
            scores,
            labels: AnomalyLabels::new(table.periods().to_vec(), labels)?,
        })
    }

    /// Isolation scores of raw feature vectors
    pub fn score_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let forest = IsolationForest::fit(rows, self.n_trees, self.max_samples, self.seed)?;
        Ok(forest.score_all(rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Quarter;
    use crate::data::{FinancialSeries, SeriesId};
    use crate::features::FeatureEngineer;
    use crate::schema::StatementKind;

    const KIND: StatementKind = StatementKind::QuarterlyIncomeStatement;

    fn revenue_table(values: &[f64]) -> FeatureTable {
        let start = Quarter::new(2021, 1).unwrap();
        let periods: Vec<NaiveDate> = (0..values.len())
            .map(|i| start.plus(i as i64).unwrap().end_date())
            .collect();
        let series = FinancialSeries::from_parts(
            SeriesId::new("TEST", KIND, "total_revenue"),
            periods,
            values.to_vec(),
        )
        .unwrap();
        FeatureEngineer::default()
            .base_table("TEST", KIND, &[series])
            .unwrap()
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("normal".parse::<AnomalyLabel>().unwrap(), AnomalyLabel::Normal);
        assert_eq!(
            "Anomalous".parse::<AnomalyLabel>().unwrap(),
            AnomalyLabel::Anomalous
        );
        assert_eq!("0".parse::<AnomalyLabel>().unwrap(), AnomalyLabel::Normal);
        assert_eq!("1".parse::<AnomalyLabel>().unwrap(), AnomalyLabel::Anomalous);
        assert!("maybe".parse::<AnomalyLabel>().is_err());
    }

    #[test]
    fn test_builder_validation() {
        assert!(AnomalyDetector::new().contamination(0.0).is_err());
        assert!(AnomalyDetector::new().contamination(0.7).is_err());
        assert!(AnomalyDetector::new().n_trees(0).is_err());
        assert!(AnomalyDetector::new().max_samples(1).is_err());
    }

    #[test]
    fn test_scores_are_seeded() {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, (i * i) as f64])
            .chain(std::iter::once(vec![100.0, -50.0]))
            .collect();
        let a = AnomalyDetector::new().seed(9).score_rows(&rows).unwrap();
        let b = AnomalyDetector::new().seed(9).score_rows(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_detect_labels_injected_outlier() {
        let mut values: Vec<f64> = (0..12).map(|t| 100.0 + (t % 3) as f64).collect();
        values[7] = 500.0;
        let table = revenue_table(&values);

        let ctx = RunContext::with_log_sink("TEST");
        let report = AnomalyDetector::new()
            .detect(&ctx, &table, &["total_revenue"])
            .unwrap();

        assert_eq!(report.features, vec!["total_revenue".to_string()]);
        assert_eq!(report.scores.len(), 12);
        assert_eq!(report.labels.periods(), table.periods());
        assert_eq!(
            report.labels.anomalous_periods(),
            vec![table.periods()[7]]
        );
    }

    #[test]
    fn test_detect_constant_table_has_no_anomalies() {
        let table = revenue_table(&[120.0; 10]);
        let ctx = RunContext::with_log_sink("TEST");
        let report = AnomalyDetector::new()
            .detect(&ctx, &table, &["total_revenue"])
            .unwrap();

        assert_eq!(report.labels.len(), 10);
        assert!(report.labels.anomalous_periods().is_empty());
    }
}
