//! Append-only persistence of evaluation results
//!
//! Each (ticker, evaluation kind) pair has its own CSV file,
//! `{ticker}_{kind}_metrics.csv`, indexed by the evaluated metric name.
//! Saving never rewrites earlier rows: a repeated run for the same ticker and
//! metric adds another row, and readers pick the history or the latest entry.

use crate::error::Result;
use crate::metrics::{AnomalyMetrics, EvaluationKind, EvaluationMetrics, ForecastMetrics};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct ForecastRecord {
    metric: String,
    mae: f64,
    rmse: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnomalyRecord {
    metric: String,
    precision: f64,
    recall: f64,
    f1: f64,
}

/// CSV-backed evaluation log
#[derive(Debug, Clone)]
pub struct MetricsStore {
    dir: PathBuf,
}

impl MetricsStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `kind` results for `ticker`
    pub fn path_for(&self, ticker: &str, kind: EvaluationKind) -> PathBuf {
        self.dir.join(format!("{}_{}_metrics.csv", ticker, kind))
    }

    /// Append one record. A header is written only when the file is new.
    ///
    /// Not safe under concurrent writers to the same file.
    pub fn save(&self, ticker: &str, metric_name: &str, metrics: &EvaluationMetrics) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(ticker, metrics.kind());
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);

        match metrics {
            EvaluationMetrics::Forecast(m) => writer.serialize(ForecastRecord {
                metric: metric_name.to_string(),
                mae: m.mae,
                rmse: m.rmse,
            })?,
            EvaluationMetrics::Anomaly(m) => writer.serialize(AnomalyRecord {
                metric: metric_name.to_string(),
                precision: m.precision,
                recall: m.recall,
                f1: m.f1,
            })?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Every record saved for (ticker, metric, kind), oldest first
    pub fn history(
        &self,
        ticker: &str,
        metric_name: &str,
        kind: EvaluationKind,
    ) -> Result<Vec<EvaluationMetrics>> {
        let path = self.path_for(ticker, kind);
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let records = match kind {
            EvaluationKind::Forecast => reader
                .deserialize::<ForecastRecord>()
                .filter(|r| r.as_ref().map_or(true, |r| r.metric == metric_name))
                .map(|r| {
                    r.map(|r| {
                        EvaluationMetrics::Forecast(ForecastMetrics {
                            mae: r.mae,
                            rmse: r.rmse,
                        })
                    })
                })
                .collect::<std::result::Result<Vec<_>, csv::Error>>()?,
            EvaluationKind::Anomaly => reader
                .deserialize::<AnomalyRecord>()
                .filter(|r| r.as_ref().map_or(true, |r| r.metric == metric_name))
                .map(|r| {
                    r.map(|r| {
                        EvaluationMetrics::Anomaly(AnomalyMetrics {
                            precision: r.precision,
                            recall: r.recall,
                            f1: r.f1,
                        })
                    })
                })
                .collect::<std::result::Result<Vec<_>, csv::Error>>()?,
        };
        Ok(records)
    }

    /// Most recently appended record for (ticker, metric, kind)
    pub fn latest(
        &self,
        ticker: &str,
        metric_name: &str,
        kind: EvaluationKind,
    ) -> Result<Option<EvaluationMetrics>> {
        Ok(self.history(ticker, metric_name, kind)?.pop())
    }
}
