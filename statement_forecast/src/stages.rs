//! File-based handoff between pipeline stages
//!
//! Every stage file lives at
//! `{root}/{stage}/{ticker}_{data_type}[.suffix].csv`. Outputs that a later
//! step may legitimately find absent (a forecast, ground-truth labels) are read
//! as `Ok(None)` instead of an error.

use crate::anomaly::{AnomalyLabel, AnomalyLabels};
use crate::data::SeriesId;
use crate::error::{PipelineError, Result};
use crate::features::FeatureTable;
use crate::models::ForecastResult;
use crate::schema::StatementKind;
use crate::utils::date_parser::{format_date, parse_date};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Stage directory under the data root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageDir {
    Raw,
    Transformed,
    Loaded,
    Outputs,
    Visualizations,
}

impl StageDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageDir::Raw => "raw",
            StageDir::Transformed => "transformed",
            StageDir::Loaded => "loaded",
            StageDir::Outputs => "outputs",
            StageDir::Visualizations => "visualizations",
        }
    }
}

impl fmt::Display for StageDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ForecastRow {
    date: String,
    value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelRow {
    date: String,
    label: String,
}

/// Resolves and reads/writes stage files under one data root
#[derive(Debug, Clone)]
pub struct StageLayout {
    root: PathBuf,
}

impl StageLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, stage: StageDir) -> PathBuf {
        self.root.join(stage.as_str())
    }

    /// `{root}/{stage}/{ticker}_{data_type}[.suffix].csv`
    pub fn path(&self, stage: StageDir, ticker: &str, data_type: &str, suffix: Option<&str>) -> PathBuf {
        let file = match suffix {
            Some(suffix) => format!("{}_{}.{}.csv", ticker, data_type, suffix),
            None => format!("{}_{}.csv", ticker, data_type),
        };
        self.dir(stage).join(file)
    }

    /// Snapshot the loader reads for a statement
    pub fn snapshot_path(&self, ticker: &str, statement: StatementKind) -> PathBuf {
        self.path(StageDir::Loaded, ticker, statement.data_type(), None)
    }

    pub fn forecast_path(&self, ticker: &str, metric: &str) -> PathBuf {
        self.path(StageDir::Outputs, ticker, metric, Some("forecast"))
    }

    pub fn anomalies_path(&self, ticker: &str, statement: StatementKind) -> PathBuf {
        self.path(StageDir::Outputs, ticker, statement.data_type(), Some("anomalies"))
    }

    pub fn features_path(&self, ticker: &str, statement: StatementKind) -> PathBuf {
        self.path(StageDir::Transformed, ticker, statement.data_type(), Some("features"))
    }

    pub fn labels_path(&self, ticker: &str, statement: StatementKind) -> PathBuf {
        self.path(StageDir::Raw, ticker, statement.data_type(), Some("labels"))
    }

    /// Write a forecast as `date,value` rows
    pub fn write_forecast(&self, forecast: &ForecastResult) -> Result<PathBuf> {
        let path = self.forecast_path(&forecast.id().ticker, forecast.metric());
        let mut writer = create_writer(&path)?;
        for (date, value) in forecast.points() {
            writer.serialize(ForecastRow {
                date: format_date(date),
                value,
            })?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Read a forecast written by [`StageLayout::write_forecast`], if present
    pub fn read_forecast(&self, id: &SeriesId) -> Result<Option<ForecastResult>> {
        let path = self.forecast_path(&id.ticker, &id.metric);
        if !path.is_file() {
            return Ok(None);
        }

        let mut periods = Vec::new();
        let mut values = Vec::new();
        for row in csv::Reader::from_path(&path)?.deserialize::<ForecastRow>() {
            let row = row?;
            periods.push(parse_date(&row.date)?);
            values.push(row.value);
        }
        ForecastResult::new(id.clone(), periods, values).map(Some)
    }

    /// Write predicted labels as `date,label` rows
    pub fn write_labels(
        &self,
        ticker: &str,
        statement: StatementKind,
        labels: &AnomalyLabels,
    ) -> Result<PathBuf> {
        let path = self.anomalies_path(ticker, statement);
        write_label_rows(&path, labels)?;
        Ok(path)
    }

    /// Ground-truth labels for a statement, if any were provided
    pub fn read_labels(&self, ticker: &str, statement: StatementKind) -> Result<Option<AnomalyLabels>> {
        let path = self.labels_path(ticker, statement);
        if !path.is_file() {
            return Ok(None);
        }
        read_label_rows(&path).map(Some)
    }

    /// Write a feature table with a leading `date` column
    pub fn write_features(&self, table: &FeatureTable) -> Result<PathBuf> {
        let path = self.features_path(table.ticker(), table.statement());
        let names: Vec<&str> = table.column_names().collect();
        let rows = table.rows(&names)?;

        let mut writer = create_writer(&path)?;
        writer.write_record(std::iter::once("date").chain(names.iter().copied()))?;
        for (period, row) in table.periods().iter().zip(&rows) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(format_date(*period));
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(path)
    }
}

fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(csv::Writer::from_path(path)?)
}

fn write_label_rows(path: &Path, labels: &AnomalyLabels) -> Result<()> {
    let mut writer = create_writer(path)?;
    for (date, label) in labels.points() {
        writer.serialize(LabelRow {
            date: format_date(date),
            label: label.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn read_label_rows(path: &Path) -> Result<AnomalyLabels> {
    let mut periods = Vec::new();
    let mut labels = Vec::new();
    for row in csv::Reader::from_path(path)?.deserialize::<LabelRow>() {
        let row = row?;
        periods.push(parse_date(&row.date)?);
        labels.push(row.label.parse::<AnomalyLabel>()?);
    }
    if let Some(w) = periods.windows(2).find(|w| w[0] >= w[1]) {
        return Err(PipelineError::MalformedData(format!(
            "{}: label dates must be strictly increasing, found {} then {}",
            path.display(),
            w[0],
            w[1]
        )));
    }
    AnomalyLabels::new(periods, labels)
}
