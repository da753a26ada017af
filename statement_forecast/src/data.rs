//! Financial series and snapshot loading

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::schema::{Metric, StatementKind};
use crate::utils::{date_parser, normalize_column_name};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// Identity of one series: (ticker, statement type, metric name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesId {
    pub ticker: String,
    pub statement: StatementKind,
    pub metric: String,
}

impl SeriesId {
    pub fn new(ticker: impl Into<String>, statement: StatementKind, metric: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            statement,
            metric: metric.into(),
        }
    }
}

/// Date-indexed values of one metric, strictly increasing by period
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialSeries {
    id: SeriesId,
    periods: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl FinancialSeries {
    /// Create a series from (period, value) pairs already in date order
    pub fn new(id: SeriesId, points: Vec<(NaiveDate, f64)>) -> Result<Self> {
        let (periods, values) = points.into_iter().unzip();
        Self::from_parts(id, periods, values)
    }

    /// Create a series from parallel period and value vectors
    pub fn from_parts(id: SeriesId, periods: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if periods.len() != values.len() {
            return Err(PipelineError::LengthMismatch {
                expected: periods.len(),
                actual: values.len(),
            });
        }
        if let Some(w) = periods.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PipelineError::MalformedData(format!(
                "{}: periods must be strictly increasing, found {} then {}",
                id.metric, w[0], w[1]
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::MalformedData(format!(
                "{}: non-finite value for period {}",
                id.metric, periods[pos]
            )));
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

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.periods.first().copied()
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.periods.last().copied()
    }

    /// (period, value) pairs in order
    pub fn points(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.periods.iter().copied().zip(self.values.iter().copied())
    }

    /// Contiguous sub-series
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            id: self.id.clone(),
            periods: self.periods[range.clone()].to_vec(),
            values: self.values[range].to_vec(),
        }
    }
}

/// All recognised metric columns of one raw snapshot, ordered by date
#[derive(Debug, Clone)]
pub struct StatementSnapshot {
    ticker: String,
    statement: StatementKind,
    periods: Vec<NaiveDate>,
    columns: BTreeMap<Metric, Vec<Option<f64>>>,
}

impl StatementSnapshot {
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn statement(&self) -> StatementKind {
        self.statement
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Metrics present in the snapshot
    pub fn metrics(&self) -> Vec<Metric> {
        self.columns.keys().copied().collect()
    }

    pub fn has(&self, metric: Metric) -> bool {
        self.columns.contains_key(&metric)
    }

    /// Observed values of `metric`; empty cells are left out
    pub fn series(&self, metric: Metric) -> Result<FinancialSeries> {
        let column = self.columns.get(&metric).ok_or_else(|| {
            PipelineError::DataUnavailable(format!(
                "{} has no {} column in {}",
                self.ticker, metric, self.statement
            ))
        })?;

        let points = self
            .periods
            .iter()
            .zip(column)
            .filter_map(|(period, value)| value.map(|v| (*period, v)))
            .collect();

        FinancialSeries::new(
            SeriesId::new(&self.ticker, self.statement, metric.column_name()),
            points,
        )
    }
}

/// Reads raw tabular snapshots into financial series
#[derive(Debug)]
pub struct SeriesLoader;

impl SeriesLoader {
    /// Load a CSV snapshot whose first column is the period-end date
    pub fn from_csv<P: AsRef<Path>>(
        ctx: &RunContext,
        path: P,
        statement: StatementKind,
    ) -> Result<StatementSnapshot> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::DataUnavailable(format!(
                "snapshot {} does not exist",
                path.display()
            )));
        }

        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()
            .map_err(|err| {
                PipelineError::DataUnavailable(format!(
                    "snapshot {} could not be read: {}",
                    path.display(),
                    err
                ))
            })?;

        ctx.debug(format!(
            "read {} rows x {} columns from {}",
            df.height(),
            df.width(),
            path.display()
        ));

        Self::from_dataframe(ctx, &df, statement)
    }

    /// Build a snapshot from an existing DataFrame
    pub fn from_dataframe(
        ctx: &RunContext,
        df: &DataFrame,
        statement: StatementKind,
    ) -> Result<StatementSnapshot> {
        if df.height() == 0 || df.width() < 2 {
            return Err(PipelineError::DataUnavailable(format!(
                "{} snapshot for {} is empty",
                statement,
                ctx.ticker()
            )));
        }

        let columns = df.get_columns();
        let periods = Self::parse_periods(&columns[0])?;

        let schema = statement.schema();
        let mut metrics: BTreeMap<Metric, Vec<Option<f64>>> = BTreeMap::new();
        for column in &columns[1..] {
            let name = normalize_column_name(column.name());
            let metric = match Metric::from_column(&name).filter(|m| schema.admits(*m)) {
                Some(metric) => metric,
                None => {
                    ctx.debug(format!("ignoring column {:?}", column.name()));
                    continue;
                }
            };

            let values = Self::parse_values(column)?;
            if values.iter().all(Option::is_none) {
                ctx.warn(format!("column {} has no values", metric));
                continue;
            }
            metrics.insert(metric, values);
        }

        for required in schema.required {
            if !metrics.contains_key(required) {
                return Err(PipelineError::DataUnavailable(format!(
                    "{} snapshot for {} lacks required metric {}",
                    statement,
                    ctx.ticker(),
                    required
                )));
            }
        }

        // Snapshots often list the newest period first.
        let mut order: Vec<usize> = (0..periods.len()).collect();
        order.sort_by_key(|&i| periods[i]);
        if let Some(w) = order.windows(2).find(|w| periods[w[0]] == periods[w[1]]) {
            return Err(PipelineError::MalformedData(format!(
                "duplicate period {} in {} snapshot",
                periods[w[0]], statement
            )));
        }

        let sorted_periods = order.iter().map(|&i| periods[i]).collect();
        let sorted_columns = metrics
            .into_iter()
            .map(|(metric, values)| (metric, order.iter().map(|&i| values[i]).collect()))
            .collect();

        Ok(StatementSnapshot {
            ticker: ctx.ticker().to_string(),
            statement,
            periods: sorted_periods,
            columns: sorted_columns,
        })
    }

    /// Load the series of each requested metric
    pub fn load<P: AsRef<Path>>(
        ctx: &RunContext,
        path: P,
        statement: StatementKind,
        metrics: &[Metric],
    ) -> Result<Vec<FinancialSeries>> {
        let snapshot = Self::from_csv(ctx, path, statement)?;
        metrics.iter().map(|m| snapshot.series(*m)).collect()
    }

    fn parse_periods(column: &Series) -> Result<Vec<NaiveDate>> {
        let as_text = column.cast(&DataType::Utf8)?;
        as_text
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, raw)| match raw {
                Some(raw) => date_parser::parse_date(raw),
                None => Err(PipelineError::MalformedData(format!(
                    "row {} has no period date",
                    row
                ))),
            })
            .collect()
    }

    fn parse_values(column: &Series) -> Result<Vec<Option<f64>>> {
        let as_float = column.cast(&DataType::Float64)?;
        Ok(as_float
            .f64()?
            .into_iter()
            .map(|v| v.filter(|v| v.is_finite()))
            .collect())
    }
}
