//! Frequency normalization and derived financial features
//!
//! A [`FeatureTable`] is built in two steps. First every base series is
//! re-indexed onto the quarterly calendar, filling missing quarters by
//! carrying the last known value forward. Then ratio, growth and rolling
//! columns are derived; any row where one of them is undefined (not enough
//! history, or a zero denominator) is dropped as a whole.
//!
//! Dropping rows can open holes in the quarterly calendar, so forecasting
//! works on the gap-free base table from the first step and only anomaly
//! scoring uses the derived one. [`FeatureEngineer::build_tables`] returns
//! both.

use crate::calendar::Quarter;
use crate::context::RunContext;
use crate::data::{FinancialSeries, SeriesId};
use crate::error::{PipelineError, Result};
use crate::schema::{Metric, StatementKind};
use chrono::NaiveDate;
use statement_math::rolling::rolling_mean;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Default trailing window for rolling statistics
pub const DEFAULT_ROLLING_WINDOW: usize = 4;

pub const REVENUE_GROWTH: &str = "revenue_growth";
pub const EXPENSE_RATIO: &str = "expense_ratio";
pub const NET_INCOME_MARGIN: &str = "net_income_margin";
pub const CURRENT_RATIO: &str = "current_ratio";
pub const DEBT_TO_EQUITY: &str = "debt_to_equity";

/// Name of the rolling-mean column for `metric`
pub fn rolling_mean_column(metric: Metric, window: usize) -> String {
    format!("{}_rolling_mean_{}", metric.column_name(), window)
}

/// Quarterly, gap-free table of base metrics plus derived columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    ticker: String,
    statement: StatementKind,
    periods: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
    base: BTreeSet<Metric>,
}

impl FeatureTable {
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn statement(&self) -> StatementKind {
        self.statement
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Whether the base metric was present when the table was built
    pub fn has(&self, metric: Metric) -> bool {
        self.base.contains(&metric)
    }

    /// Base metrics in schema order
    pub fn base_metrics(&self) -> Vec<Metric> {
        self.base.iter().copied().collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    /// One column as a financial series
    pub fn series(&self, name: &str) -> Result<FinancialSeries> {
        let values = self.column(name).ok_or_else(|| {
            PipelineError::DataUnavailable(format!("feature table has no column {}", name))
        })?;
        FinancialSeries::from_parts(
            SeriesId::new(&self.ticker, self.statement, name),
            self.periods.clone(),
            values.to_vec(),
        )
    }

    /// Row-major feature vectors over the named columns
    pub fn rows(&self, names: &[&str]) -> Result<Vec<Vec<f64>>> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    PipelineError::DataUnavailable(format!(
                        "feature table has no column {}",
                        name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.len())
            .map(|row| columns.iter().map(|column| column[row]).collect())
            .collect())
    }

    /// Contiguous block of rows
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            ticker: self.ticker.clone(),
            statement: self.statement,
            periods: self.periods[range.clone()].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), values[range.clone()].to_vec()))
                .collect(),
            base: self.base.clone(),
        }
    }
}

/// Builds feature tables from loaded series
/// Output of [`FeatureEngineer::build_tables`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTables {
    /// Base metrics on every quarter of the normalized range
    pub base: FeatureTable,
    /// Base plus derived columns, incomplete rows dropped
    pub derived: FeatureTable,
}

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    rolling_window: usize,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self {
            rolling_window: DEFAULT_ROLLING_WINDOW,
        }
    }
}

/// `num / den`, or `None` when the denominator is zero
fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    Some(num / den).filter(|r| r.is_finite())
}

impl FeatureEngineer {
    pub fn new(rolling_window: usize) -> Result<Self> {
        if rolling_window == 0 {
            return Err(PipelineError::InvalidParameter(
                "Rolling window must be greater than zero".to_string(),
            ));
        }
        Ok(Self { rolling_window })
    }

    pub fn rolling_window(&self) -> usize {
        self.rolling_window
    }

    /// Re-index onto consecutive quarter ends, carrying values forward.
    ///
    /// Two observations inside one quarter keep the later one. Nothing is
    /// interpolated and nothing is filled before the first observation.
    pub fn normalize_frequency(&self, series: &FinancialSeries) -> Result<FinancialSeries> {
        let mut by_quarter: BTreeMap<Quarter, f64> = BTreeMap::new();
        for (period, value) in series.points() {
            by_quarter.insert(Quarter::from_date(period), value);
        }

        let (first, last) = match (by_quarter.keys().next(), by_quarter.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(PipelineError::InsufficientHistory(format!(
                    "{} has no observations",
                    series.metric()
                )))
            }
        };

        let mut periods = Vec::new();
        let mut values = Vec::new();
        let mut carried = by_quarter[&first];
        // Every quarter between two observed ones exists on the calendar.
        for quarter in (0..=first.distance_to(&last)).filter_map(|i| first.plus(i)) {
            if let Some(value) = by_quarter.get(&quarter) {
                carried = *value;
            }
            periods.push(quarter.end_date());
            values.push(carried);
        }

        FinancialSeries::from_parts(series.id().clone(), periods, values)
    }

    /// Normalize each series and align them on their common quarters.
    ///
    /// Metrics must belong to the statement's schema and every required
    /// metric must be present.
    pub fn base_table(
        &self,
        ticker: &str,
        statement: StatementKind,
        series: &[FinancialSeries],
    ) -> Result<FeatureTable> {
        let schema = statement.schema();
        let mut normalized: BTreeMap<Metric, FinancialSeries> = BTreeMap::new();

        for s in series {
            let metric = Metric::from_column(s.metric())
                .filter(|m| schema.admits(*m))
                .ok_or_else(|| {
                    PipelineError::MalformedData(format!(
                        "{} is not a {} metric",
                        s.metric(),
                        statement
                    ))
                })?;
            normalized.insert(metric, self.normalize_frequency(s)?);
        }

        for required in schema.required {
            if !normalized.contains_key(required) {
                return Err(PipelineError::DataUnavailable(format!(
                    "{} requires {}",
                    statement, required
                )));
            }
        }

        let start = normalized
            .values()
            .filter_map(|s| s.first_period().map(Quarter::from_date))
            .max();
        let end = normalized
            .values()
            .filter_map(|s| s.last_period().map(Quarter::from_date))
            .min();
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) if start <= end => (start, end),
            _ => {
                return Err(PipelineError::InsufficientHistory(format!(
                    "{} metrics of {} share no reporting period",
                    statement, ticker
                )))
            }
        };

        let count = start.distance_to(&end) as usize + 1;
        let periods: Vec<NaiveDate> = (0..count as i64)
            .filter_map(|i| start.plus(i))
            .map(|q| q.end_date())
            .collect();

        let mut columns = BTreeMap::new();
        for (metric, s) in &normalized {
            let offset = s
                .first_period()
                .map(|p| Quarter::from_date(p).distance_to(&start) as usize)
                .unwrap_or(0);
            columns.insert(
                metric.column_name().to_string(),
                s.values()[offset..offset + count].to_vec(),
            );
        }

        Ok(FeatureTable {
            ticker: ticker.to_string(),
            statement,
            periods,
            columns,
            base: normalized.into_keys().collect(),
        })
    }

    /// Add growth, ratio and rolling columns, dropping incomplete rows.
    ///
    /// Derived columns are recomputed from the base metrics of `table`, so
    /// the result does not depend on which derived columns `table` already has.
    pub fn derive_features(&self, table: &FeatureTable) -> Result<FeatureTable> {
        let statement = table.statement;
        let n = table.len();
        let base = |metric: Metric| table.column(metric.column_name());

        let mut derived: Vec<(String, Vec<Option<f64>>)> = Vec::new();

        if let Some(revenue) = base(Metric::TotalRevenue) {
            let growth = (0..n)
                .map(|t| match t {
                    0 => None,
                    _ => ratio(revenue[t] - revenue[t - 1], revenue[t - 1]),
                })
                .collect();
            derived.push((REVENUE_GROWTH.to_string(), growth));

            if let Some(expenses) = base(Metric::TotalExpenses) {
                let expense_ratio = (0..n).map(|t| ratio(expenses[t], revenue[t])).collect();
                derived.push((EXPENSE_RATIO.to_string(), expense_ratio));
            }

            if statement.is_quarterly() {
                if let Some(net_income) = base(Metric::NetIncome) {
                    let margin = (0..n).map(|t| ratio(net_income[t], revenue[t])).collect();
                    derived.push((NET_INCOME_MARGIN.to_string(), margin));
                }
            }
        }

        if let (Some(assets), Some(liabilities)) = (
            base(Metric::TotalCurrentAssets),
            base(Metric::TotalCurrentLiabilities),
        ) {
            let current = (0..n).map(|t| ratio(assets[t], liabilities[t])).collect();
            derived.push((CURRENT_RATIO.to_string(), current));
        }

        if let (Some(liabilities), Some(equity)) =
            (base(Metric::TotalLiabilities), base(Metric::ShareholdersEquity))
        {
            let leverage = (0..n).map(|t| ratio(liabilities[t], equity[t])).collect();
            derived.push((DEBT_TO_EQUITY.to_string(), leverage));
        }

        for metric in statement.rolling_metrics() {
            if let Some(values) = base(*metric) {
                derived.push((
                    rolling_mean_column(*metric, self.rolling_window),
                    rolling_mean(values, self.rolling_window)?,
                ));
            }
        }

        let keep: Vec<usize> = (0..n)
            .filter(|&row| derived.iter().all(|(_, column)| column[row].is_some()))
            .collect();

        if keep.is_empty() {
            return Err(PipelineError::InsufficientHistory(format!(
                "no complete feature rows out of {} periods (rolling window {})",
                n, self.rolling_window
            )));
        }

        let mut columns: BTreeMap<String, Vec<f64>> = table
            .base
            .iter()
            .filter_map(|metric| {
                base(*metric).map(|values| {
                    (
                        metric.column_name().to_string(),
                        keep.iter().map(|&row| values[row]).collect(),
                    )
                })
            })
            .collect();
        for (name, column) in derived {
            columns.insert(name, keep.iter().filter_map(|&row| column[row]).collect());
        }

        Ok(FeatureTable {
            ticker: table.ticker.clone(),
            statement,
            periods: keep.iter().map(|&row| table.periods[row]).collect(),
            columns,
            base: table.base.clone(),
        })
    }

    /// Normalize, align and derive in one pass
    pub fn build(
        &self,
        ctx: &RunContext,
        statement: StatementKind,
        series: &[FinancialSeries],
    ) -> Result<FeatureTable> {
        self.build_tables(ctx, statement, series).map(|tables| tables.derived)
    }

    /// Normalize `series`, then derive features, keeping both tables
    pub fn build_tables(
        &self,
        ctx: &RunContext,
        statement: StatementKind,
        series: &[FinancialSeries],
    ) -> Result<FeatureTables> {
        let base = self.base_table(ctx.ticker(), statement, series)?;
        ctx.debug(format!(
            "normalized {} metrics onto {} quarters",
            base.base.len(),
            base.len()
        ));

        let table = self.derive_features(&base)?;
        let dropped = base.len() - table.len();
        if dropped > 0 {
            ctx.info(format!(
                "dropped {} of {} periods lacking complete features",
                dropped,
                base.len()
            ));
        }
        Ok(FeatureTables {
            base,
            derived: table,
        })
    }
}
