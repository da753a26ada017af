//! One ticker, one statement, one pass through every stage
//!
//! Loading and feature construction abort the run. After that each forecast
//! metric and the anomaly pass succeed or fail on their own, and failures are
//! collected in the [`RunReport`] instead of stopping the remaining work.
//!
//! Forecasts are fitted on the gap-free base table. The derived feature
//! table, which may skip quarters, is written out and scored for anomalies.

use crate::anomaly::{AnomalyLabels, AnomalyReport};
use crate::config::PipelineConfig;
use crate::context::{EventSink, LogSink, RunContext, Stage};
use crate::data::{FinancialSeries, SeriesLoader};
use crate::error::{PipelineError, Result};
use crate::features::FeatureTable;
use crate::metrics::{evaluate_anomaly_labels, evaluate_forecast_series, AnomalyMetrics, ForecastMetrics};
use crate::models::{ForecastModel, ForecastResult, HoltLinearTrend, TrainedForecastModel};
use crate::schema::{Metric, StatementKind};
use crate::stages::{StageDir, StageLayout};
use crate::store::MetricsStore;
use statement_math::smoothing::MIN_OBSERVATIONS;
use std::collections::HashMap;
use std::sync::Arc;

/// Forecast of one metric together with its validation score
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub metric: Metric,
    /// Smoothing parameters fitted on the training segment
    pub alpha: f64,
    pub beta: f64,
    pub degenerate: bool,
    /// Error of the training fit over the validation segment
    pub validation: ForecastMetrics,
    /// Forecast past the last observed quarter, fitted on the full series
    pub forecast: ForecastResult,
}

/// Anomaly labels and, when ground truth exists, their score
///
/// `evaluation` is `None` both without ground truth and when scoring it
/// failed; the failure is then listed in [`RunReport::failures`].
#[derive(Debug, Clone)]
pub struct AnomalyOutcome {
    pub report: AnomalyReport,
    pub evaluation: Option<AnomalyMetrics>,
}

/// Failure isolated to one unit of work
#[derive(Debug)]
pub struct MetricFailure {
    /// Metric column, the statement data type for the anomaly pass, or
    /// `{data_type}_labels` for its ground-truth evaluation
    pub name: String,
    pub error: PipelineError,
}

/// Everything one run produced
#[derive(Debug)]
pub struct RunReport {
    pub ticker: String,
    pub statement: StatementKind,
    /// Rows in the derived feature table
    pub periods: usize,
    pub forecasts: Vec<ForecastOutcome>,
    pub anomalies: Option<AnomalyOutcome>,
    pub failures: Vec<MetricFailure>,
}

impl RunReport {
    /// No metric and no anomaly pass failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn forecast(&self, metric: Metric) -> Option<&ForecastOutcome> {
        self.forecasts.iter().find(|f| f.metric == metric)
    }

    pub fn failure(&self, name: &str) -> Option<&PipelineError> {
        self.failures
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.error)
    }
}

/// Sequential batch pipeline
pub struct Pipeline {
    config: PipelineConfig,
    model: HoltLinearTrend,
    layout: StageLayout,
    store: MetricsStore,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and lay stages out under its data directory
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let layout = StageLayout::new(&config.data_dir);
        let store = MetricsStore::new(layout.dir(StageDir::Outputs));
        Ok(Self {
            config,
            model: HoltLinearTrend::optimized(),
            layout,
            store,
            sink: Arc::new(LogSink),
        })
    }

    /// Route run events to `sink` instead of the `log` facade
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Forecast with fixed or optimized smoothing parameters
    pub fn with_model(mut self, model: HoltLinearTrend) -> Self {
        self.model = model;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Run every stage for the snapshot at `loaded/{ticker}_{data_type}.csv`
    pub fn run(&self, ticker: &str, statement: StatementKind) -> Result<RunReport> {
        let ctx = RunContext::new(ticker, self.sink.clone());
        let path = self.layout.snapshot_path(ticker, statement);
        ctx.info(format!("loading {}", path.display()));

        let series = SeriesLoader::from_csv(&ctx, &path, statement)
            .and_then(|snapshot| {
                snapshot
                    .metrics()
                    .into_iter()
                    .map(|m| snapshot.series(m))
                    .collect::<Result<Vec<_>>>()
            })
            .map_err(|err| ctx.fail(err))?;

        self.run_series(&ctx, statement, &series)
    }

    /// Run every stage after loading on series already in memory
    pub fn run_series(
        &self,
        ctx: &RunContext,
        statement: StatementKind,
        series: &[FinancialSeries],
    ) -> Result<RunReport> {
        let load = ctx.at(Stage::Load);
        if let Some(short) = series.iter().find(|s| s.len() < MIN_OBSERVATIONS) {
            return Err(load.for_metric(short.metric()).fail(PipelineError::InsufficientData {
                required: MIN_OBSERVATIONS,
                actual: short.len(),
            }));
        }

        let features = ctx.at(Stage::Features);
        let tables = self
            .config
            .feature_engineer()
            .and_then(|engineer| engineer.build_tables(&features, statement, series))
            .map_err(|err| features.fail(err))?;
        let written = self
            .layout
            .write_features(&tables.derived)
            .map_err(|err| features.fail(err))?;
        features.debug(format!("wrote {}", written.display()));

        let mut report = RunReport {
            ticker: ctx.ticker().to_string(),
            statement,
            periods: tables.derived.len(),
            forecasts: Vec::new(),
            anomalies: None,
            failures: Vec::new(),
        };

        for metric in self.forecast_metrics(&tables.base) {
            let scoped = ctx.at(Stage::Forecast).for_metric(metric.column_name());
            match self.forecast_metric(&scoped, &tables.base, metric) {
                Ok(outcome) => report.forecasts.push(outcome),
                Err(err) => report.failures.push(MetricFailure {
                    name: metric.column_name().to_string(),
                    error: scoped.fail(err),
                }),
            }
        }

        let anomaly = ctx.at(Stage::Anomaly);
        match self.detect_anomalies(&anomaly, &tables.derived) {
            Ok(detected) => {
                let evaluation = match self.score_anomalies(&anomaly, statement, &detected) {
                    Ok(evaluation) => evaluation,
                    Err(err) => {
                        report.failures.push(MetricFailure {
                            name: format!("{}_labels", statement.data_type()),
                            error: anomaly.at(Stage::Evaluate).fail(err),
                        });
                        None
                    }
                };
                report.anomalies = Some(AnomalyOutcome {
                    report: detected,
                    evaluation,
                });
            }
            Err(err) => report.failures.push(MetricFailure {
                name: statement.data_type().to_string(),
                error: anomaly.fail(err),
            }),
        }

        ctx.info(format!(
            "run finished: {} forecasts, {} failures",
            report.forecasts.len(),
            report.failures.len()
        ));
        Ok(report)
    }

    fn forecast_metrics(&self, table: &FeatureTable) -> Vec<Metric> {
        if self.config.forecast_metrics.is_empty() {
            table.base_metrics()
        } else {
            self.config.forecast_metrics.clone()
        }
    }

    /// Split, fit, score on validation, save, then forecast past the data.
    ///
    /// `table` must not skip quarters.
    fn forecast_metric(
        &self,
        ctx: &RunContext,
        table: &FeatureTable,
        metric: Metric,
    ) -> Result<ForecastOutcome> {
        let name = metric.column_name();
        let series = table.series(name)?;

        let split_ctx = ctx.at(Stage::Split);
        let split = self
            .config
            .splitter()
            .and_then(|splitter| splitter.split(&series))
            .map_err(|err| split_ctx.fail(err))?;

        let trained = self.model.fit(&split.training)?;
        if trained.is_degenerate() {
            ctx.warn("flat error surface; using alpha = beta = 0.5");
        }
        ctx.debug(format!(
            "fitted alpha={:.2} beta={:.2} on {} periods",
            trained.alpha(),
            trained.beta(),
            split.training.len()
        ));
        let predicted = trained.forecast(split.validation.len())?;

        let evaluate = ctx.at(Stage::Evaluate);
        let validation =
            evaluate_forecast_series(&split.validation, &predicted).map_err(|err| evaluate.fail(err))?;
        evaluate.info(format!("mae={:.4} rmse={:.4}", validation.mae, validation.rmse));

        let store = ctx.at(Stage::Store);
        self.store
            .save(ctx.ticker(), name, &validation.into())
            .map_err(|err| store.fail(err))?;

        let full = self.model.fit(&series)?;
        let forecast = full.forecast(self.config.horizon)?;
        self.layout
            .write_forecast(&forecast)
            .map_err(|err| store.fail(err))?;

        Ok(ForecastOutcome {
            metric,
            alpha: trained.alpha(),
            beta: trained.beta(),
            degenerate: trained.is_degenerate(),
            validation,
            forecast,
        })
    }

    /// Label every period of `table` and write the labels out
    fn detect_anomalies(&self, ctx: &RunContext, table: &FeatureTable) -> Result<AnomalyReport> {
        let features: Vec<String> = if self.config.anomaly_features.is_empty() {
            table
                .base_metrics()
                .iter()
                .map(|m| m.column_name().to_string())
                .collect()
        } else {
            self.config.anomaly_features.clone()
        };
        let names: Vec<&str> = features.iter().map(String::as_str).collect();

        let report = self.config.anomaly_detector()?.detect(ctx, table, &names)?;
        self.layout
            .write_labels(table.ticker(), table.statement(), &report.labels)?;
        Ok(report)
    }

    /// Score `report` against ground-truth labels when they exist
    fn score_anomalies(
        &self,
        ctx: &RunContext,
        statement: StatementKind,
        report: &AnomalyReport,
    ) -> Result<Option<AnomalyMetrics>> {
        let truth = match self.layout.read_labels(ctx.ticker(), statement)? {
            Some(truth) => truth,
            None => {
                ctx.debug("no ground-truth labels; skipping anomaly evaluation");
                return Ok(None);
            }
        };

        let evaluate = ctx.at(Stage::Evaluate);
        let truth = align_labels(&truth, &report.labels).map_err(|err| evaluate.fail(err))?;
        let metrics =
            evaluate_anomaly_labels(&truth, &report.labels).map_err(|err| evaluate.fail(err))?;
        evaluate.info(format!(
            "precision={:.4} recall={:.4} f1={:.4}",
            metrics.precision, metrics.recall, metrics.f1
        ));
        self.store
            .save(ctx.ticker(), statement.data_type(), &metrics.into())
            .map_err(|err| ctx.at(Stage::Store).fail(err))?;
        Ok(Some(metrics))
    }
}

/// Restrict ground truth to the periods that were labelled
fn align_labels(truth: &AnomalyLabels, predicted: &AnomalyLabels) -> Result<AnomalyLabels> {
    let by_period: HashMap<_, _> = truth.points().collect();
    let labels = predicted
        .periods()
        .iter()
        .map(|period| {
            by_period.get(period).copied().ok_or_else(|| {
                PipelineError::MalformedData(format!("no ground-truth label for {}", period))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    AnomalyLabels::new(predicted.periods().to_vec(), labels)
}
