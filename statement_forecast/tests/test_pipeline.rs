use chrono::NaiveDate;
use statement_forecast::calendar::Quarter;
use statement_forecast::context::MemorySink;
use statement_forecast::data::SeriesId;
use statement_forecast::metrics::EvaluationKind;
use statement_forecast::schema::Metric;
use statement_forecast::stages::StageLayout;
use statement_forecast::{
    FinancialSeries, Pipeline, PipelineConfig, PipelineError, RunContext, Stage, StatementKind,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const KIND: StatementKind = StatementKind::QuarterlyIncomeStatement;

fn quarter_ends(count: usize) -> Vec<NaiveDate> {
    let start = Quarter::new(2021, 1).unwrap();
    (0..count).map(|i| start.plus(i as i64).unwrap().end_date()).collect()
}

/// Near-linear revenue with small alternating noise
fn revenue(t: usize) -> f64 {
    let noise = if t % 2 == 0 { 0.3 } else { -0.3 };
    100.0 + 5.0 * t as f64 + noise
}

fn write_snapshot(root: &Path, ticker: &str, periods: usize) {
    write_snapshot_with(root, ticker, periods, revenue);
}

fn write_snapshot_with(root: &Path, ticker: &str, periods: usize, revenue: impl Fn(usize) -> f64) {
    let path = StageLayout::new(root).snapshot_path(ticker, KIND);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut text = String::from("Date,Total Revenue,Total Expenses,Net Income\n");
    // Newest first, as statement providers usually list them.
    for (t, date) in quarter_ends(periods).into_iter().enumerate().rev() {
        let r = revenue(t);
        text.push_str(&format!("{},{},{},{}\n", date, r, r * 0.8, r * 0.1 + 1.0));
    }
    fs::write(path, text).unwrap();
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: root.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_end_to_end_near_linear_revenue() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "ACME", 12);

    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(config(dir.path()))
        .unwrap()
        .with_sink(sink.clone());
    let report = pipeline.run("ACME", KIND).unwrap();

    assert!(report.is_complete(), "failures: {:?}", report.failures);
    // Rolling means over 4 quarters drop the first 3 periods.
    assert_eq!(report.periods, 9);

    let outcome = report.forecast(Metric::TotalRevenue).unwrap();
    assert!(
        outcome.validation.mae < 5.0,
        "validation MAE too large: {}",
        outcome.validation.mae
    );
    assert!(outcome.validation.rmse >= outcome.validation.mae);
    assert_eq!(outcome.forecast.horizon(), 4);
    assert_eq!(
        outcome.forecast.periods()[0],
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    );

    // Future forecast and features are handed to the later stages.
    let layout = pipeline.layout();
    let id = SeriesId::new("ACME", KIND, "total_revenue");
    assert_eq!(layout.read_forecast(&id).unwrap().as_ref(), Some(&outcome.forecast));
    assert!(layout.features_path("ACME", KIND).is_file());
    assert!(layout.anomalies_path("ACME", KIND).is_file());

    let anomalies = report.anomalies.as_ref().unwrap();
    assert_eq!(anomalies.report.labels.len(), 9);
    assert!(anomalies.report.labels.anomalous_periods().len() <= 1);
    assert!(anomalies.evaluation.is_none());

    let events = sink.events();
    assert!(events
        .iter()
        .any(|e| e.stage == Stage::Evaluate && e.metric.as_deref() == Some("total_revenue")));
}

#[test]
fn test_repeated_runs_append_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "ACME", 12);
    let pipeline = Pipeline::new(config(dir.path())).unwrap();

    pipeline.run("ACME", KIND).unwrap();
    pipeline.run("ACME", KIND).unwrap();

    let history = pipeline
        .store()
        .history("ACME", "total_revenue", EvaluationKind::Forecast)
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], history[1]);
}

#[test]
fn test_ground_truth_labels_are_scored() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "ACME", 12);

    let layout = StageLayout::new(dir.path());
    let labels_path = layout.labels_path("ACME", KIND);
    fs::create_dir_all(labels_path.parent().unwrap()).unwrap();
    let mut text = String::from("date,label\n");
    for (t, date) in quarter_ends(12).into_iter().enumerate() {
        let label = if t == 6 { "anomalous" } else { "normal" };
        text.push_str(&format!("{},{}\n", date, label));
    }
    fs::write(&labels_path, text).unwrap();

    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let report = pipeline.run("ACME", KIND).unwrap();

    let evaluation = report.anomalies.unwrap().evaluation.unwrap();
    assert!((0.0..=1.0).contains(&evaluation.precision));
    assert!((0.0..=1.0).contains(&evaluation.recall));
    assert_eq!(
        pipeline
            .store()
            .history("ACME", KIND.data_type(), EvaluationKind::Anomaly)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_zero_revenue_quarter_still_forecasts() {
    let dir = tempfile::tempdir().unwrap();
    // Revenue is zero in the twelfth quarter only.
    write_snapshot_with(dir.path(), "ACME", 16, |t| if t == 11 { 0.0 } else { revenue(t) });

    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let report = pipeline.run("ACME", KIND).unwrap();

    assert!(report.is_complete(), "failures: {:?}", report.failures);
    // Rolling warm-up drops 3 rows; the zero quarter and the one after it
    // lose margin and growth.
    assert_eq!(report.periods, 11);
    assert_eq!(report.forecasts.len(), 3);
    for metric in [Metric::TotalRevenue, Metric::TotalExpenses, Metric::NetIncome] {
        let outcome = report.forecast(metric).unwrap();
        assert_eq!(outcome.forecast.horizon(), 4);
        assert_eq!(
            outcome.forecast.periods()[0],
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
    }
    assert_eq!(report.anomalies.unwrap().report.labels.len(), 11);
}

#[test]
fn test_malformed_ground_truth_keeps_anomaly_labels() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "ACME", 12);

    // Only one quarter is labelled, so most predicted periods have no truth.
    let labels_path = StageLayout::new(dir.path()).labels_path("ACME", KIND);
    fs::create_dir_all(labels_path.parent().unwrap()).unwrap();
    fs::write(&labels_path, "date,label\n2023-06-30,anomalous\n").unwrap();

    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let report = pipeline.run("ACME", KIND).unwrap();

    let anomalies = report.anomalies.as_ref().unwrap();
    assert_eq!(anomalies.report.labels.len(), 9);
    assert!(anomalies.evaluation.is_none());
    assert!(pipeline.layout().anomalies_path("ACME", KIND).is_file());

    let failure = report.failure("quarterly_income_statement_labels").unwrap();
    assert!(matches!(failure.root(), PipelineError::MalformedData(_)));
    assert_eq!(failure.context().unwrap().stage, Stage::Evaluate);
    assert!(report.failure(KIND.data_type()).is_none());
    assert_eq!(report.forecasts.len(), 3);
}

#[test]
fn test_single_period_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "TINY", 1);

    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let err = pipeline.run("TINY", KIND).unwrap_err();

    assert!(matches!(
        err.root(),
        PipelineError::InsufficientData {
            required: 2,
            actual: 1
        }
    ));
    assert_eq!(err.context().unwrap().stage, Stage::Load);
}

#[test]
fn test_in_memory_series_with_one_period() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let series = FinancialSeries::from_parts(
        SeriesId::new("TINY", KIND, "total_revenue"),
        quarter_ends(1),
        vec![100.0],
    )
    .unwrap();

    let ctx = RunContext::new("TINY", Arc::new(MemorySink::new()));
    let err = pipeline.run_series(&ctx, KIND, &[series]).unwrap_err();
    assert!(matches!(err.root(), PipelineError::InsufficientData { .. }));
}

#[test]
fn test_missing_snapshot_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path())).unwrap();
    let err = pipeline.run("NONE", KIND).unwrap_err();
    assert!(matches!(err.root(), PipelineError::DataUnavailable(_)));
}

#[test]
fn test_metric_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "ACME", 12);

    let pipeline = Pipeline::new(PipelineConfig {
        forecast_metrics: vec![Metric::GrossProfit, Metric::TotalRevenue],
        ..config(dir.path())
    })
    .unwrap();
    let report = pipeline.run("ACME", KIND).unwrap();

    assert!(!report.is_complete());
    let failure = report.failure("gross_profit").unwrap();
    assert!(matches!(failure.root(), PipelineError::DataUnavailable(_)));
    assert_eq!(
        failure.context().unwrap().metric.as_deref(),
        Some("gross_profit")
    );
    assert!(report.forecast(Metric::TotalRevenue).is_some());
}
