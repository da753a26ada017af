use chrono::NaiveDate;
use statement_forecast::schema::Metric;
use statement_forecast::{PipelineError, RunContext, SeriesLoader, StatementKind};
use std::io::Write;
use tempfile::NamedTempFile;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn csv_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

#[test]
fn test_snapshot_loaded_in_date_order() {
    let file = csv_file(&[
        "Date,Total Revenue, Net Income ,Reported Currency",
        "2023-09-30,130.5,13.0,USD",
        "2023-06-30,120.0,,USD",
        "2023-03-31,110.25,11.0,USD",
    ]);
    let ctx = RunContext::with_log_sink("AAPL");
    let snapshot =
        SeriesLoader::from_csv(&ctx, file.path(), StatementKind::QuarterlyIncomeStatement).unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.metrics(), vec![Metric::TotalRevenue, Metric::NetIncome]);

    let revenue = snapshot.series(Metric::TotalRevenue).unwrap();
    assert_eq!(
        revenue.periods(),
        &[date(2023, 3, 31), date(2023, 6, 30), date(2023, 9, 30)]
    );
    assert_eq!(revenue.values(), &[110.25, 120.0, 130.5]);

    // The blank cell is skipped rather than read as zero.
    let net_income = snapshot.series(Metric::NetIncome).unwrap();
    assert_eq!(net_income.periods(), &[date(2023, 3, 31), date(2023, 9, 30)]);
}

#[test]
fn test_load_selected_metrics() {
    let file = csv_file(&[
        "date,total_revenue,total_expenses",
        "03/31/2023,100,80",
        "06/30/2023,104,82",
    ]);
    let ctx = RunContext::with_log_sink("MSFT");
    let series = SeriesLoader::load(
        &ctx,
        file.path(),
        StatementKind::QuarterlyIncomeStatement,
        &[Metric::TotalExpenses],
    )
    .unwrap();

    assert_eq!(series.len(), 1);
    assert_eq!(series[0].metric(), "total_expenses");
    assert_eq!(series[0].id().ticker, "MSFT");
    assert_eq!(series[0].values(), &[80.0, 82.0]);
}

#[test]
fn test_missing_snapshot_is_unavailable() {
    let ctx = RunContext::with_log_sink("AAPL");
    let result = SeriesLoader::from_csv(
        &ctx,
        "nonexistent_snapshot.csv",
        StatementKind::QuarterlyIncomeStatement,
    );
    assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
}

#[test]
fn test_missing_required_metric_is_unavailable() {
    let file = csv_file(&["date,total_liabilities", "2023-03-31,50", "2023-06-30,55"]);
    let ctx = RunContext::with_log_sink("AAPL");
    let result = SeriesLoader::from_csv(&ctx, file.path(), StatementKind::QuarterlyBalanceSheet);
    assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
}

#[test]
fn test_duplicate_period_is_malformed() {
    let file = csv_file(&[
        "date,total_revenue",
        "2023-03-31,100",
        "2023-06-30,104",
        "2023-03-31,101",
    ]);
    let ctx = RunContext::with_log_sink("AAPL");
    let result = SeriesLoader::from_csv(&ctx, file.path(), StatementKind::QuarterlyIncomeStatement);
    assert!(matches!(result, Err(PipelineError::MalformedData(_))));
}

#[test]
fn test_unparseable_date_is_malformed() {
    let file = csv_file(&["date,total_revenue", "Q1 2023,100", "Q2 2023,104"]);
    let ctx = RunContext::with_log_sink("AAPL");
    let result = SeriesLoader::from_csv(&ctx, file.path(), StatementKind::QuarterlyIncomeStatement);
    assert!(matches!(result, Err(PipelineError::MalformedData(_))));
}
