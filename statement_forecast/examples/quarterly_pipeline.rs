use statement_forecast::calendar::Quarter;
use statement_forecast::context::JsonLinesSink;
use statement_forecast::{Pipeline, PipelineConfig, StatementKind};
use std::fs;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = tempfile::tempdir()?;
    let kind = StatementKind::QuarterlyIncomeStatement;

    // Three years of a growing business with one bad quarter
    let config = PipelineConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config)?;
    let snapshot = pipeline.layout().snapshot_path("DEMO", kind);
    fs::create_dir_all(snapshot.parent().ok_or("snapshot path has no parent")?)?;

    let start = Quarter::new(2021, 1).ok_or("invalid quarter")?;
    let mut csv = String::from("date,Total Revenue,Total Expenses,Net Income\n");
    for t in 0..12 {
        let revenue = 1_000.0 + 40.0 * t as f64 + if t % 3 == 0 { 15.0 } else { -5.0 };
        let expenses = if t == 8 { revenue * 1.1 } else { revenue * 0.75 };
        csv.push_str(&format!(
            "{},{:.1},{:.1},{:.1}\n",
            start.plus(t).ok_or("quarter out of range")?.end_date(),
            revenue,
            expenses,
            revenue - expenses
        ));
    }
    fs::write(&snapshot, csv)?;
    println!("Snapshot written to {}", snapshot.display());

    let events = dir.path().join("events.jsonl");
    let pipeline = pipeline.with_sink(Arc::new(JsonLinesSink::create(&events)?));
    let report = pipeline.run("DEMO", kind)?;

    println!("\nFeature table: {} quarters", report.periods);
    for outcome in &report.forecasts {
        println!(
            "\n{} (alpha={:.2}, beta={:.2}{})",
            outcome.metric,
            outcome.alpha,
            outcome.beta,
            if outcome.degenerate { ", fallback" } else { "" }
        );
        print!("{}", outcome.validation);
        for (period, value) in outcome.forecast.points() {
            println!("  {}: {:.1}", Quarter::from_date(period), value);
        }
    }

    if let Some(anomalies) = &report.anomalies {
        println!("\nAnomalous quarters:");
        for period in anomalies.report.labels.anomalous_periods() {
            println!("  {}", Quarter::from_date(period));
        }
    }

    for failure in &report.failures {
        println!("\nFailed: {} ({})", failure.name, failure.error);
    }

    println!("\nRun events: {}", fs::read_to_string(&events)?.lines().count());
    Ok(())
}
