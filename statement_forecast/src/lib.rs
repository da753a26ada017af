//! # Statement Forecast
//!
//! A Rust library for turning periodic financial statements into quarterly
//! feature tables, trend forecasts and anomaly labels, and for scoring both
//! against held-out data.
//!
//! ## Features
//!
//! - Snapshot loading from CSV (header normalization, per-statement schema)
//! - Quarterly frequency normalization with carry-forward gap filling
//! - Derived features: revenue growth, expense ratio, margins, balance-sheet
//!   ratios and trailing rolling means
//! - Chronological train/validation splitting
//! - Holt linear-trend forecasting with optimized smoothing parameters
//! - Seeded isolation-forest anomaly labelling
//! - MAE/RMSE and precision/recall/F1 evaluation, appended to a CSV log
//!
//! ## Quick Start
//!
//! ```no_run
//! use statement_forecast::{Pipeline, PipelineConfig, StatementKind};
//!
//! let config = PipelineConfig {
//!     data_dir: "data".into(),
//!     ..Default::default()
//! };
//! let pipeline = Pipeline::new(config)?;
//! let report = pipeline.run("AAPL", StatementKind::QuarterlyIncomeStatement)?;
//!
//! for outcome in &report.forecasts {
//!     println!("{}: MAE {:.2}", outcome.metric, outcome.validation.mae);
//! }
//! # Ok::<(), statement_forecast::PipelineError>(())
//! ```
//!
//! Each stage can also be used on its own:
//!
//! ```no_run
//! use statement_forecast::models::{ForecastModel, HoltLinearTrend, TrainedForecastModel};
//! use statement_forecast::{FeatureEngineer, RunContext, SeriesLoader, Splitter, StatementKind};
//! use statement_forecast::schema::Metric;
//!
//! let ctx = RunContext::with_log_sink("AAPL");
//! let kind = StatementKind::QuarterlyIncomeStatement;
//! let series = SeriesLoader::load(&ctx, "AAPL.csv", kind, &[Metric::TotalRevenue])?;
//! let table = FeatureEngineer::default().build(&ctx, kind, &series)?;
//!
//! let revenue = table.series("total_revenue")?;
//! let split = Splitter::default().split(&revenue)?;
//! let model = HoltLinearTrend::optimized().fit(&split.training)?;
//! let forecast = model.forecast(split.validation.len())?;
//! # Ok::<(), statement_forecast::PipelineError>(())
//! ```

pub mod anomaly;
pub mod calendar;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod split;
pub mod stages;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use crate::anomaly::{AnomalyDetector, AnomalyLabel, AnomalyLabels};
pub use crate::config::PipelineConfig;
pub use crate::context::{RunContext, Stage};
pub use crate::data::{FinancialSeries, SeriesLoader};
pub use crate::error::PipelineError;
pub use crate::features::{FeatureEngineer, FeatureTable, FeatureTables};
pub use crate::metrics::{evaluate_anomalies, evaluate_forecast, EvaluationMetrics};
pub use crate::models::{ForecastModel, ForecastResult};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::schema::StatementKind;
pub use crate::split::Splitter;
pub use crate::store::MetricsStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
