//! Run context and structured event sinks
//!
//! A [`RunContext`] is passed explicitly into every stage call. It names the
//! ticker and stage being processed and carries the sink that receives
//! [`RunEvent`]s, so nothing in the crate depends on process-wide logger
//! state.

use crate::error::{ErrorContext, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Pipeline stage a context or event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Features,
    Split,
    Forecast,
    Anomaly,
    Evaluate,
    Store,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Features => "features",
            Stage::Split => "split",
            Stage::Forecast => "forecast",
            Stage::Anomaly => "anomaly",
            Stage::Evaluate => "evaluate",
            Stage::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a run event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<EventLevel> for log::Level {
    fn from(level: EventLevel) -> Self {
        match level {
            EventLevel::Debug => log::Level::Debug,
            EventLevel::Info => log::Level::Info,
            EventLevel::Warn => log::Level::Warn,
            EventLevel::Error => log::Level::Error,
        }
    }
}

/// One structured event emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub ticker: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub level: EventLevel,
    pub message: String,
}

/// Receiver of run events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &RunEvent);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &RunEvent) {
        let level: log::Level = event.level.into();
        match &event.metric {
            Some(metric) => log::log!(
                target: "statement_forecast",
                level,
                "{} [{} / {}] {}",
                event.ticker,
                event.stage,
                metric,
                event.message
            ),
            None => log::log!(
                target: "statement_forecast",
                level,
                "{} [{}] {}",
                event.ticker,
                event.stage,
                event.message
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Appends one JSON object per event to a file
#[derive(Debug)]
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn record(&self, event: &RunEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                log::warn!("could not serialize run event: {}", err);
                return;
            }
        };
        if let Ok(mut file) = self.file.lock() {
            if let Err(err) = writeln!(file, "{}", line) {
                log::warn!("could not write run event: {}", err);
            }
        }
    }
}

/// Ticker, stage and event sink for one pipeline run
#[derive(Clone)]
pub struct RunContext {
    ticker: String,
    stage: Stage,
    metric: Option<String>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("ticker", &self.ticker)
            .field("stage", &self.stage)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Start a run for `ticker` at the load stage
    pub fn new(ticker: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            ticker: ticker.into(),
            stage: Stage::Load,
            metric: None,
            sink,
        }
    }

    /// Context that only logs through the `log` facade
    pub fn with_log_sink(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Arc::new(LogSink))
    }

    /// Same run, another stage
    pub fn at(&self, stage: Stage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }

    /// Same run and stage, scoped to one metric
    pub fn for_metric(&self, metric: impl Into<String>) -> Self {
        Self {
            metric: Some(metric.into()),
            ..self.clone()
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    pub fn emit(&self, level: EventLevel, message: impl Into<String>) {
        self.sink.record(&RunEvent {
            ticker: self.ticker.clone(),
            stage: self.stage,
            metric: self.metric.clone(),
            level,
            message: message.into(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(EventLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(EventLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(EventLevel::Error, message);
    }

    /// Tag `err` with this context and report it to the sink
    pub fn fail(&self, err: PipelineError) -> PipelineError {
        if matches!(err, PipelineError::InStage { .. }) {
            return err;
        }
        self.error(err.to_string());
        PipelineError::InStage {
            context: ErrorContext {
                ticker: self.ticker.clone(),
                stage: self.stage,
                metric: self.metric.clone(),
            },
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_carry_stage_and_metric() {
        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::new("AAPL", sink.clone());
        ctx.info("starting");
        ctx.at(Stage::Forecast).for_metric("total_revenue").warn("flat");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, Stage::Load);
        assert_eq!(events[0].metric, None);
        assert_eq!(events[1].stage, Stage::Forecast);
        assert_eq!(events[1].metric.as_deref(), Some("total_revenue"));
        assert_eq!(events[1].level, EventLevel::Warn);
    }

    #[test]
    fn test_fail_wraps_once() {
        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::new("MSFT", sink.clone()).at(Stage::Split);
        let err = ctx.fail(PipelineError::InsufficientData {
            required: 2,
            actual: 1,
        });
        let err = ctx.at(Stage::Store).fail(err);

        assert!(matches!(
            err.root(),
            PipelineError::InsufficientData { .. }
        ));
        assert_eq!(err.context().map(|c| c.stage), Some(Stage::Split));
        assert!(err.to_string().starts_with("MSFT [split]"));
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = Arc::new(JsonLinesSink::create(&path).unwrap());
        let ctx = RunContext::new("AAPL", sink);
        ctx.at(Stage::Anomaly).info("scored 12 rows");

        let text = std::fs::read_to_string(&path).unwrap();
        let event: RunEvent = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(event.stage, Stage::Anomaly);
        assert_eq!(event.message, "scored 12 rows");
    }
}
