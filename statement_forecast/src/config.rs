//! Run configuration

use crate::anomaly::{
    AnomalyDetector, DEFAULT_CONTAMINATION, DEFAULT_MAX_SAMPLES, DEFAULT_SEED, DEFAULT_TREES,
};
use crate::error::{PipelineError, Result};
use crate::features::{FeatureEngineer, DEFAULT_ROLLING_WINDOW};
use crate::schema::Metric;
use crate::split::{Splitter, DEFAULT_TRAIN_FRACTION};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default number of quarters forecast past the last observation
pub const DEFAULT_HORIZON: usize = 4;

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the stage directories
    pub data_dir: PathBuf,
    pub train_fraction: f64,
    pub horizon: usize,
    pub rolling_window: usize,
    pub contamination: f64,
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
    /// Metrics to forecast; empty means every base metric of the table
    pub forecast_metrics: Vec<Metric>,
    /// Columns fed to the anomaly detector; empty means every base metric
    pub anomaly_features: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            horizon: DEFAULT_HORIZON,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            contamination: DEFAULT_CONTAMINATION,
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            seed: DEFAULT_SEED,
            forecast_metrics: Vec::new(),
            anomaly_features: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter range
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(PipelineError::InvalidParameter(
                "Forecast horizon must be at least 1".to_string(),
            ));
        }
        self.splitter()?;
        self.feature_engineer()?;
        self.anomaly_detector()?;
        Ok(())
    }

    pub fn splitter(&self) -> Result<Splitter> {
        Splitter::new(self.train_fraction)
    }

    pub fn feature_engineer(&self) -> Result<FeatureEngineer> {
        FeatureEngineer::new(self.rolling_window)
    }

    pub fn anomaly_detector(&self) -> Result<AnomalyDetector> {
        Ok(AnomalyDetector::new()
            .contamination(self.contamination)?
            .n_trees(self.n_trees)?
            .max_samples(self.max_samples)?
            .seed(self.seed))
    }
}
