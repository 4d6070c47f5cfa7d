use serde::Deserialize;

use crate::{
    error::{RecResult, RecommendError},
    models::SimilarityMetric,
};

/// Recommender configuration loaded from `CINEMATCH_*` environment variables
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Length of individual and group recommendation lists
    #[serde(default = "default_recommendation_count")]
    pub recommendation_count: usize,

    /// Neighbors used for recommendation outside of evaluation sweeps
    #[serde(default = "default_neighbor_size")]
    pub neighbor_size: usize,

    /// Similarity used for group and sequential recommendation
    #[serde(default = "default_group_metric")]
    pub group_metric: SimilarityMetric,

    /// Rounds of sequential group recommendation
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Metric names evaluated by the sweep (comma-separated in the environment)
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    #[serde(default = "default_neighbor_size_min")]
    pub neighbor_size_min: usize,

    #[serde(default = "default_neighbor_size_max")]
    pub neighbor_size_max: usize,

    #[serde(default = "default_neighbor_size_step")]
    pub neighbor_size_step: usize,

    /// Share of ratings kept for training in a percentage split
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,

    #[serde(default)]
    pub shuffle: bool,

    /// Seed for shuffled splits; a fresh random order when absent
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_folds")]
    pub folds: usize,

    /// Metric tasks allowed to run at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Longest wait for the next evaluation cell to finish
    #[serde(default = "default_cell_timeout_secs")]
    pub cell_timeout_secs: u64,

    /// Cap predictions at 5.0 before measuring error
    #[serde(default = "default_clamp_predictions")]
    pub clamp_predictions: bool,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_recommendation_count() -> usize {
    10
}

fn default_neighbor_size() -> usize {
    50
}

fn default_group_metric() -> SimilarityMetric {
    SimilarityMetric::Pcc
}

fn default_iterations() -> usize {
    5
}

fn default_metrics() -> Vec<String> {
    SimilarityMetric::ALL.iter().map(|m| m.to_string()).collect()
}

fn default_neighbor_size_min() -> usize {
    10
}

fn default_neighbor_size_max() -> usize {
    100
}

fn default_neighbor_size_step() -> usize {
    10
}

fn default_train_ratio() -> f64 {
    0.8
}

fn default_folds() -> usize {
    5
}

fn default_max_workers() -> usize {
    4
}

fn default_cell_timeout_secs() -> u64 {
    300
}

fn default_clamp_predictions() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recommendation_count: default_recommendation_count(),
            neighbor_size: default_neighbor_size(),
            group_metric: default_group_metric(),
            iterations: default_iterations(),
            metrics: default_metrics(),
            neighbor_size_min: default_neighbor_size_min(),
            neighbor_size_max: default_neighbor_size_max(),
            neighbor_size_step: default_neighbor_size_step(),
            train_ratio: default_train_ratio(),
            shuffle: false,
            seed: None,
            folds: default_folds(),
            max_workers: default_max_workers(),
            cell_timeout_secs: default_cell_timeout_secs(),
            clamp_predictions: default_clamp_predictions(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and a `.env` file if present)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from explicit key/value pairs
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed("CINEMATCH_")
            .from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;
        Ok(config)
    }

    pub fn validate(&self) -> RecResult<()> {
        if !(0.0..=1.0).contains(&self.train_ratio) {
            return Err(RecommendError::InvalidInput(format!(
                "train_ratio must be within [0, 1], got {}",
                self.train_ratio
            )));
        }
        if self.neighbor_size_step == 0 {
            return Err(RecommendError::InvalidInput(
                "neighbor_size_step must be positive".to_string(),
            ));
        }
        if self.neighbor_size_min > self.neighbor_size_max {
            return Err(RecommendError::InvalidInput(format!(
                "neighbor_size_min ({}) exceeds neighbor_size_max ({})",
                self.neighbor_size_min, self.neighbor_size_max
            )));
        }
        if self.folds == 0 || self.max_workers == 0 {
            return Err(RecommendError::InvalidInput(
                "folds and max_workers must be positive".to_string(),
            ));
        }
        SimilarityMetric::parse_all(&self.metrics)?;
        tracing_subscriber::EnvFilter::try_new(&self.log_filter).map_err(|e| {
            RecommendError::InvalidInput(format!("invalid log_filter '{}': {}", self.log_filter, e))
        })?;
        Ok(())
    }

    /// Neighbor sizes covered by the sweep, min to max inclusive
    pub fn neighbor_sizes(&self) -> Vec<usize> {
        (self.neighbor_size_min..=self.neighbor_size_max)
            .step_by(self.neighbor_size_step.max(1))
            .collect()
    }
}
