//! Vegcast trainer - deterministic GBDT over the merged split tables
//!
//! Fits on the train split, early-stops on the valid split and reports
//! metrics and per-day predictions on the test split.

pub mod artifacts;
pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod trainer;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use vegcast_pipeline::merge::split_name;
use vegcast_pipeline::schema::TARGET;
use vegcast_pipeline::{PipelineConfig, SplitRole};

pub use artifacts::{ArtifactPaths, MetricsReport};
pub use dataset::{Dataset, FeatureStats};
pub use deterministic::SplitTieBreaker;
pub use errors::{Result, TrainerError};
pub use metrics::Metrics;
pub use model::Model;
pub use trainer::{GbdtTrainer, TrainedModel, TrainingParams};

/// Inputs and outputs of one training run.
#[derive(Debug, Clone)]
pub struct TrainJob {
    pub crop: String,
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test: PathBuf,
    pub output_dir: PathBuf,
}

impl TrainJob {
    /// Read the merge stage's outputs for the configured crop.
    pub fn from_pipeline(config: &PipelineConfig, output_dir: &Path) -> Self {
        let split = |role| {
            config
                .paths
                .merged_dir
                .join(split_name(role, &config.crop, &config.split.suffix))
        };
        Self {
            crop: config.crop.clone(),
            train: split(SplitRole::Train),
            valid: split(SplitRole::Valid),
            test: split(SplitRole::Test),
            output_dir: output_dir.to_path_buf(),
        }
    }
}

/// Outcome of [`train_crop`].
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub paths: ArtifactPaths,
    pub model_hash: String,
    pub trees: usize,
    pub test: Metrics,
    /// Features with no observed value in the train split
    pub empty_features: Vec<String>,
}

/// Train, evaluate on the test split and write every artifact.
pub fn train_crop(job: &TrainJob, params: TrainingParams) -> Result<TrainReport> {
    let train = Dataset::from_csv(&job.train, TARGET)?;
    let valid = Dataset::from_csv_with(&job.valid, TARGET, &train.feature_names)?;
    let test = Dataset::from_csv_with(&job.test, TARGET, &train.feature_names)?;
    info!(
        "Loaded {} train, {} valid, {} test row(s) with {} features",
        train.len(),
        valid.len(),
        test.len(),
        train.feature_count()
    );
    let mut empty_features = Vec::new();
    for stats in train.feature_stats() {
        debug!(
            "  {}: min {:?}, max {:?}, {} missing",
            stats.name, stats.min, stats.max, stats.missing
        );
        if !train.is_empty() && stats.missing == train.len() {
            empty_features.push(stats.name);
        }
    }
    if !empty_features.is_empty() {
        warn!("Features never observed in train: {:?}", empty_features);
    }
    if test.is_empty() {
        return Err(TrainerError::Dataset("test split has no labelled rows".to_string()));
    }

    let mut trained = GbdtTrainer::new(params).train(&train, Some(&valid))?;
    trained.model.target = TARGET.to_string();
    let model = &trained.model;

    let predicted = model.predict_dataset(&test)?;
    let metrics = Metrics::compute(&test.targets, &predicted);
    info!(
        "Test RMSE {:.3}, MAE {:.3}, R2 {:.3} over {} row(s)",
        metrics.rmse, metrics.mae, metrics.r2, metrics.rows
    );

    let paths = ArtifactPaths::new(&job.output_dir, &job.crop);
    let model_hash = artifacts::save_model(&paths, model)?;
    artifacts::save_predictions(&paths.predictions, &test.dates, &test.targets, &predicted)?;
    artifacts::save_metrics(
        &paths.metrics,
        &MetricsReport {
            crop: &job.crop,
            model_hash: &model_hash,
            trees: model.trees.len(),
            best_iteration: trained.best_iteration,
            valid_rmse: trained.valid_rmse.get(trained.best_iteration.saturating_sub(1)).copied(),
            test: metrics,
        },
    )?;

    Ok(TrainReport {
        paths,
        model_hash,
        trees: model.trees.len(),
        test: metrics,
        empty_features,
    })
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
