//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Squared-loss boosting with exact-greedy CART trees. Training is fully
//! deterministic: no sampling, no shuffling, and split ties are broken by
//! a fixed key. With a validation set, boosting stops once validation RMSE
//! has not improved for `early_stopping_rounds` trees and the ensemble is
//! cut back to its best iteration.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cart::{CartBuilder, Tree, TreeConfig};
use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::metrics::rmse;
use crate::model::{Model, MODEL_VERSION};

/// GBDT hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    pub max_thresholds: usize,
    /// 0 disables early stopping
    pub early_stopping_rounds: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_trees: 300,
            max_depth: 6,
            min_samples_leaf: 20,
            learning_rate: 0.05,
            max_thresholds: 64,
            early_stopping_rounds: 30,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(TrainerError::Training("num_trees must be positive".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(TrainerError::Training(format!(
                "learning_rate {} outside (0, 1]",
                self.learning_rate
            )));
        }
        Ok(())
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_thresholds: self.max_thresholds,
        }
    }
}

/// A trained model with its validation history.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: Model,
    /// Number of trees kept
    pub best_iteration: usize,
    /// Validation RMSE after each boosting round
    pub valid_rmse: Vec<f64>,
}

pub struct GbdtTrainer {
    params: TrainingParams,
}

impl GbdtTrainer {
    pub fn new(params: TrainingParams) -> Self {
        Self { params }
    }

    /// Fit on `train`, early stopping on `valid` when given.
    pub fn train(&self, train: &Dataset, valid: Option<&Dataset>) -> Result<TrainedModel> {
        self.params.validate()?;
        if train.is_empty() {
            return Err(TrainerError::Dataset("training set is empty".to_string()));
        }
        if let Some(valid) = valid {
            if valid.feature_names != train.feature_names {
                return Err(TrainerError::Dataset(
                    "validation features do not match training features".to_string(),
                ));
            }
        }
        let valid = valid.filter(|v| !v.is_empty());

        let bias = calculate_bias(&train.targets);
        let lr = self.params.learning_rate;
        let mut predictions = vec![bias; train.len()];
        let mut valid_predictions = valid.map(|v| vec![bias; v.len()]);
        let hessians = vec![1.0; train.len()];

        let mut trees: Vec<Tree> = Vec::with_capacity(self.params.num_trees);
        let mut history = Vec::new();
        let mut best = (f64::INFINITY, 0usize);

        for round in 0..self.params.num_trees {
            let gradients = calculate_gradients(&train.targets, &predictions);
            let tree = CartBuilder::new(&train.features, &gradients, &hessians, self.params.tree_config()).build();
            let depth = tree.depth();

            for (pred, row) in predictions.iter_mut().zip(&train.features) {
                *pred += lr * tree.evaluate(row);
            }
            trees.push(tree);

            let (Some(valid), Some(valid_preds)) = (valid, valid_predictions.as_mut()) else {
                debug!(
                    "round {}: depth {}, train rmse {:.4}",
                    round + 1,
                    depth,
                    rmse(&train.targets, &predictions)
                );
                continue;
            };
            let last = &trees[trees.len() - 1];
            for (pred, row) in valid_preds.iter_mut().zip(&valid.features) {
                *pred += lr * last.evaluate(row);
            }

            let score = rmse(&valid.targets, valid_preds);
            history.push(score);
            debug!("round {}: depth {}, valid rmse {:.4}", round + 1, depth, score);

            if score < best.0 {
                best = (score, round + 1);
            } else if self.params.early_stopping_rounds > 0
                && round + 1 - best.1 >= self.params.early_stopping_rounds
            {
                info!(
                    "Early stopping at round {}, best round {} (valid rmse {:.4})",
                    round + 1,
                    best.1,
                    best.0
                );
                break;
            }
        }

        let best_iteration = if valid.is_some() { best.1.max(1) } else { trees.len() };
        trees.truncate(best_iteration);

        Ok(TrainedModel {
            model: Model {
                version: MODEL_VERSION,
                target: String::new(),
                feature_names: train.feature_names.clone(),
                bias,
                learning_rate: lr,
                trees,
            },
            best_iteration,
            valid_rmse: history,
        })
    }
}

/// Initial prediction: mean of targets
fn calculate_bias(targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    targets.iter().sum::<f64>() / targets.len() as f64
}

/// Squared-loss gradient `prediction - target`; the hessian is constant.
fn calculate_gradients(targets: &[f64], predictions: &[f64]) -> Vec<f64> {
    predictions.iter().zip(targets).map(|(p, t)| p - t).collect()
}
