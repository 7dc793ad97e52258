//! Boosted ensemble and its canonical serialisation

use serde::{Deserialize, Serialize};

use crate::cart::Tree;
use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};

/// Current model format version
pub const MODEL_VERSION: u32 = 1;

/// Additive tree ensemble: `bias + learning_rate * sum(tree(x))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub version: u32,
    pub target: String,
    pub feature_names: Vec<String>,
    pub bias: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
}

impl Model {
    pub fn predict(&self, features: &[Option<f64>]) -> f64 {
        self.bias
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.evaluate(features))
                .sum::<f64>()
    }

    pub fn predict_dataset(&self, dataset: &Dataset) -> Result<Vec<f64>> {
        if dataset.feature_names != self.feature_names {
            return Err(TrainerError::Dataset(
                "dataset features do not match the model".to_string(),
            ));
        }
        Ok(dataset.features.iter().map(|row| self.predict(row)).collect())
    }

    /// Compact JSON with fields in declaration order. Identical models
    /// serialise to identical bytes.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let model: Model = serde_json::from_str(content)?;
        if model.version != MODEL_VERSION {
            return Err(TrainerError::Dataset(format!(
                "unsupported model version {}",
                model.version
            )));
        }
        Ok(model)
    }

    /// BLAKE3 hex digest of the canonical JSON.
    pub fn hash_hex(&self) -> Result<String> {
        let json = self.to_canonical_json()?;
        Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
    }
}
