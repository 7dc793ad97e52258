//! Model, hash, prediction and metrics files for one crop

use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use vegcast_pipeline::calendar::format_local_era;
use vegcast_pipeline::io::write_csv_atomic;

use crate::errors::{Result, TrainerError};
use crate::metrics::Metrics;
use crate::model::Model;

/// Paths of everything written for a crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub hash: PathBuf,
    pub predictions: PathBuf,
    pub metrics: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, crop: &str) -> Self {
        Self {
            model: dir.join(format!("model_{}.json", crop)),
            hash: dir.join(format!("model_{}.hash", crop)),
            predictions: dir.join(format!("prediction_{}.csv", crop)),
            metrics: dir.join(format!("metrics_{}.json", crop)),
        }
    }
}

/// Contents of the metrics file.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport<'a> {
    pub crop: &'a str,
    pub model_hash: &'a str,
    pub trees: usize,
    pub best_iteration: usize,
    pub valid_rmse: Option<f64>,
    pub test: Metrics,
}

/// Write `bytes` to a temporary sibling, sync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| TrainerError::Io(e.error))?;
    Ok(())
}

/// Write the canonical model JSON and its BLAKE3 hash. Returns the hash.
pub fn save_model(paths: &ArtifactPaths, model: &Model) -> Result<String> {
    let json = model.to_canonical_json()?;
    let hash = hex::encode(blake3::hash(json.as_bytes()).as_bytes());

    write_atomic(&paths.model, json.as_bytes())?;
    write_atomic(&paths.hash, hash.as_bytes())?;
    info!("Saved model to {} ({})", paths.model.display(), hash);
    Ok(hash)
}

/// Read a model back, checking it against its hash file when present.
pub fn load_model(paths: &ArtifactPaths) -> Result<Model> {
    let json = fs::read_to_string(&paths.model)?;
    let model = Model::from_json(&json)?;

    if paths.hash.is_file() {
        let expected = fs::read_to_string(&paths.hash)?;
        let actual = hex::encode(blake3::hash(json.as_bytes()).as_bytes());
        if expected.trim() != actual {
            return Err(TrainerError::Dataset(format!(
                "{} does not match its hash file",
                paths.model.display()
            )));
        }
    }
    Ok(model)
}

/// Write `date,actual,predicted` rows with local-era dates.
pub fn save_predictions(path: &Path, dates: &[NaiveDate], actual: &[f64], predicted: &[f64]) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record(["date", "actual", "predicted"])?;
        for ((date, a), p) in dates.iter().zip(actual).zip(predicted) {
            w.write_record([format_local_era(*date), a.to_string(), format!("{:.2}", p)])?;
        }
        Ok(())
    })?;
    info!("Saved {} prediction(s) to {}", dates.len(), path.display());
    Ok(())
}

pub fn save_metrics(path: &Path, report: &MetricsReport<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    write_atomic(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{Node, Tree};
    use crate::model::MODEL_VERSION;
    use tempfile::tempdir;

    fn model() -> Model {
        Model {
            version: MODEL_VERSION,
            target: "avg_price".to_string(),
            feature_names: vec!["x".to_string()],
            bias: 1.5,
            learning_rate: 0.1,
            trees: vec![Tree {
                nodes: vec![Node::leaf(2.0)],
            }],
        }
    }

    #[test]
    fn test_model_and_hash_round_trip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let paths = ArtifactPaths::new(dir.path(), "kai-lan");

        let hash = save_model(&paths, &model())?;
        assert_eq!(fs::read_to_string(&paths.hash)?, hash);
        assert_eq!(load_model(&paths)?, model());

        fs::write(&paths.hash, "0".repeat(64))?;
        assert!(load_model(&paths).is_err());
        Ok(())
    }

    #[test]
    fn test_predictions_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("prediction_kai-lan.csv");
        let dates = vec![NaiveDate::from_ymd_opt(2021, 1, 30).unwrap()];

        save_predictions(&path, &dates, &[31.5], &[30.123])?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "date,actual,predicted\n110/01/30,31.5,30.12\n"
        );
        Ok(())
    }
}
