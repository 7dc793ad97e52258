//! Training over merged split tables written to disk.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use vegcast_pipeline::Frame;
use vegcast_trainer::{artifacts, train_crop, ArtifactPaths, TrainJob, TrainingParams};

/// One season of daily prices driven by yesterday's price and a weather
/// signal, with the weather column missing every seventh day.
fn season(year: i32, level: f64) -> Frame {
    let start = NaiveDate::from_ymd_opt(year, 11, 1).unwrap();
    let n = 92;
    let dates = (0..n).map(|i| start + Duration::days(i)).collect();

    let signal: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
    let price: Vec<f64> = signal.iter().map(|s| level + 2.0 * s).collect();

    let mut frame = Frame::new(dates);
    frame.push_column("avg_price", price.iter().copied().map(Some).collect());
    frame.push_column(
        "temp_mean_lag1d",
        signal
            .iter()
            .enumerate()
            .map(|(i, s)| if i % 7 == 3 { None } else { Some(*s) })
            .collect(),
    );
    frame.push_column("weekday", (0..n).map(|i| Some((i % 7) as f64)).collect());
    frame
}

fn write_splits(dir: &Path) -> Result<TrainJob> {
    let job = TrainJob {
        crop: "kai-lan".to_string(),
        train: dir.join("train.csv"),
        valid: dir.join("valid.csv"),
        test: dir.join("test.csv"),
        output_dir: dir.join("models"),
    };
    season(2018, 20.0).write_csv(&job.train)?;
    season(2019, 21.0).write_csv(&job.valid)?;
    season(2020, 22.0).write_csv(&job.test)?;
    Ok(job)
}

fn params() -> TrainingParams {
    TrainingParams {
        num_trees: 60,
        max_depth: 3,
        min_samples_leaf: 3,
        learning_rate: 0.2,
        max_thresholds: 32,
        early_stopping_rounds: 10,
    }
}

#[test]
fn test_train_crop_writes_all_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let job = write_splits(dir.path())?;

    let report = train_crop(&job, params())?;
    let paths = ArtifactPaths::new(&job.output_dir, "kai-lan");
    assert_eq!(report.paths, paths);

    for path in [&paths.model, &paths.hash, &paths.predictions, &paths.metrics] {
        assert!(path.is_file(), "{} missing", path.display());
    }
    assert_eq!(fs::read_to_string(&paths.hash)?, report.model_hash);

    let predictions = fs::read_to_string(&paths.predictions)?;
    let mut lines = predictions.lines();
    assert_eq!(lines.next(), Some("date,actual,predicted"));
    assert_eq!(lines.next().map(|l| l.starts_with("109/11/01,")), Some(true));
    assert_eq!(predictions.lines().count(), 93);

    // The price is mostly explained by the weather signal.
    assert!(report.test.rmse < 5.0, "rmse {}", report.test.rmse);

    let metrics: serde_json::Value = serde_json::from_str(&fs::read_to_string(&paths.metrics)?)?;
    assert_eq!(metrics["crop"], "kai-lan");
    assert_eq!(metrics["test"]["rows"], 92);

    let model = artifacts::load_model(&paths)?;
    assert_eq!(model.feature_names, vec!["temp_mean_lag1d", "weekday"]);
    assert_eq!(model.target, "avg_price");
    Ok(())
}

#[test]
fn test_cross_run_determinism() -> Result<()> {
    let mut hashes = Vec::new();
    for _ in 0..3 {
        let dir = tempdir()?;
        let job = write_splits(dir.path())?;
        hashes.push(train_crop(&job, params())?.model_hash);
    }
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}

#[test]
fn test_reports_features_never_seen_in_train() -> Result<()> {
    let dir = tempdir()?;
    let job = write_splits(dir.path())?;

    let mut train = season(2018, 20.0);
    train.push_column("gust_max_lag1d", vec![None; train.len()]);
    train.write_csv(&job.train)?;

    let report = train_crop(&job, params())?;
    assert_eq!(report.empty_features, vec!["gust_max_lag1d".to_string()]);

    let clean_dir = tempdir()?;
    let clean = train_crop(&write_splits(clean_dir.path())?, params())?;
    assert!(clean.empty_features.is_empty());
    Ok(())
}

#[test]
fn test_missing_split_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let job = write_splits(dir.path())?;
    fs::remove_file(&job.test)?;

    assert!(train_crop(&job, params()).is_err());
    Ok(())
}
