//! Merged split tables as training data
//!
//! Every column other than the date and the target is a feature. Missing
//! feature cells stay missing; rows without a target are dropped.

use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, warn};

use vegcast_pipeline::Frame;

use crate::errors::{Result, TrainerError};

/// Feature matrix with its target and row dates.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<Option<f64>>>,
    pub targets: Vec<f64>,
    pub dates: Vec<NaiveDate>,
}

/// Range and coverage of a single feature.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureStats {
    pub name: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub missing: usize,
}

impl Dataset {
    /// Build from a frame, using the frame's own columns as features.
    pub fn from_frame(frame: &Frame, target: &str) -> Result<Self> {
        let names: Vec<String> = frame
            .column_names()
            .into_iter()
            .filter(|n| *n != target)
            .map(str::to_string)
            .collect();
        Self::from_frame_with(frame, target, &names)
    }

    /// Build from a frame with a fixed feature list. Features the frame
    /// lacks are entirely missing.
    pub fn from_frame_with(frame: &Frame, target: &str, feature_names: &[String]) -> Result<Self> {
        let target_values = frame
            .column(target)
            .ok_or_else(|| TrainerError::Dataset(format!("no target column '{}'", target)))?;

        let columns: Vec<Option<&[Option<f64>]>> = feature_names.iter().map(|n| frame.column(n)).collect();
        for (name, column) in feature_names.iter().zip(&columns) {
            if column.is_none() {
                debug!("feature {} absent, treated as missing", name);
            }
        }

        let mut dataset = Dataset {
            feature_names: feature_names.to_vec(),
            features: Vec::with_capacity(frame.len()),
            targets: Vec::with_capacity(frame.len()),
            dates: Vec::with_capacity(frame.len()),
        };

        let mut dropped = 0;
        for (row, date) in frame.dates().iter().enumerate() {
            let Some(value) = target_values[row] else {
                dropped += 1;
                continue;
            };
            dataset
                .features
                .push(columns.iter().map(|c| c.and_then(|values| values[row])).collect());
            dataset.targets.push(value);
            dataset.dates.push(*date);
        }
        if dropped > 0 {
            warn!("dropped {} row(s) without a target", dropped);
        }

        Ok(dataset)
    }

    /// Load a merged split table.
    pub fn from_csv<P: AsRef<Path>>(path: P, target: &str) -> Result<Self> {
        let frame = Frame::read_csv(path.as_ref())?;
        Self::from_frame(&frame, target)
    }

    /// Load a merged split table with the feature list of another split.
    pub fn from_csv_with<P: AsRef<Path>>(path: P, target: &str, feature_names: &[String]) -> Result<Self> {
        let frame = Frame::read_csv(path.as_ref())?;
        Self::from_frame_with(&frame, target, feature_names)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_stats(&self) -> Vec<FeatureStats> {
        self.feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut stats = FeatureStats {
                    name: name.clone(),
                    min: None,
                    max: None,
                    missing: 0,
                };
                for row in &self.features {
                    match row[i] {
                        Some(v) => {
                            stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
                            stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
                        }
                        None => stats.missing += 1,
                    }
                }
                stats
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        let dates = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2018, 11, d).unwrap())
            .collect();
        let mut frame = Frame::new(dates);
        frame.push_column("avg_price_lag1", vec![None, Some(30.0), Some(31.0)]);
        frame.push_column("avg_price", vec![Some(30.0), None, Some(32.0)]);
        frame.push_column("weekday", vec![Some(3.0), Some(4.0), Some(5.0)]);
        frame
    }

    #[test]
    fn test_from_frame_drops_rows_without_target() -> Result<()> {
        let dataset = Dataset::from_frame(&frame(), "avg_price")?;

        assert_eq!(dataset.feature_names, vec!["avg_price_lag1", "weekday"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.features[0], vec![None, Some(3.0)]);
        assert_eq!(dataset.targets, vec![30.0, 32.0]);
        assert_eq!(dataset.dates[1], NaiveDate::from_ymd_opt(2018, 11, 3).unwrap());
        Ok(())
    }

    #[test]
    fn test_fixed_feature_list_fills_absent_columns() -> Result<()> {
        let names = vec!["weekday".to_string(), "temp_mean_lag1d".to_string()];
        let dataset = Dataset::from_frame_with(&frame(), "avg_price", &names)?;
        assert_eq!(dataset.features[1], vec![Some(5.0), None]);
        Ok(())
    }

    #[test]
    fn test_missing_target_column() {
        assert!(Dataset::from_frame(&frame(), "price").is_err());
    }

    #[test]
    fn test_feature_stats() -> Result<()> {
        let dataset = Dataset::from_frame(&frame(), "avg_price")?;
        let stats = dataset.feature_stats();

        assert_eq!(stats[0].min, Some(31.0));
        assert_eq!(stats[0].missing, 1);
        assert_eq!(stats[1].min, Some(3.0));
        assert_eq!(stats[1].max, Some(5.0));
        Ok(())
    }
}
