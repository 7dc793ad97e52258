//! Stage 4: join market and weather features and cut season splits
//!
//! Market rows drive the join: every market date survives exactly once,
//! with weather features missing where no weather row exists. Seasons are
//! paired by their parsed season year, never by file order, and assigned to
//! train/valid/test as whole seasons in chronological order.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Result};
use crate::io::{file_label, reset_output_dir};
use crate::preprocess::tagged_files;
use crate::season::SeasonKind;
use crate::series::as_series;
use crate::stage::StageReport;
use crate::table::Frame;

pub const MERGE: &str = "merge";

/// Which split a season belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SplitRole {
    Train,
    Valid,
    Test,
}

impl SplitRole {
    pub const ALL: [SplitRole; 3] = [SplitRole::Train, SplitRole::Valid, SplitRole::Test];

    pub fn name(self) -> &'static str {
        match self {
            SplitRole::Train => "train",
            SplitRole::Valid => "valid",
            SplitRole::Test => "test",
        }
    }
}

impl fmt::Display for SplitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn split_name(role: SplitRole, crop: &str, suffix: &str) -> String {
    format!("{}_{}{}.csv", role.name(), crop, suffix)
}

/// Outcome of the merge stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub stage: StageReport,
    /// Season years per split, each in chronological order
    pub train: Vec<i32>,
    pub valid: Vec<i32>,
    pub test: Vec<i32>,
}

impl MergeReport {
    pub fn seasons(&self, role: SplitRole) -> &[i32] {
        match role {
            SplitRole::Train => &self.train,
            SplitRole::Valid => &self.valid,
            SplitRole::Test => &self.test,
        }
    }
}

/// Left join `weather` onto `market` by date.
///
/// Weather columns whose name collides with a market column are ignored.
pub fn left_join(market: &Frame, weather: &Frame) -> Frame {
    let rows: HashMap<NaiveDate, usize> = weather
        .dates()
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();
    let matched: Vec<Option<usize>> = market.dates().iter().map(|d| rows.get(d).copied()).collect();

    let mut out = market.clone();
    for column in weather.columns() {
        if market.has_column(&column.name) {
            warn!("[{}] weather column {} shadows a market column, ignored", MERGE, column.name);
            continue;
        }
        let values = matched
            .iter()
            .map(|row| row.and_then(|r| column.values[r]))
            .collect();
        out.push_column(column.name.clone(), values);
    }
    out
}

/// Day-of-week encodings; Monday is 0.
pub fn add_weekday_features(frame: &mut Frame) {
    let weekdays: Vec<u32> = frame
        .dates()
        .iter()
        .map(|d| d.weekday().num_days_from_monday())
        .collect();
    let flags = |pred: fn(u32) -> bool| -> Vec<u8> { weekdays.iter().map(|&w| pred(w) as u8).collect() };

    let weekend = flags(|w| w >= 5);
    let monday = flags(|w| w == 0);
    let friday = flags(|w| w == 4);

    frame.push_column("weekday", as_series(&weekdays));
    frame.push_column("is_weekend", as_series(&weekend));
    frame.push_column("is_mon", as_series(&monday));
    frame.push_column("is_fri", as_series(&friday));
}

/// Stack frames under a shared column list; absent columns become missing.
pub fn concat(frames: &[&Frame], columns: &[String]) -> Frame {
    let dates = frames.iter().flat_map(|f| f.dates().iter().copied()).collect();
    let mut out = Frame::new(dates);

    for name in columns {
        let values = frames
            .iter()
            .flat_map(|f| match f.column(name) {
                Some(values) => values.to_vec(),
                None => vec![None; f.len()],
            })
            .collect();
        out.push_column(name.clone(), values);
    }
    out
}

/// Column names across `frames` in first-seen order.
fn column_union(frames: &[&Frame]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for frame in frames {
        for name in frame.column_names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Assign chronologically ordered seasons to train/valid/test.
pub fn assign_splits(seasons: &[i32], valid: usize, test: usize) -> Result<BTreeMap<SplitRole, Vec<i32>>> {
    let required = valid + test + 1;
    if seasons.len() < required {
        return Err(PipelineError::InsufficientSeasons {
            required,
            found: seasons.len(),
        });
    }

    let train_end = seasons.len() - valid - test;
    let valid_end = seasons.len() - test;
    Ok(BTreeMap::from([
        (SplitRole::Train, seasons[..train_end].to_vec()),
        (SplitRole::Valid, seasons[train_end..valid_end].to_vec()),
        (SplitRole::Test, seasons[valid_end..].to_vec()),
    ]))
}

/// Merge every engineered season and write the three split tables.
pub fn merge(config: &PipelineConfig) -> Result<MergeReport> {
    let market_prefix = format!("features_market_{}_", config.crop);
    let weather_prefix = format!("features_weather_{}_", config.crop);
    let market_files = tagged_files(&config.paths.features_market_dir, &market_prefix, SeasonKind::Market)?;
    let weather_files = tagged_files(&config.paths.features_weather_dir, &weather_prefix, SeasonKind::Weather)?;

    let mut weather_by_year: BTreeMap<i32, PathBuf> = weather_files
        .into_iter()
        .map(|(window, path)| (window.season_year, path))
        .collect();

    let mut report = MergeReport {
        stage: StageReport::new(MERGE),
        ..MergeReport::default()
    };
    let mut merged: BTreeMap<i32, Frame> = BTreeMap::new();

    for (window, market_path) in &market_files {
        let label = file_label(market_path);
        let mut market = match Frame::read_csv(market_path) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[{}] {} failed: {}", MERGE, label, e);
                report.stage.skipped.push(label);
                continue;
            }
        };
        market.sort_by_date();

        let weather = match weather_by_year.remove(&window.season_year) {
            Some(weather_path) => match Frame::read_csv(&weather_path) {
                Ok(weather) => Some(weather),
                Err(e) => {
                    // Market drives the join: the season survives without weather.
                    let weather_label = file_label(&weather_path);
                    error!("[{}] {} failed: {}", MERGE, weather_label, e);
                    report.stage.skipped.push(weather_label);
                    None
                }
            },
            None => None,
        };

        let mut frame = match weather {
            Some(weather) => left_join(&market, &weather),
            None => {
                warn!(
                    "[{}] season {}: no weather features, weather columns left empty",
                    MERGE, window.season_year
                );
                market
            }
        };
        add_weekday_features(&mut frame);
        merged.insert(window.season_year, frame);
    }

    for (year, path) in &weather_by_year {
        warn!("[{}] season {}: {} has no market partner, ignored", MERGE, year, file_label(path));
    }

    let years: Vec<i32> = merged.keys().copied().collect();
    let splits = assign_splits(&years, config.split.valid_seasons, config.split.test_seasons)?;

    let all: Vec<&Frame> = merged.values().collect();
    let columns = column_union(&all);

    let out_dir = &config.paths.merged_dir;
    reset_output_dir(out_dir)?;

    for (role, seasons) in splits {
        let frames: Vec<&Frame> = seasons.iter().filter_map(|y| merged.get(y)).collect();
        let table = concat(&frames, &columns);

        let path = out_dir.join(split_name(role, &config.crop, &config.split.suffix));
        table.write_csv(&path)?;
        info!(
            "[{}] {}: seasons {:?}, {} row(s) -> {}",
            MERGE,
            role,
            seasons,
            table.len(),
            path.display()
        );
        report.stage.written.push(path);

        match role {
            SplitRole::Train => report.train = seasons,
            SplitRole::Valid => report.valid = seasons,
            SplitRole::Test => report.test = seasons,
        }
    }

    Ok(report)
}
