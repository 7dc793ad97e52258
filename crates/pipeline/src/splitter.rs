//! Stage 1: partition multi-year raw tables into season windows
//!
//! Market data arrives as one multi-year table per crop; weather data as one
//! table per station. Both are cut into fixed season windows, keeping every
//! source column untouched.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::calendar::{parse_local_era, parse_timestamp};
use crate::columns::find_column;
use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Result};
use crate::io::{file_label, list_csv_files, reset_output_dir};
use crate::season::{SeasonKind, SeasonWindow};
use crate::stage::{run_units, StageReport, UnitOutcome};
use crate::table::RawTable;

pub const SPLIT_MARKET: &str = "split-market";
pub const SPLIT_WEATHER: &str = "split-weather";

/// Output name for a market season.
pub fn market_split_name(crop: &str, window: &SeasonWindow) -> String {
    format!("market_{}_{}.csv", crop, window.tag())
}

/// Output name for one station's weather season.
pub fn weather_split_name(crop: &str, station: &str, window: &SeasonWindow) -> String {
    format!("weather_{}_{}_{}.csv", crop, station, window.tag())
}

/// Rows of `table` whose date falls in `window`, given `(row, date)` pairs
/// already sorted by date.
fn rows_in(dated: &[(usize, NaiveDate)], window: &SeasonWindow) -> Vec<usize> {
    dated
        .iter()
        .filter(|(_, d)| window.contains(*d))
        .map(|(r, _)| *r)
        .collect()
}

/// Split the raw market table into one file per configured season.
///
/// Fails if the input is absent or has no date column. Rows with
/// unparsable dates are dropped; seasons without rows are skipped.
pub fn split_market(config: &PipelineConfig) -> Result<StageReport> {
    let input = &config.paths.raw_market;
    if !input.is_file() {
        return Err(PipelineError::MissingInputDir(input.clone()));
    }
    let label = file_label(input);
    info!("[{}] reading {}", SPLIT_MARKET, input.display());

    let table = RawTable::read_csv(input, config.raw.header_rows)?;
    let date_col = find_column(&table.headers, &config.market.date_column).ok_or_else(|| {
        PipelineError::MissingColumn {
            file: label.clone(),
            role: "date".to_string(),
        }
    })?;

    let mut dated: Vec<(usize, NaiveDate)> = (0..table.len())
        .filter_map(|r| parse_local_era(table.cell(r, date_col)).map(|d| (r, d)))
        .collect();
    let dropped = table.len() - dated.len();
    if dropped > 0 {
        warn!("[{}] {}: dropped {} row(s) with unparsable dates", SPLIT_MARKET, label, dropped);
    }
    dated.sort_by_key(|(_, d)| *d);

    let out_dir = &config.paths.split_market_dir;
    reset_output_dir(out_dir)?;

    let seasons: Vec<(String, SeasonWindow)> = config
        .seasons()
        .into_iter()
        .map(|year| {
            let window = SeasonWindow::new(SeasonKind::Market, year);
            (window.tag(), window)
        })
        .collect();

    run_units(SPLIT_MARKET, config.parallel.enabled, seasons, |tag, window| {
        let rows = rows_in(&dated, window);
        if rows.is_empty() {
            return Ok(UnitOutcome::Skipped(format!(
                "no rows for season {} ({})",
                window.season_year, tag
            )));
        }

        let path = out_dir.join(market_split_name(&config.crop, window));
        table.select(&rows).write_csv(&path)?;
        info!("[{}] season {}: {} row(s)", SPLIT_MARKET, tag, rows.len());
        Ok(UnitOutcome::Written(vec![path]))
    })
}

/// Station identifier from a `{prefix}_{station}_{start}_{end}.csv` name.
///
/// Malformed names fall back to the second underscore part, or `unknown`.
pub fn station_id_from_filename(path: &Path, prefix: &str) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parts: Vec<&str> = stem.split('_').collect();

    if parts.len() < 4 || parts[0] != prefix {
        warn!(
            "[{}] unexpected filename {}, using best-effort station id",
            SPLIT_WEATHER,
            file_label(path)
        );
    }

    match parts.get(1) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Give every file a distinct station id; repeated ids get a `-n` suffix.
fn assign_station_ids(files: &[PathBuf], prefix: &str) -> Vec<(String, PathBuf)> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    files
        .iter()
        .map(|path| {
            let base = station_id_from_filename(path, prefix);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            let id = if *count == 1 {
                base
            } else {
                let id = format!("{}-{}", base, count);
                warn!(
                    "[{}] station id repeated by {}, writing as {}",
                    SPLIT_WEATHER,
                    file_label(path),
                    id
                );
                id
            };
            (id, path.clone())
        })
        .collect()
}

/// Split every station file into weather season windows.
///
/// A file without a time column aborts the stage; a file with any
/// unparsable timestamp is skipped.
pub fn split_weather(config: &PipelineConfig) -> Result<StageReport> {
    let files = list_csv_files(&config.paths.raw_weather_dir)?;
    let out_dir = &config.paths.split_weather_dir;
    reset_output_dir(out_dir)?;

    if files.is_empty() {
        warn!("[{}] no CSV files in {}", SPLIT_WEATHER, config.paths.raw_weather_dir.display());
        return Ok(StageReport::new(SPLIT_WEATHER));
    }

    let units: Vec<(String, (String, PathBuf))> = assign_station_ids(&files, &config.weather.station_prefix)
        .into_iter()
        .map(|(station, path)| (file_label(&path), (station, path)))
        .collect();

    run_units(SPLIT_WEATHER, config.parallel.enabled, units, |label, (station, path)| {
        split_station_file(config, label, station, path, out_dir)
    })
}

fn split_station_file(
    config: &PipelineConfig,
    label: &str,
    station: &str,
    path: &Path,
    out_dir: &Path,
) -> Result<UnitOutcome> {
    let table = RawTable::read_csv(path, 0)?;
    let time_col = find_column(&table.headers, &config.weather.time_column).ok_or_else(|| {
        PipelineError::NoTimeColumn {
            file: label.to_string(),
            keywords: config.weather.time_column.keywords(),
        }
    })?;

    let mut dated = Vec::with_capacity(table.len());
    for r in 0..table.len() {
        let cell = table.cell(r, time_col);
        match parse_timestamp(cell) {
            Some(date) => dated.push((r, date)),
            None => {
                return Err(PipelineError::UnparsableDates {
                    file: label.to_string(),
                    detail: format!("row {}: '{}'", r + 1, cell),
                })
            }
        }
    }
    dated.sort_by_key(|(_, d)| *d);

    let mut written = Vec::new();
    for year in config.seasons() {
        let window = SeasonWindow::new(SeasonKind::Weather, year);
        let rows = rows_in(&dated, &window);
        if rows.is_empty() {
            continue;
        }

        let target = out_dir.join(weather_split_name(&config.crop, station, &window));
        table.select(&rows).write_csv(&target)?;
        written.push(target);
    }

    if written.is_empty() {
        return Ok(UnitOutcome::Skipped("no rows inside any season".to_string()));
    }
    Ok(UnitOutcome::Written(written))
}
