//! Stage 2: collapse season windows into one row per calendar date
//!
//! Market: several markets report the same day, so same-day entries are
//! averaged. Weather: several stations report the same day, so readings are
//! averaged across stations, ignoring stations that are missing a value.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::calendar::{parse_local_era_slashed, parse_timestamp};
use crate::columns::{find_column, resolve_columns, ColumnRole};
use crate::config::{PipelineConfig, WeatherConfig};
use crate::errors::{PipelineError, Result};
use crate::io::{file_label, list_csv_files, reset_output_dir};
use crate::schema::{FieldKind, MarketColumn, WeatherField};
use crate::season::{SeasonKind, SeasonWindow};
use crate::series::difference;
use crate::stage::{run_units, StageReport, UnitOutcome};
use crate::table::{parse_number, Frame, RawTable};

pub const PREPROCESS_MARKET: &str = "preprocess-market";
pub const PREPROCESS_WEATHER: &str = "preprocess-weather";

pub fn market_daily_name(crop: &str, window: &SeasonWindow) -> String {
    format!("daily_market_{}_{}.csv", crop, window.tag())
}

pub fn weather_daily_name(crop: &str, window: &SeasonWindow) -> String {
    format!("daily_weather_{}_{}.csv", crop, window.tag())
}

/// Running mean that ignores missing values.
#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Per-date means of a fixed number of columns.
struct DailyMeans {
    width: usize,
    days: BTreeMap<NaiveDate, Vec<Mean>>,
}

impl DailyMeans {
    fn new(width: usize) -> Self {
        Self {
            width,
            days: BTreeMap::new(),
        }
    }

    fn add(&mut self, date: NaiveDate, values: &[Option<f64>]) {
        let width = self.width;
        let slots = self
            .days
            .entry(date)
            .or_insert_with(|| vec![Mean::default(); width]);
        for (slot, value) in slots.iter_mut().zip(values) {
            slot.add(*value);
        }
    }

    /// One row per date, ascending.
    fn into_frame(self, names: &[&str]) -> Frame {
        let dates: Vec<NaiveDate> = self.days.keys().copied().collect();
        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(dates.len()); self.width];
        for means in self.days.values() {
            for (column, mean) in columns.iter_mut().zip(means) {
                column.push(mean.value());
            }
        }

        let mut frame = Frame::new(dates);
        for (name, values) in names.iter().zip(columns) {
            frame.push_column(*name, values);
        }
        frame
    }
}

/// Clean one season of raw market rows into a daily table.
pub fn preprocess_market_table(table: &RawTable, config: &PipelineConfig, file: &str) -> Result<Frame> {
    let market = &config.market;
    let roles = [
        ColumnRole::required("date", &market.date_column),
        ColumnRole::required(MarketColumn::AvgPrice.name(), &market.avg_price_column),
        ColumnRole::optional(MarketColumn::HighPrice.name(), &market.high_price_column),
        ColumnRole::optional(MarketColumn::MidPrice.name(), &market.mid_price_column),
        ColumnRole::optional(MarketColumn::LowPrice.name(), &market.low_price_column),
        ColumnRole::optional(MarketColumn::Volume.name(), &market.volume_column),
    ];
    let resolved = resolve_columns(&table.headers, &roles, file)?;

    let date_col = resolved.get("date").unwrap_or_default();
    let numeric: Vec<(&str, usize)> = resolved.present().filter(|(role, _)| *role != "date").collect();
    let names: Vec<&str> = numeric.iter().map(|(name, _)| *name).collect();

    let mut daily = DailyMeans::new(numeric.len());
    let mut dropped = 0usize;
    for r in 0..table.len() {
        let values: Vec<Option<f64>> = numeric.iter().map(|(_, c)| parse_number(table.cell(r, *c))).collect();

        // Column 0 of `numeric` is the average price.
        let date = parse_local_era_slashed(table.cell(r, date_col));
        match (date, values[0]) {
            (Some(date), Some(_)) => daily.add(date, &values),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("{}: dropped {} row(s) without a date or average price", file, dropped);
    }

    let mut frame = daily.into_frame(&names);
    if frame.is_empty() {
        return Err(PipelineError::EmptyTable {
            file: file.to_string(),
        });
    }

    let high = frame.column(MarketColumn::HighPrice.name()).map(<[_]>::to_vec);
    let low = frame.column(MarketColumn::LowPrice.name()).map(<[_]>::to_vec);
    if let (Some(high), Some(low)) = (high, low) {
        frame.push_column(MarketColumn::PriceSpread.name(), difference(&high, &low));
    }

    Ok(frame)
}

/// Season-tagged files in `dir` whose name starts with `prefix`.
pub(crate) fn tagged_files(dir: &Path, prefix: &str, kind: SeasonKind) -> Result<Vec<(SeasonWindow, PathBuf)>> {
    let mut tagged = Vec::new();
    for path in list_csv_files(dir)? {
        let name = file_label(&path);
        if !name.starts_with(prefix) {
            continue;
        }
        match SeasonWindow::parse_tag_in(kind, &name) {
            Some(window) => tagged.push((window, path)),
            None => warn!("{}: no season tag in filename, ignored", name),
        }
    }
    tagged.sort();
    Ok(tagged)
}

/// Preprocess every split market season.
pub fn preprocess_market(config: &PipelineConfig) -> Result<StageReport> {
    let prefix = format!("market_{}_", config.crop);
    let files = tagged_files(&config.paths.split_market_dir, &prefix, SeasonKind::Market)?;
    let out_dir = &config.paths.preprocessed_market_dir;
    reset_output_dir(out_dir)?;

    let units = files
        .into_iter()
        .map(|(window, path)| (file_label(&path), (window, path)))
        .collect();

    run_units(PREPROCESS_MARKET, config.parallel.enabled, units, |label, (window, path)| {
        let table = RawTable::read_csv(path, 0)?;
        let frame = preprocess_market_table(&table, config, label)?;

        let target = out_dir.join(market_daily_name(&config.crop, window));
        frame.write_csv(&target)?;
        Ok(UnitOutcome::Written(vec![target]))
    })
}

/// Drop physically impossible readings rather than clipping them.
pub fn clean_reading(field: WeatherField, value: Option<f64>, temp_floor: f64) -> Option<f64> {
    let value = value?;
    let valid = match field.kind() {
        FieldKind::Temperature => value >= temp_floor,
        FieldKind::NonNegative => value >= 0.0,
    };
    valid.then_some(value)
}

/// Add one station table's readings into the season's daily means.
///
/// Returns `Ok(false)` when the table has no parsable timestamp at all.
fn accumulate_station(
    table: &RawTable,
    weather: &WeatherConfig,
    file: &str,
    daily: &mut DailyMeans,
) -> Result<bool> {
    let time_col = find_column(&table.headers, &weather.time_column).ok_or_else(|| {
        PipelineError::NoTimeColumn {
            file: file.to_string(),
            keywords: weather.time_column.keywords(),
        }
    })?;

    let field_cols: Vec<Option<usize>> = WeatherField::ALL
        .iter()
        .map(|field| {
            let header = weather.headers.header(*field);
            let col = table.headers.iter().position(|h| h == header);
            if col.is_none() {
                debug!("{}: no '{}' column, treated as missing", file, header);
            }
            col
        })
        .collect();

    let dates: Vec<Option<NaiveDate>> = (0..table.len())
        .map(|r| parse_timestamp(table.cell(r, time_col)))
        .collect();
    if dates.iter().all(Option::is_none) {
        return Ok(false);
    }

    for (r, date) in dates.iter().enumerate() {
        let Some(date) = date else { continue };
        let values: Vec<Option<f64>> = WeatherField::ALL
            .iter()
            .zip(&field_cols)
            .map(|(field, col)| {
                let raw = col.and_then(|c| parse_number(table.cell(r, c)));
                clean_reading(*field, raw, weather.temp_floor)
            })
            .collect();
        daily.add(*date, &values);
    }

    Ok(true)
}

/// Average one season's station tables into a single daily table.
pub fn preprocess_weather_season(files: &[PathBuf], weather: &WeatherConfig) -> Result<Option<Frame>> {
    let mut daily = DailyMeans::new(WeatherField::ALL.len());
    let mut contributing = 0usize;

    for path in files {
        let label = file_label(path);
        let table = match RawTable::read_csv(path, 0) {
            Ok(table) => table,
            Err(e) => {
                error!("{}: unreadable, skipped: {}", label, e);
                continue;
            }
        };
        if accumulate_station(&table, weather, &label, &mut daily)? {
            contributing += 1;
        } else {
            error!("{}: no timestamp could be parsed, skipped", label);
        }
    }

    if contributing == 0 {
        return Ok(None);
    }

    let names: Vec<&str> = WeatherField::ALL.iter().map(|f| f.name()).collect();
    Ok(Some(daily.into_frame(&names)))
}

/// Preprocess every season of split weather files.
pub fn preprocess_weather(config: &PipelineConfig) -> Result<StageReport> {
    let prefix = format!("weather_{}_", config.crop);
    let files = tagged_files(&config.paths.split_weather_dir, &prefix, SeasonKind::Weather)?;
    let out_dir = &config.paths.preprocessed_weather_dir;
    reset_output_dir(out_dir)?;

    let mut groups: BTreeMap<SeasonWindow, Vec<PathBuf>> = BTreeMap::new();
    for (window, path) in files {
        groups.entry(window).or_default().push(path);
    }
    if groups.is_empty() {
        warn!("[{}] no season-tagged weather files found", PREPROCESS_WEATHER);
    }

    let units = groups
        .into_iter()
        .map(|(window, paths)| (window.tag(), (window, paths)))
        .collect();

    run_units(PREPROCESS_WEATHER, config.parallel.enabled, units, |_, (window, paths)| {
        match preprocess_weather_season(paths, &config.weather)? {
            Some(frame) => {
                let target = out_dir.join(weather_daily_name(&config.crop, window));
                frame.write_csv(&target)?;
                Ok(UnitOutcome::Written(vec![target]))
            }
            None => Ok(UnitOutcome::Skipped(format!(
                "none of {} station file(s) had usable timestamps",
                paths.len()
            ))),
        }
    })
}
