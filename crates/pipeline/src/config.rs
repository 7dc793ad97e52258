//! Pipeline configuration
//!
//! A single immutable [`PipelineConfig`] is loaded once and passed by
//! reference into every stage, so each stage is a pure function of its
//! input files and this value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::columns::KeywordMatch;
use crate::errors::{PipelineError, Result};
use crate::schema::WeatherField;

/// Complete configuration for stages 1-4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Crop label embedded in every artifact filename
    pub crop: String,
    /// Gregorian years in which the seasons to build start
    pub season_years: Vec<i32>,
    /// Input and output locations
    pub paths: PathsConfig,
    /// Raw market table layout
    pub raw: RawConfig,
    /// Market column roles and features
    pub market: MarketConfig,
    /// Weather column roles, features and thresholds
    pub weather: WeatherConfig,
    /// Train/validation/test partitioning
    pub split: SplitConfig,
    /// Per-file fan-out inside a stage
    pub parallel: ParallelConfig,
}

/// Directory layout. Every stage owns exactly one output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Multi-year raw market table (CSV)
    pub raw_market: PathBuf,
    /// Directory of per-station raw weather tables
    pub raw_weather_dir: PathBuf,
    pub split_market_dir: PathBuf,
    pub split_weather_dir: PathBuf,
    pub preprocessed_market_dir: PathBuf,
    pub preprocessed_weather_dir: PathBuf,
    pub features_market_dir: PathBuf,
    pub features_weather_dir: PathBuf,
    pub merged_dir: PathBuf,
}

/// Raw market table layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Banner lines above the header row
    pub header_rows: usize,
}

/// Market column matchers and feature windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub date_column: KeywordMatch,
    pub avg_price_column: KeywordMatch,
    pub high_price_column: KeywordMatch,
    pub mid_price_column: KeywordMatch,
    pub low_price_column: KeywordMatch,
    pub volume_column: KeywordMatch,
    /// Lag offsets, in rows of the date-sorted daily table
    pub lags: Vec<usize>,
    /// Trailing moving-average widths over the one-day-shifted series
    pub ma_windows: Vec<usize>,
}

/// Weather column matchers, cleaning bounds and feature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub time_column: KeywordMatch,
    /// Expected first part of `{prefix}_{station}_{...}_{...}.csv` names
    pub station_prefix: String,
    /// Exact source header per field
    pub headers: WeatherHeaders,
    /// Temperatures below this are treated as instrument faults
    pub temp_floor: f64,
    pub lags: Vec<usize>,
    pub roll_windows: Vec<usize>,
    pub thresholds: WeatherThresholds,
    pub winter_months: Vec<u32>,
}

/// Source header for each of the eight weather fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherHeaders {
    pub temp_mean: String,
    pub temp_max: String,
    pub temp_min: String,
    pub precip_mm: String,
    pub precip_hours: String,
    pub sunshine_hours: String,
    pub humidity_pct: String,
    pub gust_max: String,
}

impl WeatherHeaders {
    pub fn header(&self, field: WeatherField) -> &str {
        match field {
            WeatherField::TempMean => &self.temp_mean,
            WeatherField::TempMax => &self.temp_max,
            WeatherField::TempMin => &self.temp_min,
            WeatherField::PrecipMm => &self.precip_mm,
            WeatherField::PrecipHours => &self.precip_hours,
            WeatherField::SunshineHours => &self.sunshine_hours,
            WeatherField::HumidityPct => &self.humidity_pct,
            WeatherField::GustMax => &self.gust_max,
        }
    }
}

/// Extreme-event thresholds, applied to the previous day's readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherThresholds {
    /// Minimum temperature at or below which a cold wave is flagged (℃)
    pub cold_wave: f64,
    pub strong_cold: f64,
    pub frost_temp: f64,
    /// Frost also requires sunshine strictly below this (hours)
    pub frost_sunshine: f64,
    /// Gust at or above which strong wind is flagged (m/s)
    pub strong_wind: f64,
    /// Precipitation at or above which heavy rain is flagged (mm)
    pub heavy_rain: f64,
}

/// Season-level partitioning of the merged table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub valid_seasons: usize,
    pub test_seasons: usize,
    /// Appended to `{train,valid,test}_{crop}` in merged filenames
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crop: "kai-lan".to_string(),
            season_years: (2018..=2024).collect(),
            paths: PathsConfig::default(),
            raw: RawConfig::default(),
            market: MarketConfig::default(),
            weather: WeatherConfig::default(),
            split: SplitConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under("dataset")
    }
}

impl PathsConfig {
    /// Standard layout rooted at `root`.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            raw_market: root.join("raw_data/market/market.csv"),
            raw_weather_dir: root.join("raw_data/weather"),
            split_market_dir: root.join("raw_data/split_market"),
            split_weather_dir: root.join("raw_data/split_weather"),
            preprocessed_market_dir: root.join("processed_data/preprocessing/market"),
            preprocessed_weather_dir: root.join("processed_data/preprocessing/weather"),
            features_market_dir: root.join("processed_data/feature_engineering/market"),
            features_weather_dir: root.join("processed_data/feature_engineering/weather"),
            merged_dir: root.join("processed_data/merged"),
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self { header_rows: 0 }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            date_column: KeywordMatch::all_of(&["日", "期"]),
            avg_price_column: KeywordMatch::all_of(&["平均價"]),
            high_price_column: KeywordMatch::all_of(&["上價"]),
            mid_price_column: KeywordMatch::all_of(&["中價"]),
            low_price_column: KeywordMatch::all_of(&["下價"]),
            volume_column: KeywordMatch::all_of(&["交易量"]),
            lags: vec![1, 7, 14],
            ma_windows: vec![3, 7],
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            time_column: KeywordMatch::any_of(&["觀測時間", "日期", "Date", "Time"]),
            station_prefix: "daily".to_string(),
            headers: WeatherHeaders::default(),
            temp_floor: -5.0,
            lags: vec![1],
            roll_windows: vec![3, 7, 15, 30],
            thresholds: WeatherThresholds::default(),
            winter_months: vec![11, 12, 1, 2],
        }
    }
}

impl Default for WeatherHeaders {
    fn default() -> Self {
        Self {
            temp_mean: WeatherField::TempMean.default_header().to_string(),
            temp_max: WeatherField::TempMax.default_header().to_string(),
            temp_min: WeatherField::TempMin.default_header().to_string(),
            precip_mm: WeatherField::PrecipMm.default_header().to_string(),
            precip_hours: WeatherField::PrecipHours.default_header().to_string(),
            sunshine_hours: WeatherField::SunshineHours.default_header().to_string(),
            humidity_pct: WeatherField::HumidityPct.default_header().to_string(),
            gust_max: WeatherField::GustMax.default_header().to_string(),
        }
    }
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            cold_wave: 10.0,
            strong_cold: 7.0,
            frost_temp: 5.0,
            frost_sunshine: 1.0,
            strong_wind: 15.0,
            heavy_rain: 50.0,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            valid_seasons: 1,
            test_seasons: 1,
            suffix: "_after_engineering".to_string(),
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("failed to parse config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Rebase every path onto `root`.
    pub fn with_data_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.paths = PathsConfig::under(root);
        self
    }

    /// Seasons needed for one training season plus validation and test.
    pub fn min_seasons(&self) -> usize {
        self.split.valid_seasons + self.split.test_seasons + 1
    }

    /// Check the configuration. Unusable values are errors; suspicious
    /// ones are returned as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.crop.trim().is_empty() {
            return Err(PipelineError::Config("crop name is empty".to_string()));
        }
        if self.crop.contains(['/', '\\']) {
            return Err(PipelineError::Config(format!(
                "crop name '{}' contains a path separator",
                self.crop
            )));
        }
        if self.season_years.is_empty() {
            return Err(PipelineError::Config("season_years is empty".to_string()));
        }

        let windows = [
            ("market.lags", &self.market.lags),
            ("market.ma_windows", &self.market.ma_windows),
            ("weather.lags", &self.weather.lags),
            ("weather.roll_windows", &self.weather.roll_windows),
        ];
        for (name, values) in windows {
            if values.contains(&0) {
                return Err(PipelineError::Config(format!(
                    "{} must not contain 0: a zero offset leaks same-day values",
                    name
                )));
            }
        }

        if let Some(month) = self.weather.winter_months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(PipelineError::Config(format!("invalid winter month {}", month)));
        }

        let mut warnings = Vec::new();

        let mut sorted = self.season_years.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.season_years.len() {
            warnings.push("season_years contains duplicates".to_string());
        }
        if sorted.len() < self.min_seasons() {
            warnings.push(format!(
                "{} seasons configured but the split needs at least {}",
                sorted.len(),
                self.min_seasons()
            ));
        }
        if self.market.lags.is_empty() && self.market.ma_windows.is_empty() {
            warnings.push("market feature windows are empty".to_string());
        }

        if !warnings.is_empty() {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }

    /// Configured seasons in chronological order, without duplicates.
    pub fn seasons(&self) -> Vec<i32> {
        let mut years = self.season_years.clone();
        years.sort_unstable();
        years.dedup();
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.market.lags, vec![1, 7, 14]);
        assert_eq!(config.weather.roll_windows, vec![3, 7, 15, 30]);
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = PipelineConfig::default();
        config.weather.roll_windows.push(0);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            crop = "spinach"
            season_years = [2021, 2022, 2023]

            [market]
            date_column = { all_of = ["Date"] }
            avg_price_column = { any_of = ["Avg", "Mean"] }
            high_price_column = { exact = "High" }
            mid_price_column = { exact = "Mid" }
            low_price_column = { exact = "Low" }
            volume_column = { exact = "Volume" }
            lags = [1, 2]
            ma_windows = [3]
            "#,
        )
        .unwrap();

        assert_eq!(config.crop, "spinach");
        assert_eq!(config.market.lags, vec![1, 2]);
        assert!(config.market.avg_price_column.matches("Mean price"));
        assert_eq!(config.weather.temp_floor, -5.0);
        assert_eq!(config.split.suffix, "_after_engineering");
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("vegcast.toml");

        let config = PipelineConfig::default().with_data_root("/data/veg");
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let loaded = PipelineConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(loaded.season_years, config.season_years);
        assert_eq!(loaded.paths.merged_dir, PathBuf::from("/data/veg/processed_data/merged"));
        assert_eq!(loaded.weather.headers.temp_min, "最低氣溫(℃)");
    }

    #[test]
    fn test_too_few_seasons_warns() {
        let config = PipelineConfig {
            season_years: vec![2022, 2023],
            ..PipelineConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }
}
