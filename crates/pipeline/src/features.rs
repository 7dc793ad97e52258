//! Stage 3: leakage-free feature engineering
//!
//! Every derived value at row `t` is computed from rows strictly before `t`:
//! lags shift by at least one row and rolling windows run over the
//! one-row-shifted series. The only same-row inputs are the date itself
//! (calendar encodings) and the target, which is carried as the label.

use chrono::Datelike;
use std::f64::consts::PI;

use crate::config::{MarketConfig, PipelineConfig, WeatherConfig};
use crate::errors::{PipelineError, Result};
use crate::io::reset_output_dir;
use crate::preprocess::tagged_files;
use crate::schema::{MarketColumn, RollStyle, WeatherField, TARGET};
use crate::season::{SeasonKind, SeasonWindow};
use crate::series::{as_series, difference, flag, flag_and, rolling, run_length, shift, Agg, Series};
use crate::stage::{run_units, StageReport, UnitOutcome};
use crate::table::Frame;

pub const ENGINEER_MARKET: &str = "engineer-market";
pub const ENGINEER_WEATHER: &str = "engineer-weather";

pub fn market_features_name(crop: &str, window: &SeasonWindow) -> String {
    format!("features_market_{}_{}.csv", crop, window.tag())
}

pub fn weather_features_name(crop: &str, window: &SeasonWindow) -> String {
    format!("features_weather_{}_{}.csv", crop, window.tag())
}

/// Derive market history features and drop same-day market outcomes.
///
/// The input must be sorted by date. The target column is kept as the
/// label; only its lags are features.
pub fn market_features(daily: &Frame, config: &MarketConfig) -> Result<Frame> {
    let target = daily
        .column(TARGET)
        .ok_or_else(|| PipelineError::MissingColumn {
            file: "daily market table".to_string(),
            role: TARGET.to_string(),
        })?
        .to_vec();

    let mut out = daily.clone();

    for column in MarketColumn::STRUCTURE {
        let Some(values) = daily.column(column.name()) else {
            continue;
        };

        for &lag in &config.lags {
            out.push_column(format!("{}_lag{}", column.name(), lag), shift(values, lag));
        }

        let previous = shift(values, 1);
        for &window in &config.ma_windows {
            out.push_column(
                format!("{}_ma{}", column.name(), window),
                rolling(&previous, window, Agg::Mean),
            );
        }
    }

    for &lag in &config.lags {
        out.push_column(format!("{}_lag{}", TARGET, lag), shift(&target, lag));
    }

    let same_day: Vec<&str> = MarketColumn::STRUCTURE.iter().map(|c| c.name()).collect();
    out.drop_columns(&same_day);
    Ok(out)
}

/// Month number, its position on a 12-point circle and the winter flag.
fn calendar_features(daily: &Frame, config: &WeatherConfig, out: &mut Frame) {
    let months: Vec<u32> = daily.dates().iter().map(|d| d.month()).collect();
    let angle = |m: u32| 2.0 * PI * f64::from(m) / 12.0;

    out.push_column("month", as_series(&months));
    out.push_column("month_sin", months.iter().map(|&m| Some(angle(m).sin())).collect());
    out.push_column("month_cos", months.iter().map(|&m| Some(angle(m).cos())).collect());

    let winter: Vec<u8> = months
        .iter()
        .map(|m| config.winter_months.contains(m) as u8)
        .collect();
    out.push_column("is_winter", as_series(&winter));
}

/// Derive weather features from a daily weather table sorted by date.
///
/// Same-day readings never appear in the output.
pub fn weather_features(daily: &Frame, config: &WeatherConfig) -> Frame {
    let missing: Series = vec![None; daily.len()];
    let field = |f: WeatherField| -> Series {
        daily
            .column(f.name())
            .map(<[_]>::to_vec)
            .unwrap_or_else(|| missing.clone())
    };

    let mut out = Frame::new(daily.dates().to_vec());

    for &lag in &config.lags {
        for f in WeatherField::ALL {
            out.push_column(format!("{}_lag{}d", f.name(), lag), shift(&field(f), lag));
        }
    }

    for style in [RollStyle::Level, RollStyle::Accumulation] {
        let aggs: &[Agg] = match style {
            RollStyle::Level => &[Agg::Mean, Agg::Max, Agg::Min],
            RollStyle::Accumulation => &[Agg::Sum],
        };
        for f in WeatherField::ALL.into_iter().filter(|f| f.roll_style() == style) {
            let previous = shift(&field(f), 1);
            for &window in &config.roll_windows {
                for &agg in aggs {
                    out.push_column(
                        format!("{}_roll{}_{}d_prev", f.name(), agg.label(), window),
                        rolling(&previous, window, agg),
                    );
                }
            }
        }
    }

    let t = &config.thresholds;
    let min_prev = shift(&field(WeatherField::TempMin), 1);
    let sun_prev = shift(&field(WeatherField::SunshineHours), 1);
    let gust_prev = shift(&field(WeatherField::GustMax), 1);
    let rain_prev = shift(&field(WeatherField::PrecipMm), 1);

    let range = difference(&field(WeatherField::TempMax), &field(WeatherField::TempMin));
    out.push_column("daily_temp_range_prev", shift(&range, 1));

    let cold = flag(&min_prev, |v| v <= t.cold_wave);
    let strong_cold = flag(&min_prev, |v| v <= t.strong_cold);
    let frost = flag_and(
        &flag(&min_prev, |v| v <= t.frost_temp),
        &flag(&sun_prev, |v| v < t.frost_sunshine),
    );
    let wind = flag(&gust_prev, |v| v >= t.strong_wind);
    let heavy_rain = flag(&rain_prev, |v| v >= t.heavy_rain);
    let rainy = flag(&rain_prev, |v| v > 0.0);

    out.push_column("is_cold_wave_prev", as_series(&cold));
    out.push_column("is_strong_cold_prev", as_series(&strong_cold));
    out.push_column("is_frost_risk_prev", as_series(&frost));
    out.push_column("is_strong_wind_prev", as_series(&wind));
    out.push_column("is_heavy_rain_prev", as_series(&heavy_rain));
    out.push_column("rainy_day_prev", as_series(&rainy));
    out.push_column("consec_rainy_days_prev", as_series(&run_length(&rainy)));

    calendar_features(daily, config, &mut out);
    out
}

/// Engineer features for every preprocessed market season.
pub fn engineer_market(config: &PipelineConfig) -> Result<StageReport> {
    let prefix = format!("daily_market_{}_", config.crop);
    let files = tagged_files(&config.paths.preprocessed_market_dir, &prefix, SeasonKind::Market)?;
    let out_dir = &config.paths.features_market_dir;
    reset_output_dir(out_dir)?;

    let units = files
        .into_iter()
        .map(|(window, path)| (window.tag(), (window, path)))
        .collect();

    run_units(ENGINEER_MARKET, config.parallel.enabled, units, |_, (window, path)| {
        let mut daily = Frame::read_csv(path)?;
        daily.sort_by_date();
        let features = market_features(&daily, &config.market)?;

        let target = out_dir.join(market_features_name(&config.crop, window));
        features.write_csv(&target)?;
        Ok(UnitOutcome::Written(vec![target]))
    })
}

/// Engineer features for every preprocessed weather season.
pub fn engineer_weather(config: &PipelineConfig) -> Result<StageReport> {
    let prefix = format!("daily_weather_{}_", config.crop);
    let files = tagged_files(&config.paths.preprocessed_weather_dir, &prefix, SeasonKind::Weather)?;
    let out_dir = &config.paths.features_weather_dir;
    reset_output_dir(out_dir)?;

    let units = files
        .into_iter()
        .map(|(window, path)| (window.tag(), (window, path)))
        .collect();

    run_units(ENGINEER_WEATHER, config.parallel.enabled, units, |_, (window, path)| {
        let mut daily = Frame::read_csv(path)?;
        daily.sort_by_date();
        let features = weather_features(&daily, &config.weather);

        let target = out_dir.join(weather_features_name(&config.crop, window));
        features.write_csv(&target)?;
        Ok(UnitOutcome::Written(vec![target]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2018, 11, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn market_frame(n: usize) -> Frame {
        let mut frame = Frame::new(days(n));
        let series = |offset: f64| (0..n).map(|i| Some(offset + i as f64)).collect();
        frame.push_column("avg_price", series(30.0));
        frame.push_column("high_price", series(40.0));
        frame.push_column("low_price", series(20.0));
        frame.push_column("volume", series(1000.0));
        frame
    }

    fn weather_frame(precip: &[f64]) -> Frame {
        let n = precip.len();
        let mut frame = Frame::new(days(n));
        frame.push_column("precip_mm", precip.iter().copied().map(Some).collect());
        frame.push_column("temp_min", vec![Some(12.0); n]);
        frame.push_column("temp_max", vec![Some(20.0); n]);
        frame.push_column("sunshine_hours", vec![Some(0.5); n]);
        frame
    }

    #[test]
    fn test_market_features_drop_same_day_columns() -> Result<()> {
        let out = market_features(&market_frame(20), &MarketConfig::default())?;
        let names = out.column_names();

        assert!(names.contains(&"avg_price"));
        assert!(names.contains(&"avg_price_lag14"));
        assert!(names.contains(&"high_price_ma7"));
        assert!(!names.contains(&"avg_price_ma3"));
        for same_day in ["high_price", "low_price", "volume"] {
            assert!(!names.contains(&same_day));
        }
        // mid price and spread were never present, so nothing is derived.
        assert!(!names.iter().any(|n| n.starts_with("mid_price")));

        assert_eq!(out.value("avg_price_lag1", 0), None);
        assert_eq!(out.value("avg_price_lag1", 5), Some(34.0));
        assert_eq!(out.value("avg_price_lag7", 10), Some(33.0));
        // ma3 at row 5 averages rows 2..=4 of high price.
        assert_eq!(out.value("high_price_ma3", 5), Some(43.0));
        assert_eq!(out.value("high_price_ma3", 2), None);
        Ok(())
    }

    /// Every weather field, each with its own wave so thresholds are crossed.
    fn full_weather_frame(n: usize) -> Frame {
        let mut frame = Frame::new(days(n));
        let wave = |base: f64, amp: f64, period: usize| -> Series {
            (0..n).map(|i| Some(base + amp * ((i % period) as f64))).collect()
        };
        frame.push_column("temp_mean", wave(12.0, 1.0, 5));
        frame.push_column("temp_max", wave(18.0, 1.5, 4));
        frame.push_column("temp_min", wave(4.0, 2.0, 5));
        frame.push_column("precip_mm", wave(0.0, 20.0, 4));
        frame.push_column("precip_hours", wave(0.0, 3.0, 3));
        frame.push_column("sunshine_hours", wave(0.0, 0.6, 6));
        frame.push_column("humidity_pct", wave(70.0, 4.0, 7));
        frame.push_column("gust_max", wave(8.0, 3.0, 4));
        frame
    }

    /// Overwrite every listed column at row `t` with an extreme reading.
    fn overwrite_row(frame: &Frame, names: &[&str], t: usize, value: f64) -> Frame {
        let mut changed = frame.clone();
        for name in names {
            let mut values = changed.column(name).unwrap().to_vec();
            values[t] = Some(value);
            changed.push_column(*name, values);
        }
        changed
    }

    fn assert_row_unchanged(before: &Frame, after: &Frame, t: usize) {
        for column in before.columns().iter().filter(|c| c.name != TARGET) {
            let after_values = after.column(&column.name).unwrap();
            assert_eq!(column.values[t], after_values[t], "{} at row {}", column.name, t);
            assert_eq!(column.values[..t], after_values[..t], "{} before row {}", column.name, t);
        }
    }

    #[test]
    fn test_features_ignore_same_day_values() -> Result<()> {
        let n = 40;
        let rows = [0, 1, 6, 15, 29, n - 1];

        let mut market = market_frame(n);
        market.push_column("mid_price", (0..n).map(|i| Some(35.0 + i as f64)).collect());
        market.push_column("price_spread", vec![Some(20.0); n]);
        let market_columns: Vec<String> = market.column_names().iter().map(|s| s.to_string()).collect();
        let market_columns: Vec<&str> = market_columns.iter().map(String::as_str).collect();

        let market_config = MarketConfig::default();
        let before = market_features(&market, &market_config)?;
        for &t in &rows {
            for value in [-999.0, 1e6] {
                let after = market_features(&overwrite_row(&market, &market_columns, t, value), &market_config)?;
                assert_row_unchanged(&before, &after, t);
            }
        }

        let weather = full_weather_frame(n);
        let fields: Vec<&str> = WeatherField::ALL.iter().map(|f| f.name()).collect();
        assert!(fields.iter().all(|f| weather.has_column(f)));

        let weather_config = WeatherConfig::default();
        let before = weather_features(&weather, &weather_config);
        for &t in &rows {
            // Cold, frost, wind and heavy rain all fire at -50/0/500 if leaked.
            for value in [-50.0, 0.0, 500.0] {
                let after = weather_features(&overwrite_row(&weather, &fields, t, value), &weather_config);
                assert_row_unchanged(&before, &after, t);
            }
        }
        Ok(())
    }

    #[test]
    fn test_market_features_require_target() {
        let mut frame = Frame::new(days(3));
        frame.push_column("high_price", vec![Some(1.0); 3]);
        assert!(market_features(&frame, &MarketConfig::default()).is_err());
    }

    #[test]
    fn test_weather_rolling_sum_and_rain_counter() {
        let out = weather_features(&weather_frame(&[0.0, 10.0, 0.0, 5.0, 20.0, 0.0, 0.0]), &WeatherConfig::default());

        let sum3 = out.column("precip_mm_rollsum_3d_prev").unwrap();
        assert_eq!(sum3[3], Some(10.0));
        assert_eq!(sum3[4], Some(15.0));

        // Rain on days 2, 4 and 5 is seen one day later.
        let rainy = out.column("rainy_day_prev").unwrap();
        assert_eq!(rainy, &[Some(0.0), Some(0.0), Some(1.0), Some(0.0), Some(1.0), Some(1.0), Some(0.0)]);
        let streak = out.column("consec_rainy_days_prev").unwrap();
        assert_eq!(streak, &[Some(0.0), Some(0.0), Some(1.0), Some(0.0), Some(1.0), Some(2.0), Some(0.0)]);
    }

    #[test]
    fn test_weather_threshold_boundaries() {
        let mut frame = weather_frame(&[0.0; 4]);
        frame.push_column("temp_min", vec![Some(10.0), Some(10.1), Some(5.0), None]);
        frame.push_column("gust_max", vec![Some(15.0), Some(14.9), None, None]);
        let out = weather_features(&frame, &WeatherConfig::default());

        let cold = out.column("is_cold_wave_prev").unwrap();
        assert_eq!(cold, &[Some(0.0), Some(1.0), Some(0.0), Some(1.0)]);
        let frost = out.column("is_frost_risk_prev").unwrap();
        assert_eq!(frost, &[Some(0.0), Some(0.0), Some(0.0), Some(1.0)]);
        let wind = out.column("is_strong_wind_prev").unwrap();
        assert_eq!(wind, &[Some(0.0), Some(1.0), Some(0.0), Some(0.0)]);
        assert_eq!(out.value("daily_temp_range_prev", 1), Some(10.0));
        assert_eq!(out.value("daily_temp_range_prev", 0), None);
    }

    #[test]
    fn test_weather_calendar_and_shape() {
        let out = weather_features(&weather_frame(&[0.0; 3]), &WeatherConfig::default());
        assert_eq!(out.value("month", 0), Some(11.0));
        assert_eq!(out.value("is_winter", 0), Some(1.0));
        let sin = out.value("month_sin", 0).unwrap();
        assert!((sin - (2.0 * PI * 11.0 / 12.0).sin()).abs() < 1e-12);

        // 8 lags + 6 level fields x 4 windows x 3 + 2 sums x 4 + 8 derived + 4 calendar.
        assert_eq!(out.columns().len(), 8 + 72 + 8 + 8 + 4);
        assert!(!out.has_column("precip_mm"));
        assert!(out.has_column("gust_max_rollmin_30d_prev"));
    }
}
