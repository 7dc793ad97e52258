//! Standardised column names shared by every stage

use serde::{Deserialize, Serialize};

/// Key column present first in every table written by the pipeline.
pub const DATE: &str = "date";

/// Prediction target: the daily average market price.
pub const TARGET: &str = "avg_price";

/// Market columns after preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketColumn {
    AvgPrice,
    HighPrice,
    MidPrice,
    LowPrice,
    Volume,
    PriceSpread,
}

impl MarketColumn {
    /// Same-day market outcomes. Only their history may become features.
    pub const STRUCTURE: [MarketColumn; 5] = [
        MarketColumn::HighPrice,
        MarketColumn::MidPrice,
        MarketColumn::LowPrice,
        MarketColumn::PriceSpread,
        MarketColumn::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MarketColumn::AvgPrice => TARGET,
            MarketColumn::HighPrice => "high_price",
            MarketColumn::MidPrice => "mid_price",
            MarketColumn::LowPrice => "low_price",
            MarketColumn::Volume => "volume",
            MarketColumn::PriceSpread => "price_spread",
        }
    }
}

/// How a field behaves under out-of-range readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Readings below the configured floor are dropped.
    Temperature,
    /// Negative readings are dropped.
    NonNegative,
}

/// How a field is summarised over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollStyle {
    /// Window mean, max and min.
    Level,
    /// Window sum.
    Accumulation,
}

/// The eight daily meteorological fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherField {
    TempMean,
    TempMax,
    TempMin,
    PrecipMm,
    PrecipHours,
    SunshineHours,
    HumidityPct,
    GustMax,
}

impl WeatherField {
    pub const ALL: [WeatherField; 8] = [
        WeatherField::TempMean,
        WeatherField::TempMax,
        WeatherField::TempMin,
        WeatherField::PrecipMm,
        WeatherField::PrecipHours,
        WeatherField::SunshineHours,
        WeatherField::HumidityPct,
        WeatherField::GustMax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WeatherField::TempMean => "temp_mean",
            WeatherField::TempMax => "temp_max",
            WeatherField::TempMin => "temp_min",
            WeatherField::PrecipMm => "precip_mm",
            WeatherField::PrecipHours => "precip_hours",
            WeatherField::SunshineHours => "sunshine_hours",
            WeatherField::HumidityPct => "humidity_pct",
            WeatherField::GustMax => "gust_max",
        }
    }

    /// Header used by the weather bureau's station exports.
    pub fn default_header(self) -> &'static str {
        match self {
            WeatherField::TempMean => "氣溫(℃)",
            WeatherField::TempMax => "最高氣溫(℃)",
            WeatherField::TempMin => "最低氣溫(℃)",
            WeatherField::PrecipMm => "降水量(mm)",
            WeatherField::PrecipHours => "降水時數(hour)",
            WeatherField::SunshineHours => "日照時數(hour)",
            WeatherField::HumidityPct => "相對溼度(%)",
            WeatherField::GustMax => "最大陣風(m/s)",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            WeatherField::TempMean | WeatherField::TempMax | WeatherField::TempMin => {
                FieldKind::Temperature
            }
            _ => FieldKind::NonNegative,
        }
    }

    pub fn roll_style(self) -> RollStyle {
        match self {
            WeatherField::PrecipMm | WeatherField::PrecipHours => RollStyle::Accumulation,
            _ => RollStyle::Level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_classes() {
        let accumulations: Vec<_> = WeatherField::ALL
            .iter()
            .filter(|f| f.roll_style() == RollStyle::Accumulation)
            .collect();
        assert_eq!(accumulations.len(), 2);

        let temperatures = WeatherField::ALL
            .iter()
            .filter(|f| f.kind() == FieldKind::Temperature)
            .count();
        assert_eq!(temperatures, 3);
    }

    #[test]
    fn test_target_is_not_structure() {
        assert!(!MarketColumn::STRUCTURE.contains(&MarketColumn::AvgPrice));
        assert_eq!(MarketColumn::AvgPrice.name(), TARGET);
    }
}
