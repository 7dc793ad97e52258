//! Growing-season windows
//!
//! A season is identified by the Gregorian year it starts in. Market seasons
//! run Nov 1 through Jan 31, weather seasons Sep 1 through Jan 31; both span
//! the year boundary.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar::{local_era_year, ERA_OFFSET};

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{3})(\d{2})(\d{2})-(\d{3})0131").expect("season tag pattern is valid")
});

/// Which data source a window bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonKind {
    Market,
    Weather,
}

impl SeasonKind {
    /// Month and day the window opens on.
    fn opening(self) -> (u32, u32) {
        match self {
            SeasonKind::Market => (11, 1),
            SeasonKind::Weather => (9, 1),
        }
    }
}

/// One inclusive `[start, end]` growing-season window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeasonWindow {
    pub season_year: i32,
    pub kind: SeasonKind,
}

impl SeasonWindow {
    pub fn new(kind: SeasonKind, season_year: i32) -> Self {
        Self { season_year, kind }
    }

    /// First day of the window.
    pub fn start(&self) -> NaiveDate {
        let (month, day) = self.kind.opening();
        NaiveDate::from_ymd_opt(self.season_year, month, day).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the window, Jan 31 of the following year.
    pub fn end(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.season_year + 1, 1, 31).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// Local-era boundary tag used in filenames, e.g. `1071101-1080131`.
    pub fn tag(&self) -> String {
        let (month, day) = self.kind.opening();
        format!(
            "{:03}{:02}{:02}-{:03}0131",
            local_era_year(self.season_year),
            month,
            day,
            local_era_year(self.season_year + 1)
        )
    }

    /// Recover a window of `kind` from any filename that embeds its tag.
    pub fn parse_tag_in(kind: SeasonKind, name: &str) -> Option<Self> {
        let (open_month, open_day) = kind.opening();

        TAG_PATTERN.captures_iter(name).find_map(|caps| {
            let start_year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            let end_year: i32 = caps[4].parse().ok()?;

            if month != open_month || day != open_day || end_year != start_year + 1 {
                return None;
            }
            Some(Self::new(kind, start_year + ERA_OFFSET))
        })
    }
}

impl fmt::Display for SeasonWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start(), self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let market = SeasonWindow::new(SeasonKind::Market, 2018);
        assert_eq!(market.start(), ymd(2018, 11, 1));
        assert_eq!(market.end(), ymd(2019, 1, 31));

        let weather = SeasonWindow::new(SeasonKind::Weather, 2018);
        assert_eq!(weather.start(), ymd(2018, 9, 1));
        assert_eq!(weather.end(), ymd(2019, 1, 31));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let market = SeasonWindow::new(SeasonKind::Market, 2020);
        assert!(market.contains(ymd(2020, 11, 1)));
        assert!(market.contains(ymd(2021, 1, 31)));
        assert!(!market.contains(ymd(2020, 10, 31)));
        assert!(!market.contains(ymd(2021, 2, 1)));
    }

    #[test]
    fn test_tags() {
        assert_eq!(SeasonWindow::new(SeasonKind::Market, 2018).tag(), "1071101-1080131");
        assert_eq!(SeasonWindow::new(SeasonKind::Weather, 2024).tag(), "1130901-1140131");
    }

    #[test]
    fn test_parse_tag_from_filename() {
        let window = SeasonWindow::new(SeasonKind::Market, 2019);
        let name = format!("features_market_kai-lan_{}.csv", window.tag());
        assert_eq!(SeasonWindow::parse_tag_in(SeasonKind::Market, &name), Some(window));

        // A weather tag is not a market window.
        let weather = SeasonWindow::new(SeasonKind::Weather, 2019).tag();
        assert_eq!(SeasonWindow::parse_tag_in(SeasonKind::Market, &weather), None);
        assert_eq!(SeasonWindow::parse_tag_in(SeasonKind::Market, "notes.csv"), None);
    }
}
