//! Local-era calendar conversion
//!
//! Dates are persisted in the local civil calendar (era year = Gregorian
//! year - 1911) and converted to Gregorian `NaiveDate` for every piece of
//! arithmetic: ordering, lags, rolling windows and weekdays.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Offset between the Gregorian year and the local era year.
pub const ERA_OFFSET: i32 = 1911;

/// Convert a Gregorian year to its local era year.
pub fn local_era_year(gregorian_year: i32) -> i32 {
    gregorian_year - ERA_OFFSET
}

/// Format a Gregorian date as a zero-padded local-era string, `YYY/MM/DD`.
pub fn format_local_era(date: NaiveDate) -> String {
    format!(
        "{:03}/{:02}/{:02}",
        local_era_year(date.year()),
        date.month(),
        date.day()
    )
}

/// Parse a local-era date in either the slash form (`107/11/01`) or the
/// packed numeric form (`1071101`).
pub fn parse_local_era(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.contains('/') {
        return parse_local_era_slashed(raw);
    }

    // Spreadsheet exports sometimes carry the packed form as a float.
    let packed = raw.strip_suffix(".0").unwrap_or(raw);
    if packed.len() < 6 || !packed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let split = packed.len() - 4;
    let year: i32 = packed[..split].parse().ok()?;
    let month: u32 = packed[split..split + 2].parse().ok()?;
    let day: u32 = packed[split + 2..].parse().ok()?;
    NaiveDate::from_ymd_opt(year + ERA_OFFSET, month, day)
}

/// Parse only the slash-delimited local-era shape, `Y/M/D`.
pub fn parse_local_era_slashed(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year + ERA_OFFSET, month, day)
}

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y/%m/%d %I:%M %p",
];

/// Offset-carrying layouts. The date is taken in the reading's own offset.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a weather observation timestamp down to its calendar date.
///
/// Accepts Gregorian dates with an optional time of day and falls back to
/// the local-era forms.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // A four-digit (or packed eight-digit) leading year is Gregorian;
    // anything shorter is a local-era year.
    let leading_digits = raw.bytes().take_while(u8::is_ascii_digit).count();
    if leading_digits == 8 && raw.len() == 8 {
        let year: i32 = raw[..4].parse().ok()?;
        let month: u32 = raw[4..6].parse().ok()?;
        let day: u32 = raw[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if leading_digits != 4 {
        return parse_local_era(raw);
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.date_naive());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_both_encodings() {
        assert_eq!(parse_local_era("107/11/01"), Some(ymd(2018, 11, 1)));
        assert_eq!(parse_local_era("1071101"), Some(ymd(2018, 11, 1)));
        assert_eq!(parse_local_era("1071101.0"), Some(ymd(2018, 11, 1)));
        assert_eq!(parse_local_era(" 99/2/3 "), Some(ymd(2010, 2, 3)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_local_era(""), None);
        assert_eq!(parse_local_era("合計"), None);
        assert_eq!(parse_local_era("107/13/01"), None);
        assert_eq!(parse_local_era("10711"), None);
        assert_eq!(parse_local_era_slashed("1071101"), None);
        assert_eq!(parse_local_era_slashed("107/11/01/2"), None);
    }

    #[test]
    fn test_round_trip_every_day() {
        let mut date = ymd(1912, 1, 1);
        let end = ymd(2026, 12, 31);
        while date <= end {
            let persisted = format_local_era(date);
            assert_eq!(parse_local_era(&persisted), Some(date));
            assert_eq!(format_local_era(parse_local_era(&persisted).unwrap()), persisted);
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_format_is_zero_padded() {
        assert_eq!(format_local_era(ymd(1912, 1, 5)), "001/01/05");
        assert_eq!(format_local_era(ymd(2019, 1, 31)), "108/01/31");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp("2018-09-01"), Some(ymd(2018, 9, 1)));
        assert_eq!(parse_timestamp("2018/09/01 13:00"), Some(ymd(2018, 9, 1)));
        assert_eq!(parse_timestamp("2018-09-01 00:00:00"), Some(ymd(2018, 9, 1)));
        assert_eq!(parse_timestamp("20180901"), Some(ymd(2018, 9, 1)));
        assert_eq!(parse_timestamp("107/09/01"), Some(ymd(2018, 9, 1)));
        assert_eq!(parse_timestamp("n/a"), None);
    }

    #[test]
    fn test_parse_timestamp_iso_and_clock_forms() {
        let cases = [
            ("2018-09-01T13:00", Some(ymd(2018, 9, 1))),
            ("2018-09-01T13:00:59", Some(ymd(2018, 9, 1))),
            ("2018-09-01 00:00:00.000", Some(ymd(2018, 9, 1))),
            ("2018-09-01T23:59:59.123456", Some(ymd(2018, 9, 1))),
            ("2018-09-01T00:00:00+08:00", Some(ymd(2018, 9, 1))),
            ("2018-09-01T23:30:00Z", Some(ymd(2018, 9, 1))),
            ("2018-09-01 23:30:00+0800", Some(ymd(2018, 9, 1))),
            ("2018/09/01 1:00 PM", Some(ymd(2018, 9, 1))),
            ("2018/09/01 11:45 am", Some(ymd(2018, 9, 1))),
            ("2018-09-01T25:00", None),
            ("2018-09-31", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_timestamp(raw), expected, "{}", raw);
        }
    }
}
