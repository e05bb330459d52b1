use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};

const DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Parses a date-like cell into a timestamp.
///
/// `extra_formats` are tried first, as datetime formats and then as date-only
/// formats (midnight). Slash dates are read month-first, with day-first as a
/// fallback when the month-first reading is impossible.
/// Returns `None` when no shape matches.
pub fn parse_datetime(value: &str, extra_formats: &[String]) -> Option<NaiveDateTime> {
    let value = value.trim();

    for fmt in extra_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Whole days in `delta`, floored toward negative infinity.
///
/// -1 day +12h is -1 days, and -12h is -1 days as well.
pub fn floor_days(delta: TimeDelta) -> i64 {
    let days = delta.num_days();
    if delta < TimeDelta::days(days) {
        days - 1
    } else {
        days
    }
}

/// Signed day difference `later - earlier`, floored.
pub fn days_between(earlier: NaiveDateTime, later: NaiveDateTime) -> i64 {
    floor_days(later - earlier)
}

/// `round(days / days_per_year)` with ties to even.
pub fn round_years(days: i64, days_per_year: f64) -> i64 {
    (days as f64 / days_per_year).round_ties_even() as i64
}

/// Treats blank cells as missing.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
