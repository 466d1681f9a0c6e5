//! Human date expressions and the UTC query window.
//!
//! Resolution is a pure function of the expression and "today" so callers
//! (and tests) can pin the clock.  [`resolve`] reads today from the local
//! wall clock.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, Weekday};

/// Formats tried, in order, when an expression is not a keyword.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Resolve an expression against the local calendar date.
pub fn resolve(expression: &str) -> NaiveDate {
    resolve_at(expression, Local::now().date_naive())
}

/// Resolve a date expression relative to `today`.
///
/// Recognized, in priority order: empty (last workday), `yesterday`, `today`,
/// a weekday name or 3-letter abbreviation optionally prefixed by `last `,
/// then a handful of absolute date formats.  Anything unparseable falls back
/// to the last workday.
pub fn resolve_at(expression: &str, today: NaiveDate) -> NaiveDate {
    let trimmed = expression.trim();
    let lowered = trimmed.to_lowercase();

    match lowered.as_str() {
        "" => return last_workday(today),
        "yesterday" => return days_before(today, 1),
        "today" => return today,
        _ => {}
    }

    let weekday_name = lowered.strip_prefix("last ").unwrap_or(&lowered).trim();
    if let Some(weekday) = parse_weekday(weekday_name) {
        return last_weekday(today, weekday);
    }

    parse_absolute(trimmed).unwrap_or_else(|| last_workday(today))
}

/// Friday when `today` is a Monday, otherwise yesterday.
pub fn last_workday(today: NaiveDate) -> NaiveDate {
    match today.weekday() {
        Weekday::Mon => days_before(today, 3),
        _ => days_before(today, 1),
    }
}

/// Most recent strictly-past occurrence of `target`; asking for today's
/// weekday goes back a full week.
pub fn last_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let current = i64::from(today.weekday().num_days_from_monday());
    let wanted = i64::from(target.num_days_from_monday());
    let days_back = match (current - wanted).rem_euclid(7) {
        0 => 7,
        n => n,
    };
    days_before(today, days_back as u64)
}

/// The `(start, end)` UTC timestamps used to select events for `date`.
///
/// `end` reaches 07:59:59Z on the following day so late-evening work in
/// US-like timezones is still attributed to `date`.  This is a fixed
/// approximation, not a timezone conversion.
pub fn utc_window(date: NaiveDate) -> (String, String) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (
        format!("{}T00:00:00Z", date.format("%Y-%m-%d")),
        format!("{}T07:59:59Z", next.format("%Y-%m-%d")),
    )
}

/// ISO rendering used by the `get_workday_date` tool.
pub fn to_iso_midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00", date.format("%Y-%m-%d"))
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    let weekday = match name {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn parse_absolute(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}
