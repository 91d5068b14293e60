//! Publication date normalization.
//!
//! Search providers report dates as anything from RFC 3339 timestamps to
//! `"3 hours ago"` or `"yesterday"`. [`normalize`] turns all of them into an
//! absolute UTC timestamp, or `None` when the string cannot be interpreted.
//! Absence is always preferred over guessing.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Parsed values below this year are treated as nonsensical partial parses.
const MIN_YEAR: i32 = 1000;

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*(minutes?|mins?|hours?|days?|weeks?)\s+ago").unwrap()
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y %H:%M",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    // Numeric dates are month-first.
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%b. %d, %Y",
    "%A, %B %d, %Y",
];

/// Convert a free-form date string to a UTC timestamp.
///
/// Rules, first match wins:
/// 1. Absolute formats (RFC 3339, RFC 2822, common ISO-like and natural
///    forms) with a year of at least 1000. Offsets are converted to UTC;
///    values without one are taken as UTC.
/// 2. `"<N> minutes/hours/days/weeks ago"` relative to `reference`.
/// 3. Anything containing `"yesterday"`: midnight UTC of the previous day.
/// 4. `"just now"`, `"moments ago"`, `"seconds ago"`: `reference` itself.
/// 5. Otherwise `None`.
pub fn normalize(raw: Option<&str>, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(dt) = parse_absolute(raw) {
        return Some(dt);
    }

    let lowered = raw.to_lowercase();
    if let Some(dt) = parse_relative(&lowered, reference) {
        return Some(dt);
    }

    if lowered.contains("yesterday") {
        let day = reference.date_naive() - Duration::days(1);
        return day.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }

    if matches!(lowered.as_str(), "just now" | "moments ago" | "seconds ago") {
        return Some(reference);
    }

    None
}

fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })?;

    (parsed.year() >= MIN_YEAR).then_some(parsed)
}

fn parse_relative(lowered: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE.captures(lowered)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = match &caps[2] {
        u if u.starts_with("min") => Duration::try_minutes(amount)?,
        u if u.starts_with("hour") => Duration::try_hours(amount)?,
        u if u.starts_with("day") => Duration::try_days(amount)?,
        _ => Duration::try_weeks(amount)?,
    };
    reference.checked_sub_signed(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 14, 30, 15).unwrap()
    }

    #[test]
    fn test_relative_hours() {
        let t = reference();
        assert_eq!(normalize(Some("3 hours ago"), t), Some(t - Duration::hours(3)));
        assert_eq!(normalize(Some("1 hour ago"), t), Some(t - Duration::hours(1)));
    }

    #[test]
    fn test_relative_minutes_days_weeks() {
        let t = reference();
        assert_eq!(normalize(Some("45 minutes ago"), t), Some(t - Duration::minutes(45)));
        assert_eq!(normalize(Some("5 mins ago"), t), Some(t - Duration::minutes(5)));
        assert_eq!(normalize(Some("2 Days ago"), t), Some(t - Duration::days(2)));
        assert_eq!(normalize(Some("1 week ago"), t), Some(t - Duration::weeks(1)));
    }

    #[test]
    fn test_yesterday_is_previous_midnight() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap();
        assert_eq!(normalize(Some("yesterday"), reference()), Some(expected));
        assert_eq!(normalize(Some("Yesterday at 4pm"), reference()), Some(expected));
    }

    #[test]
    fn test_now_phrases_return_reference() {
        let t = reference();
        assert_eq!(normalize(Some("moments ago"), t), Some(t));
        assert_eq!(normalize(Some("Just now"), t), Some(t));
        assert_eq!(normalize(Some("seconds ago"), t), Some(t));
    }

    #[test]
    fn test_absolute_with_offset_converts_to_utc() {
        let parsed = normalize(Some("2025-05-06T10:00:00-04:00"), reference());
        assert_eq!(parsed, Some(Utc.with_ymd_and_hms(2025, 5, 6, 14, 0, 0).unwrap()));
    }

    #[test]
    fn test_absolute_naive_is_utc() {
        assert_eq!(
            normalize(Some("2025-05-01 08:15:00"), reference()),
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 8, 15, 0).unwrap())
        );
        assert_eq!(
            normalize(Some("Oct 17, 2024"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 0, 0, 0).unwrap())
        );
        assert_eq!(
            normalize(Some("17 October 2024"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_numeric_dates_are_month_first() {
        assert_eq!(
            normalize(Some("05/06/2025"), reference()),
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(
            normalize(Some("10/17/2024"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 0, 0, 0).unwrap())
        );
        assert_eq!(
            normalize(Some("10-17-2024"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 0, 0, 0).unwrap())
        );
        assert_eq!(normalize(Some("17/10/2024"), reference()), None);
    }

    #[test]
    fn test_twelve_hour_clock() {
        assert_eq!(
            normalize(Some("Oct 17, 2024 10:15 AM"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 10, 15, 0).unwrap())
        );
        assert_eq!(
            normalize(Some("October 17, 2024 3:05 PM"), reference()),
            Some(Utc.with_ymd_and_hms(2024, 10, 17, 15, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            normalize(Some("Tue, 6 May 2025 09:00:00 +0000"), reference()),
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_rejects_tiny_years() {
        assert_eq!(normalize(Some("0999-01-01"), reference()), None);
    }

    #[test]
    fn test_garbage_and_empty_are_none() {
        let t = reference();
        assert_eq!(normalize(None, t), None);
        assert_eq!(normalize(Some(""), t), None);
        assert_eq!(normalize(Some("   "), t), None);
        assert_eq!(normalize(Some("last tuesday-ish"), t), None);
        assert_eq!(normalize(Some("99999999999999999999 hours ago"), t), None);
        assert_eq!(normalize(Some("ago 3 hours"), t), None);
    }
}
