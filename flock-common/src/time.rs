//! Date and timestamp utilities

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Date formats accepted from forms and spreadsheets, tried in order
///
/// Day-first is preferred over month-first for slashed dates.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date (UTC)
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a date in any of the accepted formats
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the year containing `date`
pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// Number of days from `from` until the next anniversary of `birth`
///
/// Feb 29 birthdays fall on Mar 1 in non-leap years.
pub fn days_until_anniversary(birth: NaiveDate, from: NaiveDate) -> i64 {
    let in_year = |year: i32| {
        NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
    };

    match in_year(from.year()) {
        Some(this_year) if this_year >= from => (this_year - from).num_days(),
        _ => in_year(from.year() + 1)
            .map(|next| (next - from).num_days())
            .unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_parse_iso_and_day_first() {
        assert_eq!(parse_date("2024-03-09"), Some(d(2024, 3, 9)));
        assert_eq!(parse_date("09/03/2024"), Some(d(2024, 3, 9)));
        assert_eq!(parse_date("9-3-2024"), Some(d(2024, 3, 9)));
        assert_eq!(parse_date("9 Mar 2024"), Some(d(2024, 3, 9)));
        assert_eq!(parse_date(" 2024/03/09 "), Some(d(2024, 3, 9)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("next sunday"), None);
        assert_eq!(parse_date("31/02/2024"), None);
    }

    #[test]
    fn test_period_starts() {
        assert_eq!(month_start(d(2024, 5, 17)), d(2024, 5, 1));
        assert_eq!(year_start(d(2024, 5, 17)), d(2024, 1, 1));
    }

    #[test]
    fn test_anniversary_distance() {
        assert_eq!(days_until_anniversary(d(1990, 6, 10), d(2024, 6, 10)), 0);
        assert_eq!(days_until_anniversary(d(1990, 6, 12), d(2024, 6, 10)), 2);
        assert_eq!(days_until_anniversary(d(1990, 1, 2), d(2024, 12, 31)), 2);
        assert_eq!(days_until_anniversary(d(2000, 2, 29), d(2023, 2, 27)), 2);
    }
}
