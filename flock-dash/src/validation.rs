//! Form field helpers shared by handlers and sync

use chrono::NaiveDate;
use flock_common::phone::normalize_phone;

use crate::error::{ApiError, ApiResult};

/// Trim an optional text field; blank becomes `None`
pub fn clean_opt(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Trim a required text field
pub fn require_text(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Normalise an optional phone number; a non-blank invalid number is an error
pub fn clean_phone(value: Option<String>, country_code: &str) -> ApiResult<Option<String>> {
    match clean_opt(value) {
        None => Ok(None),
        Some(raw) => normalize_phone(&raw, country_code)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid phone number '{}'", raw))),
    }
}

/// Lower-case and sanity-check an optional email address
pub fn clean_email(value: Option<String>) -> ApiResult<Option<String>> {
    match clean_opt(value) {
        None => Ok(None),
        Some(email) => {
            let valid = email
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
                .unwrap_or(false);
            if valid && !email.contains(char::is_whitespace) {
                Ok(Some(email.to_ascii_lowercase()))
            } else {
                Err(ApiError::BadRequest(format!("invalid email address '{}'", email)))
            }
        }
    }
}

/// Validate an inclusive date range, defaulting to year-to-date
pub fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ApiResult<(NaiveDate, NaiveDate)> {
    date_range_on(flock_common::time::today(), from, to)
}

/// `date_range` relative to `today`
///
/// A missing `from` is January 1 of the current year. When only a `to` from
/// an earlier year is given, `from` is January 1 of that year instead.
fn date_range_on(
    today: NaiveDate,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ApiResult<(NaiveDate, NaiveDate)> {
    use flock_common::time::year_start;

    let to_given = to.is_some();
    let to = to.unwrap_or(today);
    let from = from.unwrap_or_else(|| {
        let this_year = year_start(today);
        if to_given && to < this_year {
            year_start(to)
        } else {
            this_year
        }
    });
    if from > to {
        return Err(ApiError::BadRequest(format!(
            "'from' ({}) is after 'to' ({})",
            from, to
        )));
    }
    Ok((from, to))
}

/// Inclusive range with missing ends left open
///
/// Uses 0001-01-01 / 9999-12-31 so the bounds compare correctly as ISO text.
pub fn open_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let earliest = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
    let latest = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
    (from.unwrap_or(earliest), to.unwrap_or(latest))
}

/// Escape a user search term for `LIKE ... ESCAPE '\'`
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_opt() {
        assert_eq!(clean_opt(Some("  hi ".into())), Some("hi".into()));
        assert_eq!(clean_opt(Some("   ".into())), None);
        assert_eq!(clean_opt(None), None);
    }

    #[test]
    fn test_clean_phone() {
        assert_eq!(clean_phone(Some("0241234567".into()), "233").unwrap().as_deref(), Some("233241234567"));
        assert_eq!(clean_phone(Some(" ".into()), "233").unwrap(), None);
        assert!(clean_phone(Some("12".into()), "233").is_err());
    }

    #[test]
    fn test_clean_email() {
        assert_eq!(clean_email(Some("Ama@Example.org".into())).unwrap().as_deref(), Some("ama@example.org"));
        assert!(clean_email(Some("ama.example.org".into())).is_err());
        assert!(clean_email(Some("@example.org".into())).is_err());
        assert!(clean_email(Some("ama@localhost".into())).is_err());
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        let from = NaiveDate::from_ymd_opt(2024, 5, 1);
        let to = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(date_range(from, to).is_err());
        assert!(date_range(to, from).is_ok());
    }

    #[test]
    fn test_date_range_defaults() {
        let today = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap();
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert_eq!(date_range_on(today, None, None).unwrap(), (jan1, today));

        // A `to` earlier this year still starts on January 1 of this year
        let march = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(date_range_on(today, None, Some(march)).unwrap(), (jan1, march));

        // A `to` beyond this year still starts on January 1 of this year
        let next_year = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert_eq!(date_range_on(today, None, Some(next_year)).unwrap(), (jan1, next_year));

        // A `to` in a past year starts that year
        let last_year = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        assert_eq!(
            date_range_on(today, None, Some(last_year)).unwrap(),
            (NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), last_year)
        );
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern(" Ama "), "%ama%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
