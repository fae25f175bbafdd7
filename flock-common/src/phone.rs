//! Phone number normalisation
//!
//! Numbers are stored as bare international digits (`233241234567`) so that
//! equality checks during sync and SMS de-duplication are plain string compares.

/// Shortest accepted number, in digits, after normalisation
const MIN_DIGITS: usize = 9;

/// Longest accepted number (E.164 limit)
const MAX_DIGITS: usize = 15;

/// Normalise a user-entered phone number
///
/// Returns `None` for empty input or anything that does not reduce to
/// 9-15 digits.
///
/// # Examples
///
/// ```
/// use flock_common::phone::normalize_phone;
///
/// assert_eq!(normalize_phone("024 123 4567", "233").as_deref(), Some("233241234567"));
/// assert_eq!(normalize_phone("+233 (24) 123-4567", "233").as_deref(), Some("233241234567"));
/// assert_eq!(normalize_phone("", "233"), None);
/// ```
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            '+' if i == 0 => {}
            _ => return None,
        }
    }

    let international = if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", default_country_code, rest)
    } else {
        digits
    };

    if (MIN_DIGITS..=MAX_DIGITS).contains(&international.len()) {
        Some(international)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_number_gets_country_code() {
        assert_eq!(normalize_phone("0241234567", "233").as_deref(), Some("233241234567"));
    }

    #[test]
    fn test_international_prefixes() {
        assert_eq!(normalize_phone("+2348031234567", "233").as_deref(), Some("2348031234567"));
        assert_eq!(normalize_phone("002348031234567", "233").as_deref(), Some("2348031234567"));
        assert_eq!(normalize_phone("233241234567", "233").as_deref(), Some("233241234567"));
    }

    #[test]
    fn test_separators_removed() {
        assert_eq!(normalize_phone(" 024.123.45-67 ", "233").as_deref(), Some("233241234567"));
    }

    #[test]
    fn test_rejects_letters_and_misplaced_plus() {
        assert_eq!(normalize_phone("024-CALL-NOW", "233"), None);
        assert_eq!(normalize_phone("0241+234567", "233"), None);
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(normalize_phone("12345", "233"), None);
        assert_eq!(normalize_phone("1234567890123456", "233"), None);
        assert_eq!(normalize_phone("123456789", "233").as_deref(), Some("123456789"));
    }

    #[test]
    fn test_blank() {
        assert_eq!(normalize_phone("   ", "233"), None);
    }
}
