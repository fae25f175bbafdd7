//! Money amounts in minor units
//!
//! All contributions and expenses are stored as integer cents.

use crate::{Error, Result};

/// Parse a human-entered amount into cents
///
/// Accepts thousands separators, up to two decimal places and a currency
/// code or symbol before or after the number. The amount must be positive.
///
/// # Examples
///
/// ```
/// use flock_common::money::parse_amount_cents;
///
/// assert_eq!(parse_amount_cents("1,200.50").unwrap(), 120050);
/// assert_eq!(parse_amount_cents("GHS 50.5").unwrap(), 5050);
/// assert!(parse_amount_cents("0").is_err());
/// ```
pub fn parse_amount_cents(raw: &str) -> Result<i64> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c: char| c.is_alphabetic() || c.is_whitespace() || "$₵€£₦".contains(c))
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Err(Error::InvalidInput(format!("amount '{}' is empty", raw.trim())));
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };

    let bad = || Error::InvalidInput(format!("amount '{}' is not a number", raw.trim()));

    if whole.is_empty() && fraction.is_empty() {
        return Err(bad());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    if fraction.len() > 2 {
        return Err(Error::InvalidInput(format!(
            "amount '{}' has more than two decimal places",
            raw.trim()
        )));
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    let fraction_value: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| bad())? * 10,
        _ => fraction.parse().map_err(|_| bad())?,
    };

    let cents = whole_value
        .checked_mul(100)
        .and_then(|v| v.checked_add(fraction_value))
        .ok_or_else(|| Error::InvalidInput(format!("amount '{}' is too large", raw.trim())))?;

    if cents <= 0 {
        return Err(Error::InvalidInput("amount must be greater than zero".to_string()));
    }

    Ok(cents)
}

/// Format cents as a plain decimal string (`"1200.50"`)
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integers() {
        assert_eq!(parse_amount_cents("50").unwrap(), 5000);
        assert_eq!(parse_amount_cents(" 1200 ").unwrap(), 120000);
    }

    #[test]
    fn test_decimals() {
        assert_eq!(parse_amount_cents("12.5").unwrap(), 1250);
        assert_eq!(parse_amount_cents("12.05").unwrap(), 1205);
        assert_eq!(parse_amount_cents(".75").unwrap(), 75);
    }

    #[test]
    fn test_currency_markers() {
        assert_eq!(parse_amount_cents("GH₵ 20").unwrap(), 2000);
        assert_eq!(parse_amount_cents("$3.10").unwrap(), 310);
        assert_eq!(parse_amount_cents("100 GHS").unwrap(), 10000);
    }

    #[test]
    fn test_rejections() {
        assert!(parse_amount_cents("").is_err());
        assert!(parse_amount_cents("abc").is_err());
        assert!(parse_amount_cents("1.234").is_err());
        assert!(parse_amount_cents("-5").is_err());
        assert!(parse_amount_cents("0.00").is_err());
        assert!(parse_amount_cents("1.2.3").is_err());
        assert!(parse_amount_cents(".").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_cents(120050), "1200.50");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-250), "-2.50");
    }
}
