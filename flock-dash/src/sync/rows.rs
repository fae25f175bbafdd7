//! Typed validation of spreadsheet rows
//!
//! Each parser turns recognised fields into a typed record or a
//! human-readable reason the row is invalid.

use std::collections::HashMap;

use chrono::NaiveDate;
use flock_common::db::models::{Gender, MemberStatus, PaymentMethod};
use flock_common::money::parse_amount_cents;
use flock_common::phone::normalize_phone;
use flock_common::time::parse_date;

use super::columns::Field;
use crate::db::members::MemberInput;
use crate::validation::clean_email;

/// Service type used when an attendance row has none
pub const DEFAULT_SERVICE_TYPE: &str = "Sunday Service";

/// Who a tithe or attendance row refers to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// A validated member row; `department` is a name still to be resolved
#[derive(Debug, Clone)]
pub struct MemberRow {
    pub input: MemberInput,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TitheRow {
    pub identity: Identity,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub identity: Identity,
    pub service_date: NaiveDate,
    pub service_type: String,
}

type Fields = HashMap<Field, String>;

fn get(fields: &Fields, field: Field) -> Option<&str> {
    fields.get(&field).map(String::as_str)
}

fn owned(fields: &Fields, field: Field) -> Option<String> {
    get(fields, field).map(str::to_string)
}

/// Split "Ama Serwaa Mensah" into ("Ama Serwaa", "Mensah")
pub fn split_full_name(full: &str) -> Option<(String, String)> {
    let words: Vec<&str> = full.split_whitespace().collect();
    match words.split_last() {
        Some((last, rest)) if !rest.is_empty() => Some((rest.join(" "), last.to_string())),
        _ => None,
    }
}

fn names(fields: &Fields) -> Result<(String, String), String> {
    match (get(fields, Field::FirstName), get(fields, Field::LastName)) {
        (Some(first), Some(last)) => Ok((first.to_string(), last.to_string())),
        _ => match get(fields, Field::FullName) {
            Some(full) => split_full_name(full)
                .ok_or_else(|| format!("name '{}' needs both a first and last name", full)),
            None => Err("name is required".to_string()),
        },
    }
}

fn phone(fields: &Fields, country_code: &str) -> Result<Option<String>, String> {
    match get(fields, Field::Phone) {
        None => Ok(None),
        Some(raw) => normalize_phone(raw, country_code)
            .map(Some)
            .ok_or_else(|| format!("invalid phone number '{}'", raw)),
    }
}

fn date(fields: &Fields, field: Field, label: &str) -> Result<Option<NaiveDate>, String> {
    match get(fields, field) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| format!("invalid {} '{}'", label, raw)),
    }
}

fn gender(raw: &str) -> Result<Gender, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "m" => Ok(Gender::Male),
        "f" => Ok(Gender::Female),
        _ => raw.parse().map_err(|_| format!("invalid gender '{}'", raw)),
    }
}

fn method(raw: &str) -> Result<PaymentMethod, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "momo" | "mobile" | "mm" => Ok(PaymentMethod::MobileMoney),
        "transfer" | "bank transfer" => Ok(PaymentMethod::Bank),
        "check" => Ok(PaymentMethod::Cheque),
        _ => raw.parse().map_err(|_| format!("invalid payment method '{}'", raw)),
    }
}

fn identity(fields: &Fields, country_code: &str) -> Result<Identity, String> {
    let phone = phone(fields, country_code)?;
    let full_name = match (get(fields, Field::FirstName), get(fields, Field::LastName)) {
        (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
        _ => owned(fields, Field::FullName),
    };
    if full_name.is_none() && phone.is_none() {
        return Err("member name or phone is required".to_string());
    }
    Ok(Identity { full_name, phone })
}

pub fn parse_member(fields: &Fields, country_code: &str) -> Result<MemberRow, String> {
    let (first_name, last_name) = names(fields)?;

    let email = clean_email(owned(fields, Field::Email)).map_err(|_| {
        format!("invalid email address '{}'", get(fields, Field::Email).unwrap_or_default())
    })?;

    let gender = get(fields, Field::Gender).map(gender).transpose()?;
    let status = get(fields, Field::Status)
        .map(|raw| raw.parse::<MemberStatus>().map_err(|_| format!("invalid status '{}'", raw)))
        .transpose()?;

    let input = MemberInput {
        first_name,
        last_name,
        phone: phone(fields, country_code)?,
        email,
        gender,
        date_of_birth: date(fields, Field::DateOfBirth, "date of birth")?,
        address: owned(fields, Field::Address),
        occupation: owned(fields, Field::Occupation),
        status,
        department_id: None,
        joined_on: date(fields, Field::JoinedOn, "join date")?,
    };

    Ok(MemberRow {
        input,
        department: owned(fields, Field::Department),
    })
}

pub fn parse_tithe(fields: &Fields, country_code: &str) -> Result<TitheRow, String> {
    let identity = identity(fields, country_code)?;

    let amount_cents = match get(fields, Field::Amount) {
        None => return Err("amount is required".to_string()),
        Some(raw) => parse_amount_cents(raw).map_err(|e| match e {
            flock_common::Error::InvalidInput(msg) => msg,
            other => other.to_string(),
        })?,
    };

    let paid_on = date(fields, Field::Date, "date")?.ok_or_else(|| "date is required".to_string())?;
    let method = get(fields, Field::Method)
        .map(method)
        .transpose()?
        .unwrap_or(PaymentMethod::Cash);

    Ok(TitheRow {
        identity,
        amount_cents,
        paid_on,
        method,
        reference: owned(fields, Field::Reference),
        notes: owned(fields, Field::Notes),
    })
}

pub fn parse_attendance(fields: &Fields, country_code: &str) -> Result<AttendanceRow, String> {
    let identity = identity(fields, country_code)?;
    let service_date = date(fields, Field::Date, "date")?.ok_or_else(|| "date is required".to_string())?;
    let service_type = owned(fields, Field::ServiceType).unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string());

    Ok(AttendanceRow {
        identity,
        service_date,
        service_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(Field, &str)]) -> Fields {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("Ama  Serwaa Mensah"),
            Some(("Ama Serwaa".to_string(), "Mensah".to_string()))
        );
        assert_eq!(split_full_name("Kofi"), None);
    }

    #[test]
    fn test_parse_member_full_row() {
        let row = parse_member(
            &fields(&[
                (Field::FullName, "Ama Mensah"),
                (Field::Phone, "024 123 4567"),
                (Field::Gender, "F"),
                (Field::DateOfBirth, "14/02/1990"),
                (Field::Status, "New Convert"),
                (Field::Department, "Choir"),
            ]),
            "233",
        )
        .unwrap();
        assert_eq!(row.input.first_name, "Ama");
        assert_eq!(row.input.last_name, "Mensah");
        assert_eq!(row.input.phone.as_deref(), Some("233241234567"));
        assert_eq!(row.input.gender, Some(Gender::Female));
        assert_eq!(row.input.date_of_birth, NaiveDate::from_ymd_opt(1990, 2, 14));
        assert_eq!(row.input.status, Some(MemberStatus::NewConvert));
        assert_eq!(row.department.as_deref(), Some("Choir"));
    }

    #[test]
    fn test_parse_member_first_last_columns_win() {
        let row = parse_member(
            &fields(&[
                (Field::FirstName, "Kwame"),
                (Field::LastName, "Asante"),
                (Field::FullName, "ignored value"),
            ]),
            "233",
        )
        .unwrap();
        assert_eq!(row.input.first_name, "Kwame");
        assert_eq!(row.input.last_name, "Asante");
    }

    #[test]
    fn test_parse_member_invalid_reasons() {
        let err = parse_member(&fields(&[(Field::Phone, "0241234567")]), "233").unwrap_err();
        assert_eq!(err, "name is required");

        let err = parse_member(&fields(&[(Field::FullName, "Ama Mensah"), (Field::Phone, "12ab")]), "233").unwrap_err();
        assert!(err.contains("invalid phone"));

        let err = parse_member(
            &fields(&[(Field::FullName, "Ama Mensah"), (Field::DateOfBirth, "31/31/1990")]),
            "233",
        )
        .unwrap_err();
        assert!(err.contains("date of birth"));

        let err = parse_member(&fields(&[(Field::FullName, "Ama Mensah"), (Field::Status, "member")]), "233").unwrap_err();
        assert!(err.contains("status"));
    }

    #[test]
    fn test_parse_tithe() {
        let row = parse_tithe(
            &fields(&[
                (Field::FullName, "Ama Mensah"),
                (Field::Amount, "GHS 1,200.50"),
                (Field::Date, "2024-03-03"),
                (Field::Method, "MoMo"),
            ]),
            "233",
        )
        .unwrap();
        assert_eq!(row.amount_cents, 120050);
        assert_eq!(row.method, PaymentMethod::MobileMoney);
        assert_eq!(row.identity.full_name.as_deref(), Some("Ama Mensah"));
    }

    #[test]
    fn test_parse_tithe_requires_amount_and_date() {
        let err = parse_tithe(&fields(&[(Field::FullName, "Ama Mensah"), (Field::Date, "2024-03-03")]), "233").unwrap_err();
        assert_eq!(err, "amount is required");

        let err = parse_tithe(&fields(&[(Field::FullName, "Ama Mensah"), (Field::Amount, "-5")]), "233").unwrap_err();
        assert!(err.contains("amount"));

        let err = parse_tithe(&fields(&[(Field::Amount, "50"), (Field::Date, "2024-03-03")]), "233").unwrap_err();
        assert!(err.contains("name or phone"));
    }

    #[test]
    fn test_parse_attendance_defaults_service_type() {
        let row = parse_attendance(&fields(&[(Field::Phone, "0241234567"), (Field::Date, "03 Mar 2024")]), "233").unwrap();
        assert_eq!(row.service_type, DEFAULT_SERVICE_TYPE);
        assert_eq!(row.service_date, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(row.identity.phone.as_deref(), Some("233241234567"));
    }
}
