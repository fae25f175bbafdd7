//! Spreadsheet header recognition
//!
//! Headers are matched case-insensitively after trimming and collapsing
//! punctuation, against a fixed alias table.

use std::collections::HashMap;

use flock_common::db::models::SyncDataset;
use serde_json::{Map, Value};

/// A column the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FullName,
    FirstName,
    LastName,
    Phone,
    Email,
    Gender,
    DateOfBirth,
    Address,
    Occupation,
    Status,
    Department,
    JoinedOn,
    Amount,
    Date,
    Method,
    Reference,
    Notes,
    ServiceType,
}

const ALIASES: &[(Field, &[&str])] = &[
    (Field::FullName, &["name", "full name", "fullname", "member", "member name"]),
    (Field::FirstName, &["first name", "firstname", "given name", "forename"]),
    (Field::LastName, &["last name", "lastname", "surname", "family name"]),
    (Field::Phone, &["phone", "phone number", "mobile", "mobile number", "contact", "telephone", "tel"]),
    (Field::Email, &["email", "e mail", "email address"]),
    (Field::Gender, &["gender", "sex"]),
    (Field::DateOfBirth, &["dob", "date of birth", "birthday", "birth date"]),
    (Field::Address, &["address", "residence", "location", "house address"]),
    (Field::Occupation, &["occupation", "profession", "job"]),
    (Field::Status, &["status", "membership status", "member status"]),
    (Field::Department, &["department", "ministry", "group"]),
    (Field::JoinedOn, &["joined", "joined on", "date joined", "join date", "membership date"]),
    (Field::Amount, &["amount", "tithe", "tithe amount", "value"]),
    (Field::Date, &["date", "paid on", "payment date", "service date", "attendance date"]),
    (Field::Method, &["method", "payment method", "mode", "channel"]),
    (Field::Reference, &["reference", "ref", "receipt", "receipt no", "transaction id"]),
    (Field::Notes, &["notes", "note", "remarks", "comment", "comments"]),
    (Field::ServiceType, &["service", "service type", "service name", "meeting"]),
];

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The field a header names, if any
pub fn field_for_header(header: &str) -> Option<Field> {
    let normalized = normalize_header(header);
    ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized.as_str()))
        .map(|(field, _)| *field)
}

/// Verify the header row carries what `dataset` needs
///
/// Returns a message naming the missing columns.
pub fn check_headers(dataset: SyncDataset, headers: &[String]) -> Result<(), String> {
    let present: Vec<Field> = headers.iter().filter_map(|h| field_for_header(h)).collect();
    let has = |f: Field| present.contains(&f);
    let has_name = has(Field::FullName) || (has(Field::FirstName) && has(Field::LastName));

    let mut missing = Vec::new();
    match dataset {
        SyncDataset::Members => {
            if !has_name {
                missing.push("name (or first name + last name)");
            }
        }
        SyncDataset::Tithes => {
            if !has_name && !has(Field::Phone) {
                missing.push("name or phone");
            }
            if !has(Field::Amount) {
                missing.push("amount");
            }
            if !has(Field::Date) {
                missing.push("date");
            }
        }
        SyncDataset::Attendance => {
            if !has_name && !has(Field::Phone) {
                missing.push("name or phone");
            }
            if !has(Field::Date) {
                missing.push("date");
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required column(s) for {}: {}", dataset, missing.join(", ")))
    }
}

/// Pair each header with its cell; short rows are padded with blanks
pub fn row_payload(headers: &[String], row: &[String]) -> Map<String, Value> {
    let mut payload = Map::new();
    for (i, header) in headers.iter().enumerate() {
        let header = header.trim();
        if header.is_empty() || payload.contains_key(header) {
            continue;
        }
        let cell = row.get(i).map(|c| c.trim()).unwrap_or_default();
        payload.insert(header.to_string(), Value::String(cell.to_string()));
    }
    payload
}

/// Whether every cell in the row is blank
pub fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Recognised, non-blank values of a payload
///
/// When two headers map to the same field, the first non-blank value in
/// header sort order wins.
pub fn extract_fields(payload: &Map<String, Value>) -> HashMap<Field, String> {
    let mut fields = HashMap::new();
    for (header, value) in payload {
        let Some(field) = field_for_header(header) else {
            continue;
        };
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if !text.is_empty() {
            fields.entry(field).or_insert(text);
        }
    }
    fields
}
