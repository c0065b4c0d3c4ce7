use chrono::{NaiveDate, NaiveDateTime};

use crate::model::CellValue;

static DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

static DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn is_missing(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed.eq_ignore_ascii_case("nat")
}

/// Decodes a cell that the source already typed as text. Only dates are promoted.
pub(crate) fn parse_text_cell(value: &str) -> CellValue {
    let trimmed = value.trim();
    if is_missing(trimmed) {
        return CellValue::Null;
    }
    match parse_timestamp(trimmed) {
        Some(dt) => CellValue::DateTime(dt),
        None => CellValue::Text(trimmed.to_string()),
    }
}

/// Decodes an untyped CSV field.
pub(crate) fn parse_csv_cell(value: &str) -> CellValue {
    let trimmed = value.trim();
    if is_missing(trimmed) {
        return CellValue::Null;
    }
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return CellValue::Integer(parsed);
    }
    if let Ok(parsed) = trimmed.parse::<f64>() {
        if parsed.is_finite() {
            return CellValue::Float(parsed);
        }
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    parse_text_cell(trimmed)
}

pub(crate) fn header_name(value: &str) -> String {
    value.trim().to_string()
}
