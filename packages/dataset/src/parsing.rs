//! Cell-level parsing shared by the CSV loader and the relational store.
//!
//! Every parser returns `None` for values that are empty or unparseable so a
//! single bad cell never rejects an otherwise usable row.

use chrono::{NaiveDate, NaiveDateTime};

/// Timestamp layouts tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Date-only layouts, interpreted as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Header names recognized as the crash timestamp column.
const DATE_COLUMN_VARIANTS: &[&str] = &["CRASH_DATE", "CRASH DATE", "crash_date", "Crash Date"];

/// Returns a text cell verbatim, or `None` if it is empty.
///
/// Surrounding whitespace is kept, so `" BRONX"` and `"BRONX"` stay distinct
/// filter values.
#[must_use]
pub fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parses a crash timestamp in any of the supported layouts.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parses an integer written either as `"3"` or as a whole float `"3.0"`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }

    let float = value.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < 9.0e15 {
        Some(float as i64)
    } else {
        None
    }
}

/// Parses a finite float.
#[must_use]
pub fn parse_float(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parses a tri-state flag: `1/0`, `true/false`, `yes/no` (any case).
#[must_use]
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" => return Some(true),
        "false" | "no" | "n" => return Some(false),
        _ => {}
    }

    match parse_int(value)? {
        1 => Some(true),
        0 => Some(false),
        _ => None,
    }
}

/// Normalizes a header for matching: trimmed, upper-case, underscores as spaces.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    header.trim().to_ascii_uppercase().replace('_', " ")
}

/// Finds the crash timestamp column among `headers`.
///
/// Known variants win; otherwise the first header containing `date`
/// (any case) is used.
#[must_use]
pub fn find_date_column<S: AsRef<str>>(headers: &[S]) -> Option<usize> {
    headers
        .iter()
        .position(|h| {
            DATE_COLUMN_VARIANTS
                .iter()
                .any(|v| v.eq_ignore_ascii_case(h.as_ref().trim()))
        })
        .or_else(|| {
            headers
                .iter()
                .position(|h| h.as_ref().to_ascii_lowercase().contains("date"))
        })
}
