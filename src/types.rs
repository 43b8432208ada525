//! Core value types: metadata cells, severity and date parsing.
//!
//! Metadata columns are dynamic (any CSV column survives into the table),
//! so each value is a typed [`Cell`]. Field-level parse failures never
//! abort an operation: an unparsable date is simply "no date" and an
//! unparsable severity is [`Severity::Unknown`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Embedding vector type alias.
pub type Embedding = Vec<f32>;

/// Date formats accepted for case dates, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Datetime formats accepted for ledger timestamps and case dates.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A single metadata value.
///
/// Serialized with bincode inside the metadata table, so the variant order
/// is part of the on-disk format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point; may be non-finite on disk, never in JSON output.
    Float(f64),
    /// Free text.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
    /// List of text labels (e.g. tags stored as a list).
    List(Vec<String>),
}

impl Cell {
    /// Returns true for `Null` and NaN floats.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Returns the text content if this is a `Text` cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Interprets the cell as a calendar date.
    ///
    /// Text cells are parsed leniently; anything else yields `None`.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            Self::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Normalised join key used to match case ids across the metadata
    /// table and the ledgers.
    ///
    /// Integral numbers render without a fractional part so `1`, `1.0` and
    /// `"1"` all address the same case.
    pub fn case_key(&self) -> Option<String> {
        match self {
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) if f.is_finite() => Some(format_number_key(*f)),
            Self::Text(s) => {
                let key = normalize_case_key(s);
                (!key.is_empty()).then_some(key)
            }
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Plain string rendering (empty for null).
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Float(f) if f.is_nan() => String::new(),
            other => other.to_string(),
        }
    }

    /// Converts to a JSON value.
    ///
    /// Dates and datetimes become ISO-8601 strings; NaN and infinities
    /// become `null` so the output is always serializable.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Case severity on the fixed ordinal scale.
///
/// `Unknown` is a first-class value, not a parse failure: severity range
/// filters always let unknown cases through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Severity {
    /// Parsed, finite severity.
    Known(f64),
    /// Missing, unmapped or unparsable severity.
    Unknown,
}

impl Severity {
    /// Parses a metadata cell.
    pub fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Int(i) => Self::Known(*i as f64),
            Cell::Float(f) if f.is_finite() => Self::Known(*f),
            Cell::Text(s) => Self::from_label(s),
            _ => Self::Unknown,
        }
    }

    /// Parses a textual severity: a scale label or a number.
    ///
    /// Scale: low=1, medium=2, high=3, critical=4, major=5. The Japanese
    /// labels 低/中/高/重大 map onto the same scale.
    pub fn from_label(label: &str) -> Self {
        let s = label.trim();
        let mapped = match s.to_lowercase().as_str() {
            "low" | "低" => Some(1.0),
            "medium" | "中" => Some(2.0),
            "high" | "高" => Some(3.0),
            "critical" => Some(4.0),
            "major" | "重大" => Some(5.0),
            _ => None,
        };
        if let Some(v) = mapped {
            return Self::Known(v);
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Known(v),
            _ => Self::Unknown,
        }
    }

    /// Returns the numeric value, if known.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(*v),
            Self::Unknown => None,
        }
    }

    /// Returns true if the severity could not be determined.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Parses a date from the accepted date or datetime formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        // Compact YYYYMMDD; chrono's %Y is greedy so split by hand.
        let year = s[..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

/// Parses a timestamp. RFC 3339 values are converted to their local
/// wall-clock reading (offset dropped).
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Normalises a case id given as text.
pub fn normalize_case_key(raw: &str) -> String {
    let s = raw.trim();
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format_number_key(f),
        _ => s.to_string(),
    }
}

fn format_number_key(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
