//! Schema-driven row normalization.
//!
//! A [`Schema`] lists the destination fields of one record type. Each
//! [`FieldSpec`] carries its accepted source column names in priority order,
//! a coercion rule and a default. [`normalize_row`] resolves every field of
//! one [`ImportRow`] and never fails: unusable values fall back to the field
//! default and are reported as warnings.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

use crate::types::{CellValue, ImportIssue, ImportRow, RecordError};

/// How a raw cell is turned into a typed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Trimmed text
    Text,
    /// Leading integer, 0 when nothing parses
    Integer,
    /// `on` (case-insensitive) is true, anything else is false
    Flag { on: &'static str, off: &'static str },
    /// Spreadsheet day serial or textual date, today when unusable
    SerialDate,
    /// Spreadsheet fraction of a day to seconds, text passes through
    TimeGroup,
}

/// Value used when no alias yields a non-blank cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Text(&'static str),
    Integer(i64),
    Flag(bool),
    Today,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub coercion: Coercion,
    pub default: FieldDefault,
    /// Natural-key text field that must be non-empty
    pub required: bool,
}

impl FieldSpec {
    pub const fn key_text(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::Text,
            default: FieldDefault::Text(""),
            required: true,
        }
    }

    pub const fn text(name: &'static str, aliases: &'static [&'static str], default: &'static str) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::Text,
            default: FieldDefault::Text(default),
            required: false,
        }
    }

    pub const fn integer(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::Integer,
            default: FieldDefault::Integer(0),
            required: false,
        }
    }

    pub const fn flag(
        name: &'static str,
        aliases: &'static [&'static str],
        on: &'static str,
        off: &'static str,
        default: bool,
    ) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::Flag { on, off },
            default: FieldDefault::Flag(default),
            required: false,
        }
    }

    pub const fn date(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::SerialDate,
            default: FieldDefault::Today,
            required: false,
        }
    }

    pub const fn time_group(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            coercion: Coercion::TimeGroup,
            default: FieldDefault::Text(""),
            required: false,
        }
    }
}

/// Destination schema of one record type
#[derive(Debug)]
pub struct Schema {
    pub kind: &'static str,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Flag(bool),
    Date(NaiveDate),
}

/// Resolved field values of one row, keyed by destination field name
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    values: HashMap<&'static str, FieldValue>,
}

impl FieldMap {
    fn get(&self, name: &'static str) -> Result<&FieldValue, RecordError> {
        self.values.get(name).ok_or(RecordError::MissingField(name))
    }

    pub fn text(&self, name: &'static str) -> Result<&str, RecordError> {
        match self.get(name)? {
            FieldValue::Text(s) => Ok(s),
            _ => Err(RecordError::WrongType(name)),
        }
    }

    pub fn integer(&self, name: &'static str) -> Result<i64, RecordError> {
        match self.get(name)? {
            FieldValue::Integer(i) => Ok(*i),
            _ => Err(RecordError::WrongType(name)),
        }
    }

    pub fn flag(&self, name: &'static str) -> Result<bool, RecordError> {
        match self.get(name)? {
            FieldValue::Flag(b) => Ok(*b),
            _ => Err(RecordError::WrongType(name)),
        }
    }

    pub fn date(&self, name: &'static str) -> Result<NaiveDate, RecordError> {
        match self.get(name)? {
            FieldValue::Date(d) => Ok(*d),
            _ => Err(RecordError::WrongType(name)),
        }
    }
}

/// Output of [`normalize_row`]
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub line: usize,
    pub fields: FieldMap,
    /// Required fields left empty after normalization
    pub missing: Vec<&'static str>,
    pub issues: Vec<ImportIssue>,
}

impl NormalizedRow {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn normalize_row(row: &ImportRow, schema: &Schema, today: NaiveDate) -> NormalizedRow {
    let mut fields = FieldMap::default();
    let mut missing = Vec::new();
    let mut issues = Vec::new();

    for field_spec in schema.fields {
        let value = match row.first_present(field_spec.aliases) {
            Some((_, cell)) => {
                let (value, warning) = coerce(cell, field_spec.coercion, today);
                if let Some(message) = warning {
                    issues.push(ImportIssue::warning(row.line, field_spec.name, message, Some(cell.to_text())));
                }
                value
            }
            None => default_value(field_spec.default, today),
        };

        if field_spec.required && matches!(&value, FieldValue::Text(s) if s.is_empty()) {
            missing.push(field_spec.name);
        }
        fields.values.insert(field_spec.name, value);
    }

    NormalizedRow {
        line: row.line,
        fields,
        missing,
        issues,
    }
}

fn default_value(default: FieldDefault, today: NaiveDate) -> FieldValue {
    match default {
        FieldDefault::Text(s) => FieldValue::Text(s.to_string()),
        FieldDefault::Integer(i) => FieldValue::Integer(i),
        FieldDefault::Flag(b) => FieldValue::Flag(b),
        FieldDefault::Today => FieldValue::Date(today),
    }
}

/// Coerce one non-blank cell. The second element is a warning when the
/// value had to be replaced.
fn coerce(cell: &CellValue, coercion: Coercion, today: NaiveDate) -> (FieldValue, Option<String>) {
    match coercion {
        Coercion::Text => (FieldValue::Text(cell.to_text()), None),
        Coercion::Integer => match coerce_integer(cell) {
            Some(i) => (FieldValue::Integer(i), None),
            None => (FieldValue::Integer(0), Some("not a number, using 0".to_string())),
        },
        Coercion::Flag { on, off } => {
            let text = cell.to_text();
            if text.eq_ignore_ascii_case(on) {
                (FieldValue::Flag(true), None)
            } else if text.eq_ignore_ascii_case(off) {
                (FieldValue::Flag(false), None)
            } else {
                (FieldValue::Flag(false), Some(format!("unknown value, treated as '{}'", off)))
            }
        }
        Coercion::SerialDate => match coerce_date(cell) {
            Some(date) => (FieldValue::Date(date), None),
            None => (
                FieldValue::Date(today),
                Some(format!("unparseable date, using {}", today)),
            ),
        },
        Coercion::TimeGroup => (FieldValue::Text(coerce_time_group(cell)), None),
    }
}

fn coerce_integer(cell: &CellValue) -> Option<i64> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Some(n.trunc() as i64),
        CellValue::Number(_) => None,
        CellValue::Bool(b) => Some(*b as i64),
        CellValue::Text(s) => parse_leading_int(s),
        CellValue::Empty => Some(0),
    }
}

/// Integer prefix of `s` ("12abc" -> 12, "-3.9" -> -3), `None` without digits
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

fn coerce_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => {
            let s = s.trim();
            parse_text_date(s).or_else(|| s.parse::<f64>().ok().and_then(serial_to_date))
        }
        _ => None,
    }
}

fn parse_text_date(s: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Spreadsheet day serial to calendar date, fractional part ignored.
///
/// Serials follow the 1900 date system including its phantom 1900-02-29
/// (serial 60), which has no calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let days = serial.trunc() as u64;
    let (origin, offset) = match days {
        60 => return None,
        d if d < 60 => (NaiveDate::from_ymd_opt(1899, 12, 31)?, d),
        d => (NaiveDate::from_ymd_opt(1899, 12, 30)?, d),
    };
    origin.checked_add_days(Days::new(offset))
}

/// Day fraction to whole seconds of day, text passes through trimmed
fn coerce_time_group(cell: &CellValue) -> String {
    match cell {
        CellValue::Number(n) => format!("{}", (n * 86_400.0).round() as i64),
        other => other.to_text(),
    }
}
