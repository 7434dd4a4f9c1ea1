//! Import types: raw spreadsheet rows, per-row issues and the run outcome

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a typed record cannot be built from its fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("required field '{0}' is missing or empty")]
    MissingField(&'static str),
    #[error("field '{0}' has an unexpected type")]
    WrongType(&'static str),
}

/// A single raw cell as produced by the CSV / workbook decoder
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Empty cells and whitespace-only text count as "not present"
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell the way it would appear in a text column
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One header-keyed input line
#[derive(Debug, Clone, Default)]
pub struct ImportRow {
    /// 1-based line number in the source file (header is line 1)
    pub line: usize,
    cells: HashMap<String, CellValue>,
}

impl ImportRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: HashMap::new(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.insert(column.into(), value);
    }

    /// Builder-style insert, handy when assembling rows by hand
    pub fn with(mut self, column: &str, value: impl Into<CellValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// First non-blank value among `aliases`, scanned in priority order
    pub fn first_present(&self, aliases: &[&str]) -> Option<(&str, &CellValue)> {
        aliases.iter().find_map(|alias| {
            self.cells
                .get_key_value(*alias)
                .filter(|(_, value)| !value.is_blank())
                .map(|(column, value)| (column.as_str(), value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

/// Import issue level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportIssueLevel {
    Info,
    Warning,
    Error,
}

/// Single import issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportIssue {
    pub row_number: i32,
    pub level: ImportIssueLevel,
    pub field: String,
    pub message: String,
    pub original_value: Option<String>,
}

impl ImportIssue {
    pub fn warning(row: usize, field: &str, message: impl Into<String>, original: Option<String>) -> Self {
        Self {
            row_number: row as i32,
            level: ImportIssueLevel::Warning,
            field: field.to_string(),
            message: message.into(),
            original_value: original,
        }
    }

    pub fn error(row: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            row_number: row as i32,
            level: ImportIssueLevel::Error,
            field: field.to_string(),
            message: message.into(),
            original_value: None,
        }
    }
}

/// Per-run import accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub inserted: u32,
    pub updated: u32,
    /// Matched an existing row with identical content, no write issued
    pub unchanged: u32,
    /// Rejected before reaching the store (missing natural-key fields)
    pub skipped: u32,
    /// Lookup or write failed at the store
    pub errored: u32,
    pub issues: Vec<ImportIssue>,
}

impl ImportOutcome {
    pub fn processed(&self) -> u32 {
        self.inserted + self.updated + self.unchanged + self.skipped + self.errored
    }

    pub fn summary(&self) -> String {
        format!(
            "Import abgeschlossen: {} neu importiert, {} aktualisiert, {} unverändert, {} übersprungen, {} Fehler",
            self.inserted, self.updated, self.unchanged, self.skipped, self.errored
        )
    }
}

/// File upload over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFileRequest {
    pub filename: String,
    pub content_base64: String,
}

/// Reply to an import request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        Self {
            message: outcome.summary(),
            outcome,
        }
    }
}
