//! File decoding: CSV and Excel workbooks to header-keyed rows

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::{debug, warn};

use crate::types::{CellValue, ImportRow};

use super::ImportError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Detect the format from the file extension, case-insensitive
    pub fn from_filename(filename: &str) -> Result<Self, ImportError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            _ => Err(ImportError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// Decode an uploaded file into data rows.
///
/// The format is checked before any parsing happens. A file without a single
/// non-blank data row is rejected with [`ImportError::EmptyFile`].
pub fn decode_file(filename: &str, content: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let format = FileFormat::from_filename(filename)?;

    let rows = match format {
        FileFormat::Csv => decode_csv(content)?,
        FileFormat::Xlsx | FileFormat::Xls => decode_workbook(content)?,
    };

    debug!("Decoded {} data rows from {} ({:?})", rows.len(), filename, format);

    if rows.is_empty() {
        return Err(ImportError::EmptyFile);
    }
    Ok(rows)
}

/// Semicolon wins only if the header has more of them than commas
fn detect_delimiter(content: &[u8]) -> u8 {
    let header = content.split(|b| *b == b'\n').next().unwrap_or_default();
    let commas = header.iter().filter(|b| **b == b',').count();
    let semicolons = header.iter().filter(|b| **b == b';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Fields are decoded lossily, so a stray non-UTF-8 byte (e.g. a Windows-1252
/// umlaut) only affects its own cell
fn decode_csv(content: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| ImportError::Parse(e.to_string()))?
        .iter()
        .map(lossy_text)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.byte_records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable CSV record {}: {}", idx + 1, e);
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        let mut row = ImportRow::new(line);
        for (header, value) in headers.iter().zip(record.iter()) {
            if header.is_empty() || row.get(header).is_some() {
                continue;
            }
            let cell = if value.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(lossy_text(value))
            };
            row.insert(header.as_str(), cell);
        }

        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(rows)
}

fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_workbook(content: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| ImportError::Parse(e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Parse("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ImportError::Parse(e.to_string()))?;

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut lines = range.rows();

    let headers: Vec<String> = match lines.next() {
        Some(cells) => cells.iter().map(|c| workbook_cell(c).to_text()).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (idx, cells) in lines.enumerate() {
        let mut row = ImportRow::new(first_row + idx + 2);
        for (header, cell) in headers.iter().zip(cells.iter()) {
            if header.is_empty() || row.get(header).is_some() {
                continue;
            }
            row.insert(header.as_str(), workbook_cell(cell));
        }

        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Numbers stay numeric, dates become day serials
fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension_is_case_insensitive() {
        assert_eq!(FileFormat::from_filename("agents.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("stats.Xlsx").unwrap(), FileFormat::Xlsx);
        assert_eq!(FileFormat::from_filename("old.xls").unwrap(), FileFormat::Xls);
    }

    #[test]
    fn test_unsupported_extensions_rejected() {
        assert!(matches!(
            FileFormat::from_filename("agents.txt"),
            Err(ImportError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::from_filename("agents"),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_format_checked_before_parsing() {
        let result = decode_file("agents.txt", b"\x00\x01 not a table");
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_csv_comma_separated() {
        let csv = "Agent Name,Gruppe,Status\nAlice,DE,aktiv\nBob,EN,off\n";
        let rows = decode_file("agents.csv", csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].get("Agent Name"), Some(&CellValue::Text("Alice".into())));
        assert_eq!(rows[1].get("Status"), Some(&CellValue::Text("off".into())));
    }

    #[test]
    fn test_csv_semicolon_separated_with_bom() {
        let csv = "\u{feff}Name;Gruppe\n Alice ; EN \n";
        let rows = decode_file("agents.csv", csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name"), Some(&CellValue::Text("Alice".into())));
        assert_eq!(rows[0].get("Gruppe"), Some(&CellValue::Text("EN".into())));
    }

    #[test]
    fn test_csv_skips_blank_lines_and_keeps_line_numbers() {
        let csv = "Name,Gruppe\nAlice,DE\n\n,\nBob,EN\n";
        let rows = decode_file("agents.csv", csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].line, 5);
    }

    #[test]
    fn test_csv_short_rows_tolerated() {
        let csv = "Name,Gruppe,Status\nAlice\n";
        let rows = decode_file("agents.csv", csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("Gruppe").is_none());
    }

    #[test]
    fn test_csv_invalid_utf8_only_affects_its_cell() {
        let csv = b"Agent Name;Gruppe;Status\nAlice;DE;aktiv\nM\xFCller;DE;aktiv\nBob;EN;off\n";
        let rows = decode_file("agents.csv", csv).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("Agent Name"), Some(&CellValue::Text("Alice".into())));
        assert_eq!(rows[1].get("Agent Name"), Some(&CellValue::Text("M\u{FFFD}ller".into())));
        assert_eq!(rows[1].get("Gruppe"), Some(&CellValue::Text("DE".into())));
        assert_eq!(rows[2].get("Status"), Some(&CellValue::Text("off".into())));
        assert_eq!(rows[2].line, 4);
    }

    #[test]
    fn test_header_only_csv_is_empty_file() {
        let result = decode_file("agents.csv", b"Name,Gruppe\n");
        assert!(matches!(result, Err(ImportError::EmptyFile)));
    }

    #[test]
    fn test_xlsx_keeps_numbers_numeric() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "team_name").unwrap();
        sheet.write_string(0, 1, "DateColumn").unwrap();
        sheet.write_string(1, 0, "Hotline").unwrap();
        sheet.write_number(1, 1, 45000.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = decode_file("stats.xlsx", &bytes).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].get("team_name"), Some(&CellValue::Text("Hotline".into())));
        assert_eq!(rows[0].get("DateColumn"), Some(&CellValue::Number(45000.0)));
    }

    #[test]
    fn test_garbage_workbook_is_parse_error() {
        let result = decode_file("stats.xlsx", b"definitely not a zip archive");
        assert!(matches!(result, Err(ImportError::Parse(_))));
    }
}
