//! Excel export of call statistics

use chrono::{DateTime, TimeZone};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::debug;

use crate::types::CallStatistic;

pub const SHEET_NAME: &str = "Anrufstatistiken";

/// Exportable columns in default order. Same spelling as the import headers,
/// so an exported file can be imported again.
pub const EXPORT_COLUMNS: &[&str] = &[
    "team_name",
    "last_name",
    "first_name",
    "DateColumn",
    "not_ready_reason",
    "not_ready_time",
    "total_ready_time",
    "total_ringing_time_in",
    "total_ringing_time_out",
    "total_login_time",
    "total_acw_time_in",
    "total_acw_time_out",
    "total_hold_time_in",
    "total_hold_time_out",
    "total_talk_time_in",
    "total_talk_time_out",
    "num_calls_answered",
    "num_calls_answered_ot",
    "num_calls_out",
    "num_calls_rejected",
    "service_name",
    "TimeGroupColumn30",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Keine Daten zum Exportieren vorhanden")]
    NoData,
    #[error("Unbekannte Spalte: {0}")]
    UnknownColumn(String),
    #[error("Excel-Datei konnte nicht erstellt werden: {0}")]
    Xlsx(#[from] XlsxError),
}

impl ExportError {
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::NoData => "NOT_FOUND",
            ExportError::UnknownColumn(_) => "INVALID_REQUEST",
            ExportError::Xlsx(_) => "EXPORT_ERROR",
        }
    }
}

/// A finished export file
#[derive(Debug)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub row_count: u32,
}

/// One cell of an export sheet
pub(crate) enum ExportCell {
    Text(String),
    Number(i64),
    /// Written with two decimals
    Decimal(f64),
}

impl ExportCell {
    fn width(&self) -> usize {
        match self {
            ExportCell::Text(s) => s.chars().count(),
            ExportCell::Number(n) => n.to_string().len(),
            ExportCell::Decimal(d) => format!("{:.2}", d).len(),
        }
    }
}

/// Match the selection against [`EXPORT_COLUMNS`], case-insensitive.
/// An empty selection means every column.
pub fn resolve_columns(selected: &[String]) -> Result<Vec<&'static str>, ExportError> {
    if selected.is_empty() {
        return Ok(EXPORT_COLUMNS.to_vec());
    }

    selected
        .iter()
        .map(|name| {
            EXPORT_COLUMNS
                .iter()
                .copied()
                .find(|column| column.eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| ExportError::UnknownColumn(name.clone()))
        })
        .collect()
}

/// `Gefilterte_Anrufstatistiken_19.10.2026_14-05.xlsx`
pub fn export_filename<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Gefilterte_{}_{}.xlsx", SHEET_NAME, now.format("%d.%m.%Y_%H-%M"))
}

fn cell(stat: &CallStatistic, column: &str) -> ExportCell {
    let m = &stat.metrics;
    match column {
        "team_name" => ExportCell::Text(stat.key.team_name.clone()),
        "last_name" => ExportCell::Text(stat.key.last_name.clone()),
        "first_name" => ExportCell::Text(stat.key.first_name.clone()),
        "DateColumn" => ExportCell::Text(stat.key.date.format("%Y-%m-%d").to_string()),
        "not_ready_reason" => ExportCell::Text(m.not_ready_reason.clone()),
        "not_ready_time" => ExportCell::Number(m.not_ready_time),
        "total_ready_time" => ExportCell::Number(m.total_ready_time),
        "total_ringing_time_in" => ExportCell::Number(m.total_ringing_time_in),
        "total_ringing_time_out" => ExportCell::Number(m.total_ringing_time_out),
        "total_login_time" => ExportCell::Number(m.total_login_time),
        "total_acw_time_in" => ExportCell::Number(m.total_acw_time_in),
        "total_acw_time_out" => ExportCell::Number(m.total_acw_time_out),
        "total_hold_time_in" => ExportCell::Number(m.total_hold_time_in),
        "total_hold_time_out" => ExportCell::Number(m.total_hold_time_out),
        "total_talk_time_in" => ExportCell::Number(m.total_talk_time_in),
        "total_talk_time_out" => ExportCell::Number(m.total_talk_time_out),
        "num_calls_answered" => ExportCell::Number(m.num_calls_answered),
        "num_calls_answered_ot" => ExportCell::Number(m.num_calls_answered_ot),
        "num_calls_out" => ExportCell::Number(m.num_calls_out),
        "num_calls_rejected" => ExportCell::Number(m.num_calls_rejected),
        "service_name" => ExportCell::Text(m.service_name.clone()),
        "TimeGroupColumn30" => ExportCell::Text(m.time_group_column30.clone()),
        _ => ExportCell::Text(String::new()),
    }
}

/// Write one sheet with a header row and one row per record
pub fn build_workbook(stats: &[CallStatistic], columns: &[&str]) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<Vec<ExportCell>> = stats
        .iter()
        .map(|stat| columns.iter().map(|column| cell(stat, column)).collect())
        .collect();

    write_sheet(SHEET_NAME, columns, &rows)
}

/// Single-sheet workbook; column widths follow the longest header or value
pub(crate) fn write_sheet(name: &str, headers: &[&str], rows: &[Vec<ExportCell>]) -> Result<Vec<u8>, ExportError> {
    if rows.is_empty() {
        return Err(ExportError::NoData);
    }

    let mut workbook = Workbook::new();
    let decimal = Format::new().set_num_format("0.00");
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    let mut widths: Vec<usize> = headers.iter().map(|c| c.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }

    for (idx, cells) in rows.iter().enumerate() {
        let row = idx as u32 + 1;
        for (col, value) in cells.iter().enumerate().take(headers.len()) {
            widths[col] = widths[col].max(value.width());
            match value {
                ExportCell::Text(text) => sheet.write_string(row, col as u16, text)?,
                ExportCell::Number(n) => sheet.write_number(row, col as u16, *n as f64)?,
                ExportCell::Decimal(d) => sheet.write_number_with_format(row, col as u16, *d, &decimal)?,
            };
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width as f64)?;
    }

    let bytes = workbook.save_to_buffer()?;
    debug!("Built {} workbook: {} rows, {} columns, {} bytes", name, rows.len(), headers.len(), bytes.len());
    Ok(bytes)
}

/// Resolve columns, build the workbook and name the file
pub fn export_statistics<Tz: TimeZone>(
    stats: &[CallStatistic],
    selected: &[String],
    now: &DateTime<Tz>,
) -> Result<ExportFile, ExportError>
where
    Tz::Offset: std::fmt::Display,
{
    let columns = resolve_columns(selected)?;
    let bytes = build_workbook(stats, &columns)?;

    Ok(ExportFile {
        filename: export_filename(now),
        bytes,
        row_count: stats.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import::decode::decode_file;
    use crate::types::{CallMetrics, CallStatisticKey, CellValue};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn stat(last_name: &str, answered: i64) -> CallStatistic {
        CallStatistic {
            id: Uuid::new_v4(),
            key: CallStatisticKey {
                team_name: "Hotline".into(),
                last_name: last_name.into(),
                first_name: "Anna".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            },
            metrics: CallMetrics {
                num_calls_answered: answered,
                service_name: "Inbound DE".into(),
                ..Default::default()
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_filename_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap();
        assert_eq!(export_filename(&now), "Gefilterte_Anrufstatistiken_19.10.2026_14-05.xlsx");
    }

    #[test]
    fn test_empty_selection_means_all_columns() {
        assert_eq!(resolve_columns(&[]).unwrap().len(), EXPORT_COLUMNS.len());
    }

    #[test]
    fn test_selection_keeps_order_and_ignores_case() {
        let columns = resolve_columns(&["service_name".into(), "datecolumn".into()]).unwrap();
        assert_eq!(columns, vec!["service_name", "DateColumn"]);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = resolve_columns(&["salary".into()]).unwrap_err();
        assert!(matches!(err, ExportError::UnknownColumn(ref c) if c == "salary"));
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_zero_records_is_no_data() {
        let err = build_workbook(&[], EXPORT_COLUMNS).unwrap_err();
        assert!(matches!(err, ExportError::NoData));
    }

    #[test]
    fn test_exported_sheet_reads_back_with_selected_columns() {
        let stats = vec![stat("Meier", 12), stat("Schulz", 7)];
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 0).unwrap();
        let file = export_statistics(
            &stats,
            &["last_name".into(), "DateColumn".into(), "num_calls_answered".into()],
            &now,
        )
        .unwrap();

        assert_eq!(file.row_count, 2);
        let rows = decode_file(&file.filename, &file.bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("last_name"), Some(&CellValue::Text("Meier".into())));
        assert_eq!(rows[0].get("DateColumn"), Some(&CellValue::Text("2024-05-02".into())));
        assert_eq!(rows[1].get("num_calls_answered"), Some(&CellValue::Number(7.0)));
        assert!(rows[0].get("service_name").is_none());
    }
}
