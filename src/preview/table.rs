use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Reader};
use chrono::NaiveTime;
use std::io::Cursor;
use tracing::warn;

use super::{CellValue, PreviewResult};
use crate::error::BrowseError;

/// Data rows returned to the viewer, header excluded.
pub const TABLE_PREVIEW_ROWS: usize = 100;

/// Infer a typed cell from CSV text: null, integer, float, boolean, then string.
pub fn infer_cell(raw: &str) -> CellValue {
    let value = raw.trim();
    if value.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = value.parse::<i64>() {
        return CellValue::Int(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        if f.is_finite() {
            return CellValue::Float(f);
        }
    }
    if value.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    CellValue::Text(raw.to_string())
}

fn pad_row(mut row: Vec<CellValue>, width: usize) -> Vec<CellValue> {
    if row.len() < width {
        row.resize(width, CellValue::Null);
    }
    row
}

pub fn preview_csv(body: &[u8]) -> Result<PreviewResult, BrowseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| BrowseError::Decode(format!("unreadable CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        return Err(BrowseError::Decode("CSV file has no header row".into()));
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        if rows.len() >= TABLE_PREVIEW_ROWS {
            break;
        }
        match record {
            Ok(record) => rows.push(pad_row(record.iter().map(infer_cell).collect(), columns.len())),
            // +2: one for the header, one for 1-based line numbers
            Err(e) => warn!("Skipping malformed CSV row {}: {}", index + 2, e),
        }
    }

    Ok(PreviewResult::Csv { columns, rows })
}

/// Largest float that still converts to an integer exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Workbooks store every number as a float; whole numbers read back as
/// integers so a sheet and the same data exported to CSV type alike.
fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_INT => {
            CellValue::Int(*f as i64)
        }
        Data::Float(f) if f.is_finite() => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => date_cell(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

fn date_cell(dt: &ExcelDateTime) -> CellValue {
    if dt.is_duration() {
        return CellValue::Float(dt.as_f64());
    }
    match dt.as_datetime() {
        Some(when) if when.time() == NaiveTime::MIN => {
            CellValue::Text(when.format("%Y-%m-%d").to_string())
        }
        Some(when) => CellValue::Text(when.format("%Y-%m-%dT%H:%M:%S").to_string()),
        None => CellValue::Float(dt.as_f64()),
    }
}

/// First worksheet of an xlsx/xls/ods workbook, shaped like a CSV preview.
pub fn preview_spreadsheet(body: &[u8]) -> Result<PreviewResult, BrowseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(body.to_vec()))
        .map_err(|e| BrowseError::Decode(format!("unreadable workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BrowseError::Decode("workbook has no worksheets".into()))?
        .map_err(|e| BrowseError::Decode(format!("unreadable worksheet: {e}")))?;

    let mut sheet_rows = range.rows();
    let columns: Vec<String> = match sheet_rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell_from_data(cell) {
                CellValue::Null => format!("Column {}", i + 1),
                CellValue::Text(text) => text,
                CellValue::Int(n) => n.to_string(),
                CellValue::Float(f) => f.to_string(),
                CellValue::Bool(b) => b.to_string(),
            })
            .collect(),
        None => Vec::new(),
    };

    let rows = sheet_rows
        .take(TABLE_PREVIEW_ROWS)
        .map(|row| pad_row(row.iter().map(cell_from_data).collect(), columns.len()))
        .collect();

    Ok(PreviewResult::Xlsx { columns, rows })
}
