//! Workbook decoding for uploads: Excel (.xlsx/.xls) and CSV.
//!
//! Only the first worksheet is read. Rows come back exactly as they appear in
//! the sheet (blank rows included); shaping them into records is the job of
//! [`crate::ingest`].

use crate::error::{IngestError, IngestResult};
use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use chrono::{NaiveDate, TimeDelta};
use std::io::{Cursor, Read, Seek};

/// The first sheet of a workbook as a grid of strings. Row 0 is the header row.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Lowercased extension of a file name, without the dot.
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Decode the first sheet of `data`, dispatching on the file extension.
///
/// Returns `Ok(None)` when the workbook opens but contains no sheets.
pub fn parse_first_sheet(filename: &str, data: &[u8]) -> IngestResult<Option<SheetGrid>> {
    let ext = file_extension(filename);

    match ext.as_str() {
        "csv" => parse_csv(filename, data).map(Some),
        "xlsx" => {
            let workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(data))
                .map_err(|e: calamine::XlsxError| IngestError::Workbook(e.to_string()))?;
            first_sheet(workbook)
        }
        "xls" => {
            let workbook: Xls<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(data))
                .map_err(|e: calamine::XlsError| IngestError::Workbook(e.to_string()))?;
            first_sheet(workbook)
        }
        _ => Err(IngestError::UnsupportedFormat(
            ext,
            ".xlsx, .xls, .csv".to_string(),
        )),
    }
}

fn first_sheet<RS, R>(mut workbook: R) -> IngestResult<Option<SheetGrid>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let name = match workbook.sheet_names().first() {
        Some(name) => name.clone(),
        None => return Ok(None),
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| IngestError::Workbook(format!("hoja '{}': {}", name, e)))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok(Some(SheetGrid { name, rows }))
}

/// Parse a CSV file. The first record is the header row.
fn parse_csv(filename: &str, data: &[u8]) -> IngestResult<SheetGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(data);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();

    Ok(SheetGrid { name, rows })
}

/// Convert a calamine cell to the text a user would see in the sheet.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Whole numbers print without a trailing ".0", so numeric radicados survive.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{:.0}", f)
    } else {
        format!("{}", f)
    }
}

/// Convert an Excel serial date to `YYYY-MM-DD` (or with time when present).
///
/// Serial 60 is the phantom 1900-02-29; serials after it are shifted by one day.
/// Serials outside chrono's range are printed as plain numbers.
fn excel_serial_to_string(serial: f64) -> String {
    let days = serial.trunc() as i64;
    let secs = ((serial - serial.trunc()) * 86_400.0).round() as i64;

    let epoch = if days > 59 {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    };
    let date = epoch.and_then(|d| TimeDelta::try_days(days).and_then(|delta| d.checked_add_signed(delta)));
    let Some(date) = date else {
        return format!("{}", serial);
    };

    if secs == 0 {
        date.format("%Y-%m-%d").to_string()
    } else {
        let datetime = date
            .and_hms_opt(0, 0, 0)
            .zip(TimeDelta::try_seconds(secs))
            .and_then(|(dt, delta)| dt.checked_add_signed(delta));
        match datetime {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => date.format("%Y-%m-%d").to_string(),
        }
    }
}
