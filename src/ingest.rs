//! Turns an uploaded workbook into an ordered list of [`RawRecord`]s.

use crate::config::DEFAULT_MAX_RECORDS;
use crate::error::{IngestError, IngestResult};
use crate::record::RawRecord;
use crate::sheet_parser::{self, SheetGrid};
use tracing::{debug, info};

/// Records extracted from the first sheet of a workbook.
#[derive(Debug, Clone)]
pub struct IngestedSheet {
    pub sheet_name: String,
    pub headers: Vec<String>,
    /// Source order preserved; row numbers are derived from positions here.
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone)]
pub struct TabularFileIngestor {
    max_records: usize,
}

impl Default for TabularFileIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl TabularFileIngestor {
    pub fn new(max_records: usize) -> Self {
        Self { max_records }
    }

    /// Decode `data` and shape its first sheet into records.
    pub fn ingest(&self, filename: &str, data: &[u8]) -> IngestResult<IngestedSheet> {
        info!("Analizando estructura de {} ({} bytes)", filename, data.len());
        let grid = sheet_parser::parse_first_sheet(filename, data)?;
        self.ingest_sheet(grid)
    }

    /// Shape an already decoded sheet. `None` means the workbook had no sheets.
    pub fn ingest_sheet(&self, grid: Option<SheetGrid>) -> IngestResult<IngestedSheet> {
        let grid = grid.ok_or(IngestError::EmptyWorkbook)?;

        info!("Extrayendo datos de la hoja '{}'", grid.name);
        let mut rows = grid.rows.into_iter();
        let headers = rows.next().ok_or(IngestError::NoData)?;

        let data_rows: Vec<Vec<String>> = rows.filter(|row| !is_blank_row(row)).collect();
        debug!("{} non-blank data rows under {} headers", data_rows.len(), headers.len());

        if data_rows.is_empty() {
            return Err(IngestError::NoData);
        }
        if data_rows.len() > self.max_records {
            return Err(IngestError::RecordLimitExceeded {
                count: data_rows.len(),
                limit: self.max_records,
            });
        }

        let records = data_rows
            .iter()
            .map(|row| RawRecord::from_row(&headers, row))
            .collect();

        Ok(IngestedSheet {
            sheet_name: grid.name,
            headers,
            records,
        })
    }
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}
