//! Batch validation of ingested records against the radicado key field.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{IntakeConfig, DEFAULT_ERROR_CAP, DEFAULT_KEY_ALIASES, DEFAULT_MIN_YEAR};
use crate::record::{FieldAliases, RawRecord};
use crate::rules::{batch_radicado_rule, YearWindow};

pub const MISSING_KEY_ERROR: &str = "Número de radicado faltante";
pub const DUPLICATE_KEY_ERROR: &str = "Número de radicado duplicado";

/// Row numbers start at 2: row 1 of the sheet is the header.
pub const FIRST_DATA_ROW: usize = 2;

/// Verdict for one ingested record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_number: usize,
    pub fields_checked: RawRecord,
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

/// Aggregate counts over a batch. `valid_rows + invalid_rows == total_rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    /// Distinct radicado values seen more than once.
    pub duplicate_count: usize,
    pub errors: Vec<RowError>,
    pub has_more_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub outcomes: Vec<RowOutcome>,
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    key_aliases: FieldAliases,
    min_year: i32,
    /// Fixed window; when unset the window follows the calendar.
    pinned_years: Option<YearWindow>,
    error_cap: usize,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self {
            key_aliases: FieldAliases::new(DEFAULT_KEY_ALIASES),
            min_year: DEFAULT_MIN_YEAR,
            pinned_years: None,
            error_cap: DEFAULT_ERROR_CAP,
        }
    }
}

impl RecordValidator {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            key_aliases: FieldAliases::new(config.key_aliases.iter().cloned()),
            min_year: config.min_year,
            pinned_years: None,
            error_cap: config.error_cap,
        }
    }

    /// Pin the accepted year range.
    #[cfg(test)]
    pub fn with_year_window(mut self, years: YearWindow) -> Self {
        self.pinned_years = Some(years);
        self
    }

    /// Window used by the next `validate` call.
    fn years(&self) -> YearWindow {
        self.pinned_years
            .unwrap_or_else(|| YearWindow::current(self.min_year))
    }

    /// Validate every record in order. Never fails; bad rows become data.
    pub fn validate(&self, records: &[RawRecord]) -> ValidationReport {
        info!("Validando números de radicado ({} filas)", records.len());

        let years = self.years();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut duplicates: HashSet<&str> = HashSet::new();
        let mut outcomes = Vec::with_capacity(records.len());
        let mut errors = Vec::new();
        let mut error_total = 0usize;
        let mut valid_rows = 0usize;

        for (index, record) in records.iter().enumerate() {
            let row_number = index + FIRST_DATA_ROW;
            let error = self.check_record(record, years, &mut seen, &mut duplicates);

            match &error {
                None => valid_rows += 1,
                Some(message) => {
                    error_total += 1;
                    if errors.len() < self.error_cap {
                        errors.push(RowError {
                            row: row_number,
                            error: message.clone(),
                        });
                    }
                }
            }

            outcomes.push(RowOutcome {
                row_number,
                fields_checked: record.clone(),
                valid: error.is_none(),
                error,
            });
        }

        let summary = ValidationSummary {
            total_rows: records.len(),
            valid_rows,
            invalid_rows: error_total,
            duplicate_count: duplicates.len(),
            errors,
            has_more_errors: error_total > self.error_cap,
        };

        debug!(
            "Validation: {} valid, {} invalid, {} duplicate values",
            summary.valid_rows, summary.invalid_rows, summary.duplicate_count
        );

        ValidationReport { summary, outcomes }
    }

    fn check_record<'a>(
        &self,
        record: &'a RawRecord,
        years: YearWindow,
        seen: &mut HashSet<&'a str>,
        duplicates: &mut HashSet<&'a str>,
    ) -> Option<String> {
        let Some(radicado) = self.key_aliases.resolve(record) else {
            return Some(MISSING_KEY_ERROR.to_string());
        };

        if !seen.insert(radicado) {
            duplicates.insert(radicado);
            return Some(DUPLICATE_KEY_ERROR.to_string());
        }

        batch_radicado_rule(radicado, years).err()
    }
}
