//! Bulk upload pipeline: guard → ingest → validate → preview.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::error::{IngestError, IngestResult};
use crate::ingest::TabularFileIngestor;
use crate::preview::{BoundedPreviewBuilder, PreviewRow};
use crate::record::FieldAliases;
use crate::sheet_parser::file_extension;
use crate::validator::{RecordValidator, RowOutcome, ValidationSummary};

/// Everything the upload screen needs after a file is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadResult {
    pub id: String,
    pub source_file: String,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub content_hash: String,
    pub processed_at: String,
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub validation: ValidationSummary,
    pub preview: Vec<PreviewRow>,
    pub rows: Vec<RowOutcome>,
}

#[derive(Debug, Clone)]
pub struct BulkUploadPipeline {
    ingestor: TabularFileIngestor,
    validator: RecordValidator,
    preview: BoundedPreviewBuilder,
    allowed_extensions: Vec<String>,
    allowed_label: String,
    max_file_bytes: usize,
}

impl BulkUploadPipeline {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            ingestor: TabularFileIngestor::new(config.max_records),
            validator: RecordValidator::from_config(config),
            preview: BoundedPreviewBuilder::new(
                config.preview_cap,
                FieldAliases::new(config.key_aliases.iter().cloned()),
                FieldAliases::new(config.description_aliases.iter().cloned()),
            ),
            allowed_extensions: config.allowed_extensions.clone(),
            allowed_label: config.allowed_extensions_label(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    #[cfg(test)]
    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Refuse files by extension or size before touching their contents.
    pub fn check_upload(&self, filename: &str, size: usize) -> IngestResult<()> {
        let ext = file_extension(filename);
        let allowed = self
            .allowed_extensions
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext));
        if !allowed {
            return Err(IngestError::UnsupportedFormat(ext, self.allowed_label.clone()));
        }
        if size > self.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Run the whole pipeline over an uploaded file held in memory.
    pub fn process(&self, filename: &str, data: &[u8]) -> IngestResult<BulkUploadResult> {
        info!("Leyendo archivo {} ({} bytes)", filename, data.len());
        if let Err(e) = self.check_upload(filename, data.len()) {
            warn!("Upload rejected: {}", e);
            return Err(e);
        }

        let sheet = self.ingestor.ingest(filename, data)?;
        let report = self.validator.validate(&sheet.records);

        info!("Generando vista previa");
        let preview = self.preview.from_outcomes(&report.outcomes);

        info!(
            "Procesamiento completado: {}/{} registros válidos",
            report.summary.valid_rows, report.summary.total_rows
        );

        Ok(BulkUploadResult {
            id: format!("upl_{}", Uuid::new_v4().simple()),
            source_file: filename.to_string(),
            content_hash: format!("{:x}", Sha256::digest(data)),
            processed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            sheet_name: sheet.sheet_name,
            headers: sheet.headers,
            validation: report.summary,
            preview,
            rows: report.outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::YearWindow;

    const YEARS: YearWindow = YearWindow { min: 1990, max: 2026 };

    fn pipeline(config: &IntakeConfig) -> BulkUploadPipeline {
        BulkUploadPipeline::from_config(config)
            .with_validator(RecordValidator::from_config(config).with_year_window(YEARS))
    }

    #[test]
    fn test_end_to_end_blank_missing_and_duplicate() {
        // Data rows: valid, valid, blank key, fully blank, duplicate of row 2.
        let csv = "Numero_Radicado,Descripcion\n\
                   05001310202100010000,primera\n\
                   11001310202300020000,segunda\n\
                   ,sin radicado\n\
                   \" \",\" \"\n\
                   11001310202300020000,repetida\n";
        let result = pipeline(&IntakeConfig::default())
            .process("carga.csv", csv.as_bytes())
            .unwrap();

        let summary = &result.validation;
        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.valid_rows, 2);
        assert_eq!(summary.invalid_rows, 2);
        assert_eq!(summary.duplicate_count, 1);
        assert_eq!(
            summary.errors,
            vec![
                crate::validator::RowError {
                    row: 4,
                    error: "Número de radicado faltante".to_string()
                },
                crate::validator::RowError {
                    row: 5,
                    error: "Número de radicado duplicado".to_string()
                },
            ]
        );

        assert_eq!(result.preview.len(), 4);
        assert_eq!(result.preview[2].radicado, None);
        assert_eq!(result.preview[3].descripcion, "repetida");
        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.headers, vec!["Numero_Radicado", "Descripcion"]);
        assert_eq!(result.content_hash.len(), 64);
        assert!(result.id.starts_with("upl_"));
    }

    #[test]
    fn test_preview_capped_from_config() {
        let config = IntakeConfig {
            preview_cap: 2,
            ..IntakeConfig::default()
        };
        let mut csv = String::from("Radicado\n");
        for i in 0..5 {
            csv.push_str(&format!("0500131020210001{:04}\n", i));
        }
        let result = pipeline(&config).process("lote.csv", csv.as_bytes()).unwrap();
        assert_eq!(result.preview.len(), 2);
        assert_eq!(result.validation.valid_rows, 5);
    }

    #[test]
    fn test_rejects_extension_and_size() {
        let config = IntakeConfig {
            max_file_bytes: 8,
            ..IntakeConfig::default()
        };
        let p = pipeline(&config);

        let err = p.process("macro.xlsm", b"x").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(..)));

        let err = p.process("grande.csv", b"Radicado\n123456789\n").unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { limit: 8, .. }));
    }

    #[test]
    fn test_extension_allow_list_ignores_case() {
        let config = IntakeConfig {
            allowed_extensions: vec!["XLSX".to_string(), ".CSV".to_string()],
            ..IntakeConfig::default()
        };
        let p = pipeline(&config);
        assert!(p.check_upload("carga.xlsx", 10).is_ok());
        assert!(p.check_upload("carga.csv", 10).is_ok());
        assert!(matches!(
            p.check_upload("carga.xls", 10),
            Err(IngestError::UnsupportedFormat(..))
        ));
    }

    #[test]
    fn test_record_limit_aborts_without_preview() {
        let config = IntakeConfig {
            max_records: 2,
            ..IntakeConfig::default()
        };
        let csv = "Radicado\n1\n2\n3\n";
        let err = pipeline(&config).process("lote.csv", csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::RecordLimitExceeded { count: 3, limit: 2 }
        ));
    }

    #[test]
    fn test_header_only_file() {
        let err = pipeline(&IntakeConfig::default())
            .process("vacio.csv", b"Numero_Radicado,Descripcion\n")
            .unwrap_err();
        assert!(matches!(err, IngestError::NoData));
    }
}
