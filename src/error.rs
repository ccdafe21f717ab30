//! Structural ingestion errors.
//!
//! These abort a whole upload. Row-level and field-level problems are never
//! raised through this type; they travel as data inside the validation result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Formato de archivo no soportado: .{0}. Solo se permiten archivos {1}")]
    UnsupportedFormat(String, String),

    #[error("El archivo es demasiado grande ({size} bytes). El tamaño máximo permitido es {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    #[error("No se pudo leer el archivo: {0}")]
    Workbook(String),

    #[error("El archivo no contiene hojas de cálculo válidas")]
    EmptyWorkbook,

    #[error("No se encontraron datos válidos en el archivo")]
    NoData,

    #[error("El archivo contiene {count} registros. El límite máximo es {limit}")]
    RecordLimitExceeded { count: usize, limit: usize },
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Workbook(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_message_carries_counts() {
        let err = IngestError::RecordLimitExceeded {
            count: 1001,
            limit: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1001"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_unsupported_format_lists_allowed() {
        let err = IngestError::UnsupportedFormat("pdf".into(), ".xlsx, .xls".into());
        assert_eq!(
            err.to_string(),
            "Formato de archivo no soportado: .pdf. Solo se permiten archivos .xlsx, .xls"
        );
    }
}
