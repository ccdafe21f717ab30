//! Official 23-digit radicado layout (Acuerdo 201 de 1997).
//!
//! `DDCCC EE SS DDD AAAA CCCCC RR`: departamento, ciudad, entidad,
//! especialidad, despacho, año, consecutivo, recurso. The analysis here is
//! advisory; it never decides whether a bulk row is accepted.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

pub const OFFICIAL_LENGTH: usize = 23;
pub const OFFICIAL_EXAMPLE: &str = "05001310300120210000100";

/// (name, width) of each segment, in order.
const SEGMENTS: [(&str, usize); 8] = [
    ("Departamento", 2),
    ("Ciudad", 3),
    ("Entidad", 2),
    ("Especialidad", 2),
    ("Despacho", 3),
    ("Año", 4),
    ("Consecutivo", 5),
    ("Recurso", 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureStatus {
    Valid,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadicadoStructure {
    pub status: StructureStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Suggested rewrite of the input (digits only, or cut to 23 digits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

impl RadicadoStructure {
    fn new(status: StructureStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            segments: Vec::new(),
            warnings: Vec::new(),
            correction: None,
        }
    }
}

/// Analyse `value` against the official layout, using today's year.
pub fn analyze(value: &str) -> RadicadoStructure {
    analyze_with_year(value, chrono::Local::now().year())
}

pub fn analyze_with_year(value: &str, current_year: i32) -> RadicadoStructure {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits != value {
        let mut result = RadicadoStructure::new(
            StructureStatus::Error,
            "Solo debe contener números, sin espacios ni caracteres especiales",
        );
        result.correction = Some(digits);
        return result;
    }

    if digits.len() < OFFICIAL_LENGTH {
        return RadicadoStructure::new(
            StructureStatus::Warning,
            format!(
                "Incompleto: faltan {} dígitos. Los radicados tienen exactamente 23 dígitos (ej. {})",
                OFFICIAL_LENGTH - digits.len(),
                OFFICIAL_EXAMPLE
            ),
        );
    }

    if digits.len() > OFFICIAL_LENGTH {
        let mut result = RadicadoStructure::new(
            StructureStatus::Error,
            format!(
                "Muy largo: sobran {} dígitos. Los radicados tienen exactamente 23 dígitos",
                digits.len() - OFFICIAL_LENGTH
            ),
        );
        result.correction = Some(digits[..OFFICIAL_LENGTH].to_string());
        return result;
    }

    let segments = split_segments(&digits);
    let warnings = segment_warnings(&segments, current_year);

    let mut result = if warnings.is_empty() {
        RadicadoStructure::new(
            StructureStatus::Valid,
            "Número de radicación válido (estructura oficial)",
        )
    } else {
        RadicadoStructure::new(
            StructureStatus::Warning,
            format!("Formato correcto, pero revise: {}", warnings[0]),
        )
    };
    result.segments = segments;
    result.warnings = warnings;
    result
}

fn split_segments(digits: &str) -> Vec<Segment> {
    let mut offset = 0;
    SEGMENTS
        .iter()
        .map(|(name, width)| {
            let value = digits[offset..offset + width].to_string();
            offset += width;
            Segment {
                name: name.to_string(),
                value,
            }
        })
        .collect()
}

fn segment_number(segments: &[Segment], name: &str) -> Option<i32> {
    segments
        .iter()
        .find(|s| s.name == name)
        .and_then(|s| s.value.parse().ok())
}

fn segment_warnings(segments: &[Segment], current_year: i32) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(depto) = segment_number(segments, "Departamento") {
        if !(1..=99).contains(&depto) {
            warnings.push("Código de departamento fuera del rango válido (01-99)".to_string());
        }
    }

    if let Some(year) = segment_number(segments, "Año") {
        if year < 1900 || year > current_year + 5 {
            warnings.push(format!(
                "Año de radicación inusual ({:04}). Rango típico: 2000-{}",
                year, current_year
            ));
        }
    }

    if segments
        .iter()
        .any(|s| s.name == "Consecutivo" && s.value == "00000")
    {
        warnings.push("El código de proceso consecutivo no puede ser 00000".to_string());
    }

    if let Some(recurso) = segment_number(segments, "Recurso") {
        if recurso > 10 {
            warnings.push(
                "Código de recurso inusualmente alto. Típicos: 00 (primera instancia), 01-03 (instancias superiores)"
                    .to_string(),
            );
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_is_valid() {
        let result = analyze_with_year(OFFICIAL_EXAMPLE, 2025);
        assert_eq!(result.status, StructureStatus::Valid);
        assert_eq!(result.segments.len(), 8);
        assert_eq!(result.segments[0].value, "05");
        assert_eq!(result.segments[5].name, "Año");
        assert_eq!(result.segments[5].value, "2021");
        assert_eq!(result.segments[7].value, "00");
    }

    #[test]
    fn test_non_digits_get_correction() {
        let result = analyze_with_year("05001-31001-2021", 2025);
        assert_eq!(result.status, StructureStatus::Error);
        assert_eq!(result.correction.as_deref(), Some("05001310012021"));
    }

    #[test]
    fn test_short_is_warning() {
        let result = analyze_with_year("0500131001", 2025);
        assert_eq!(result.status, StructureStatus::Warning);
        assert!(result.message.contains("faltan 13"));
        assert!(result.message.ends_with("(ej. 05001310300120210000100)"));
    }

    #[test]
    fn test_long_suggests_truncation() {
        let result = analyze_with_year(&format!("{}99", OFFICIAL_EXAMPLE), 2025);
        assert_eq!(result.status, StructureStatus::Error);
        assert_eq!(result.correction.as_deref(), Some(OFFICIAL_EXAMPLE));
    }

    #[test]
    fn test_segment_warnings() {
        // depto 00, year 2099, consecutivo 00000, recurso 11
        let result = analyze_with_year("00001310012020990000011", 2025);
        assert_eq!(result.status, StructureStatus::Warning);
        assert_eq!(result.warnings.len(), 4);
        assert!(result.message.starts_with("Formato correcto, pero revise"));
    }
}
