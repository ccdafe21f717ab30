//! Field-keyed spreadsheet rows and column alias resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One non-blank data row, keyed by header text.
///
/// Duplicate headers collapse onto one key; the rightmost column wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    /// Zip a header row with a data row. Cells beyond the last header are
    /// dropped; missing trailing cells become empty strings.
    pub fn from_row(headers: &[String], row: &[String]) -> Self {
        let fields = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let value = row.get(idx).cloned().unwrap_or_default();
                (header.clone(), value)
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).map(|v| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Ordered list of header spellings that may carry the same logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAliases {
    candidates: Vec<String>,
}

impl FieldAliases {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// First candidate whose trimmed value is non-empty, trimmed.
    pub fn resolve<'a>(&self, record: &'a RawRecord) -> Option<&'a str> {
        resolve_first(record, &self.candidates)
    }
}

/// Look up each candidate header in order and return the first non-blank value.
pub fn resolve_first<'a, S: AsRef<str>>(record: &'a RawRecord, candidates: &[S]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| record.get(c.as_ref()))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_row_pads_and_truncates() {
        let hs = headers(&["A", "B"]);
        let short = RawRecord::from_row(&hs, &["1".to_string()]);
        assert_eq!(short.get("A"), Some("1"));
        assert_eq!(short.get("B"), Some(""));

        let long = RawRecord::from_row(&hs, &headers(&["1", "2", "3"]));
        let json = serde_json::to_value(&long).unwrap();
        assert_eq!(json, serde_json::json!({"A": "1", "B": "2"}));
    }

    #[test]
    fn test_duplicate_header_rightmost_wins() {
        let record = RawRecord::from_row(&headers(&["X", "X"]), &headers(&["left", "right"]));
        assert_eq!(record.get("X"), Some("right"));
    }

    #[test]
    fn test_resolve_skips_blank_candidates() {
        let aliases = FieldAliases::new(["Numero_Radicado", "Radicado"]);
        let record: RawRecord = [("Numero_Radicado", "  "), ("Radicado", " 123 ")]
            .into_iter()
            .collect();
        assert_eq!(aliases.resolve(&record), Some("123"));
    }

    #[test]
    fn test_resolve_respects_priority() {
        let aliases = FieldAliases::new(["Numero_Radicado", "Radicado"]);
        let record: RawRecord = [("Radicado", "second"), ("Numero_Radicado", "first")]
            .into_iter()
            .collect();
        assert_eq!(aliases.resolve(&record), Some("first"));
    }

    #[test]
    fn test_resolve_missing() {
        let aliases = FieldAliases::new(["Radicado"]);
        let record: RawRecord = [("Otro", "x")].into_iter().collect();
        assert_eq!(aliases.resolve(&record), None);
    }
}
