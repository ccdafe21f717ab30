//! Small, display-ready slices of an upload.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DESCRIPTION_ALIASES, DEFAULT_KEY_ALIASES, DEFAULT_PREVIEW_CAP};
use crate::record::{FieldAliases, RawRecord};
use crate::validator::RowOutcome;

/// One previewed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub row_number: usize,
    /// `None` when no key alias held a value.
    pub radicado: Option<String>,
    pub descripcion: String,
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoundedPreviewBuilder {
    cap: usize,
    key_aliases: FieldAliases,
    description_aliases: FieldAliases,
}

impl Default for BoundedPreviewBuilder {
    fn default() -> Self {
        Self {
            cap: DEFAULT_PREVIEW_CAP,
            key_aliases: FieldAliases::new(DEFAULT_KEY_ALIASES),
            description_aliases: FieldAliases::new(DEFAULT_DESCRIPTION_ALIASES),
        }
    }
}

impl BoundedPreviewBuilder {
    pub fn new(cap: usize, key_aliases: FieldAliases, description_aliases: FieldAliases) -> Self {
        Self {
            cap,
            key_aliases,
            description_aliases,
        }
    }

    /// Project already validated rows. Flags match the full batch pass,
    /// duplicates included.
    pub fn from_outcomes(&self, outcomes: &[RowOutcome]) -> Vec<PreviewRow> {
        outcomes
            .iter()
            .take(self.cap)
            .map(|outcome| PreviewRow {
                row_number: outcome.row_number,
                radicado: self.radicado(&outcome.fields_checked),
                descripcion: self.descripcion(&outcome.fields_checked),
                valid: outcome.valid,
                error: outcome.error.clone(),
            })
            .collect()
    }

    fn radicado(&self, record: &RawRecord) -> Option<String> {
        self.key_aliases.resolve(record).map(str::to_string)
    }

    fn descripcion(&self, record: &RawRecord) -> String {
        self.description_aliases
            .resolve(record)
            .unwrap_or_default()
            .to_string()
    }
}
