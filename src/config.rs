//! Intake configuration.
//!
//! Loaded from a JSON file (`configs/intake.json` unless `INTAKE_CONFIG` points
//! elsewhere). Every field has a default, so a missing file or a partial file is
//! fine. A handful of environment variables override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Maximum number of data rows accepted in one upload.
pub const DEFAULT_MAX_RECORDS: usize = 1000;
/// Maximum number of itemized row errors in a validation summary.
pub const DEFAULT_ERROR_CAP: usize = 50;
/// Number of rows shown in an upload preview.
pub const DEFAULT_PREVIEW_CAP: usize = 10;
/// Debounce window for interactive field validation.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// 10 MiB upload limit.
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
/// Earliest filing year accepted inside a batch radicado.
pub const DEFAULT_MIN_YEAR: i32 = 1990;
/// Form sessions untouched for this long are disposed.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

const DEFAULT_CONFIG_PATH: &str = "configs/intake.json";

/// Header spellings that may hold the radicado, in priority order.
pub const DEFAULT_KEY_ALIASES: [&str; 4] = [
    "Numero_Radicado",
    "Numero_De_Radicado",
    "Radicado",
    "numero_radicado",
];

/// Header spellings that may hold the free-text description.
pub const DEFAULT_DESCRIPTION_ALIASES: [&str; 3] = ["Descripcion", "descripcion", "Descripción"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntakeConfig {
    pub bind_addr: String,
    pub max_records: usize,
    pub error_cap: usize,
    pub preview_cap: usize,
    pub debounce_ms: u64,
    pub max_file_bytes: usize,
    pub min_year: i32,
    pub session_idle_secs: u64,
    pub key_aliases: Vec<String>,
    pub description_aliases: Vec<String>,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_records: DEFAULT_MAX_RECORDS,
            error_cap: DEFAULT_ERROR_CAP,
            preview_cap: DEFAULT_PREVIEW_CAP,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            min_year: DEFAULT_MIN_YEAR,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
            key_aliases: DEFAULT_KEY_ALIASES.iter().map(|s| s.to_string()).collect(),
            description_aliases: DEFAULT_DESCRIPTION_ALIASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_extensions: vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()],
        }
    }
}

impl IntakeConfig {
    /// Load the config file named by `INTAKE_CONFIG`, then apply env overrides.
    pub fn from_env() -> Result<Self> {
        let path = env::var("INTAKE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from_file(Path::new(&path))?;
        config.apply_env_overrides()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: IntakeConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        info!("Loaded intake config from {:?}", path);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = env::var("INTAKE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(raw) = env::var("INTAKE_MAX_RECORDS") {
            self.max_records = raw
                .parse()
                .with_context(|| format!("INTAKE_MAX_RECORDS is not a number: {}", raw))?;
        }
        if let Ok(raw) = env::var("INTAKE_DEBOUNCE_MS") {
            self.debounce_ms = raw
                .parse()
                .with_context(|| format!("INTAKE_DEBOUNCE_MS is not a number: {}", raw))?;
        }
        Ok(())
    }

    /// Extensions are matched lowercase and without the dot.
    pub fn normalize(&mut self) {
        for ext in &mut self.allowed_extensions {
            *ext = ext.trim().trim_start_matches('.').to_lowercase();
        }
    }

    /// Reject configurations that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            anyhow::bail!("maxRecords must be greater than zero");
        }
        if self.preview_cap == 0 {
            anyhow::bail!("previewCap must be greater than zero");
        }
        if self.error_cap == 0 {
            anyhow::bail!("errorCap must be greater than zero");
        }
        if self.debounce_ms == 0 {
            anyhow::bail!("debounceMs must be greater than zero");
        }
        if self.session_idle_secs == 0 {
            anyhow::bail!("sessionIdleSecs must be greater than zero");
        }
        if self.key_aliases.iter().all(|a| a.trim().is_empty()) {
            anyhow::bail!("keyAliases must name at least one column");
        }
        if self.allowed_extensions.iter().all(|e| e.trim().is_empty()) {
            anyhow::bail!("allowedExtensions must not be empty");
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Human-readable list of accepted extensions, e.g. `.xlsx, .xls`.
    pub fn allowed_extensions_label(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IntakeConfig::default();
        assert_eq!(config.max_records, 1000);
        assert_eq!(config.error_cap, 50);
        assert_eq!(config.preview_cap, 10);
        assert_eq!(config.debounce_window(), Duration::from_millis(300));
        assert_eq!(config.key_aliases[0], "Numero_Radicado");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: IntakeConfig =
            serde_json::from_str(r#"{"maxRecords": 25, "previewCap": 3}"#).unwrap();
        assert_eq!(config.max_records, 25);
        assert_eq!(config.preview_cap, 3);
        assert_eq!(config.error_cap, 50);
        assert_eq!(config.key_aliases.len(), 4);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = IntakeConfig::load_from_file(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(config.max_records, DEFAULT_MAX_RECORDS);
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let config = IntakeConfig {
            max_records: 0,
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = IntakeConfig {
            key_aliases: vec![" ".to_string()],
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());

        for config in [
            IntakeConfig { error_cap: 0, ..IntakeConfig::default() },
            IntakeConfig { debounce_ms: 0, ..IntakeConfig::default() },
            IntakeConfig { session_idle_secs: 0, ..IntakeConfig::default() },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_normalize_extensions() {
        let mut config: IntakeConfig =
            serde_json::from_str(r#"{"allowedExtensions": ["XLSX", ".Csv"]}"#).unwrap();
        config.normalize();
        assert_eq!(config.allowed_extensions, vec!["xlsx", "csv"]);
        assert_eq!(config.allowed_extensions_label(), ".xlsx, .csv");
    }

    #[test]
    fn test_extension_label() {
        assert_eq!(
            IntakeConfig::default().allowed_extensions_label(),
            ".xlsx, .xls, .csv"
        );
    }
}
