//! Field validation rules.
//!
//! Every rule is a pure function from a value to a [`FieldOutcome`]. Two
//! radicado rules coexist on purpose: the interactive one used while typing
//! (11–23 digits, no year check) and the batch one used on uploads (20–23
//! digits with a mandatory filing year).

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::config::DEFAULT_MIN_YEAR;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static DIGITS_AND_DASHES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9-]+$").expect("valid regex"));
static PERSON_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s]+$").expect("valid regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Bounds of the interactive radicado rule.
pub const INTERACTIVE_RADICADO_MIN_LEN: usize = 11;
pub const INTERACTIVE_RADICADO_MAX_LEN: usize = 23;
/// Length from which an interactive radicado looks like the usual format.
pub const INTERACTIVE_RADICADO_TYPICAL_LEN: usize = 15;
/// Length from which an interactive radicado is considered complete.
pub const INTERACTIVE_RADICADO_COMPLETE_LEN: usize = 20;

/// Bounds of the batch radicado rule.
pub const BATCH_RADICADO_MIN_LEN: usize = 20;
pub const BATCH_RADICADO_MAX_LEN: usize = 23;
/// Byte range of the filing year inside a batch radicado.
pub const BATCH_RADICADO_YEAR_SPAN: std::ops::Range<usize> = 8..12;

/// Rule identity tag, as sent by form clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    NumeroRadicado,
    NumeroRadicacion,
    NombrePersona,
    Email,
}

impl RuleType {
    pub const ALL: [RuleType; 4] = [
        RuleType::NumeroRadicado,
        RuleType::NumeroRadicacion,
        RuleType::NombrePersona,
        RuleType::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::NumeroRadicado => "numeroRadicado",
            RuleType::NumeroRadicacion => "numeroRadicacion",
            RuleType::NombrePersona => "nombrePersona",
            RuleType::Email => "email",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Tipo de validación desconocido: {}", s))
    }
}

/// UI affordance only; never decides validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Error,
    Weak,
    Medium,
    Strong,
    Good,
    Excellent,
}

/// Result of running one rule on one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOutcome {
    pub is_valid: bool,
    /// Headline text shown next to the input.
    pub message: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub strength: Option<Strength>,
}

impl FieldOutcome {
    /// Outcome for an optional field left empty.
    pub fn empty() -> Self {
        Self {
            is_valid: true,
            message: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            strength: None,
        }
    }

    fn invalid(message: impl Into<String>, strength: Strength) -> Self {
        let message = message.into();
        Self {
            is_valid: false,
            errors: vec![message.clone()],
            message,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            strength: Some(strength),
        }
    }

    fn valid(message: impl Into<String>, strength: Strength) -> Self {
        Self {
            is_valid: true,
            message: message.into(),
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            strength: Some(strength),
        }
    }

    fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Run the interactive rule for `rule` on `value`.
///
/// Empty or whitespace-only values are treated as optional and pass.
pub fn validate_field(value: &str, rule: RuleType) -> FieldOutcome {
    if value.trim().is_empty() {
        return FieldOutcome::empty();
    }

    match rule {
        RuleType::NumeroRadicado => interactive_radicado_rule(value),
        RuleType::NumeroRadicacion => radicacion_rule(value),
        RuleType::NombrePersona => person_name_rule(value),
        RuleType::Email => email_rule(value),
    }
}

/// Radicado check used while a user types into a form.
pub fn interactive_radicado_rule(value: &str) -> FieldOutcome {
    if !DIGITS_RE.is_match(value) {
        return FieldOutcome::invalid("Solo debe contener números", Strength::Error);
    }

    let len = value.len();
    if len < INTERACTIVE_RADICADO_MIN_LEN {
        return FieldOutcome::invalid(
            format!("Muy corto ({}/11-23 dígitos)", len),
            Strength::Weak,
        );
    }
    if len > INTERACTIVE_RADICADO_MAX_LEN {
        return FieldOutcome::invalid(
            format!("Muy largo ({}/23 dígitos máximo)", len),
            Strength::Error,
        );
    }

    if len >= INTERACTIVE_RADICADO_COMPLETE_LEN {
        FieldOutcome::valid("Radicado completo - búsqueda muy precisa", Strength::Excellent)
            .with_suggestion("Formato típico de radicado")
    } else if len >= INTERACTIVE_RADICADO_TYPICAL_LEN {
        FieldOutcome::valid("Radicado válido - búsqueda precisa", Strength::Good)
            .with_suggestion("Formato típico de radicado")
    } else {
        FieldOutcome::valid("Formato válido", Strength::Medium)
            .with_warning("Más corto que el formato típico (15 a 23 dígitos)")
    }
}

fn radicacion_rule(value: &str) -> FieldOutcome {
    let len = value.chars().count();

    if len < 4 {
        return FieldOutcome::invalid("Muy corto (mínimo 4 caracteres)", Strength::Weak);
    }
    if len > 20 {
        return FieldOutcome::invalid("Muy largo (máximo 20 caracteres)", Strength::Error);
    }

    if DIGITS_AND_DASHES_RE.is_match(value) {
        FieldOutcome::valid("Formato válido", Strength::Strong)
    } else {
        FieldOutcome::valid("Formato válido", Strength::Medium)
            .with_warning("Normalmente solo contiene números y guiones")
    }
}

fn person_name_rule(value: &str) -> FieldOutcome {
    if !PERSON_NAME_RE.is_match(value) {
        return FieldOutcome::invalid("Solo letras y espacios permitidos", Strength::Error);
    }

    let len = value.chars().count();
    if len < 2 {
        return FieldOutcome::invalid("Muy corto (mínimo 2 caracteres)", Strength::Weak);
    }
    if len > 100 {
        return FieldOutcome::invalid("Muy largo (máximo 100 caracteres)", Strength::Error);
    }

    if value.split_whitespace().count() >= 2 {
        FieldOutcome::valid("Nombre completo - búsqueda más precisa", Strength::Excellent)
            .with_suggestion("Nombre completo")
    } else {
        FieldOutcome::valid("Nombre válido", Strength::Good)
            .with_warning("Se recomienda ingresar el nombre completo")
    }
}

fn email_rule(value: &str) -> FieldOutcome {
    if !EMAIL_RE.is_match(value) {
        return FieldOutcome::invalid("Formato de email inválido", Strength::Error);
    }
    if value.contains("..") {
        return FieldOutcome::invalid(
            "El email no puede contener puntos consecutivos",
            Strength::Error,
        );
    }
    FieldOutcome::valid("Email válido", Strength::Strong)
}

/// Inclusive range of filing years accepted by the batch radicado rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub min: i32,
    pub max: i32,
}

impl YearWindow {
    /// `[min_year, reference_year + 1]`.
    pub fn ending_after(min_year: i32, reference_year: i32) -> Self {
        Self {
            min: min_year,
            max: reference_year + 1,
        }
    }

    /// Window anchored on today's calendar year.
    pub fn current(min_year: i32) -> Self {
        Self::ending_after(min_year, chrono::Local::now().year())
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

impl Default for YearWindow {
    fn default() -> Self {
        Self::current(DEFAULT_MIN_YEAR)
    }
}

/// Radicado check used on bulk uploads. Returns the row error on failure.
pub fn batch_radicado_rule(value: &str, years: YearWindow) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Número de radicado requerido".to_string());
    }
    if !DIGITS_RE.is_match(value) {
        return Err("Solo se permiten números".to_string());
    }

    let len = value.len();
    if len < BATCH_RADICADO_MIN_LEN {
        return Err(format!(
            "Muy corto: {} dígitos (debe tener entre 20 y 23)",
            len
        ));
    }
    if len > BATCH_RADICADO_MAX_LEN {
        return Err(format!(
            "Muy largo: {} dígitos (debe tener entre 20 y 23)",
            len
        ));
    }

    let year_text = &value[BATCH_RADICADO_YEAR_SPAN];
    match year_text.parse::<i32>() {
        Ok(year) if years.contains(year) => Ok(()),
        _ => Err(format!("Año inválido: {}", year_text)),
    }
}
