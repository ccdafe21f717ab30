//! Debounced, batched field validation for one form session.
//!
//! A session queues `(field, value, rule)` updates and runs them all when a
//! single shared timer fires. Every field queued inside one debounce window is
//! applied in one state transition and published as one [`FormSnapshot`].
//!
//! Sessions are explicitly constructed and torn down: [`DebouncedFieldValidator::dispose`]
//! (or dropping the validator) cancels the armed timer, and a disposed session
//! never flushes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::rules::{validate_field, FieldOutcome, RuleType, Strength};

/// Field name → latest validation outcome.
pub type FieldValidationState = BTreeMap<String, FieldOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Nothing queued, no timer armed.
    Idle,
    /// Timer armed with at least one queued field.
    Pending,
    /// Timer fired; queued rules are running.
    Flushing,
}

/// A field update that has not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingValidation {
    pub value: String,
    pub rule_type: RuleType,
}

/// What consumers observe after every state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub validations: FieldValidationState,
    pub is_form_valid: bool,
    /// Number of debounced flushes applied so far.
    pub flush_count: u64,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    pending: HashMap<String, PendingValidation>,
    validations: FieldValidationState,
    is_form_valid: bool,
    /// Bumped on every re-arm; a timer only flushes if its generation is current.
    timer_generation: u64,
    flush_count: u64,
    disposed: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            pending: HashMap::new(),
            validations: BTreeMap::new(),
            is_form_valid: false,
            timer_generation: 0,
            flush_count: 0,
            disposed: false,
        }
    }

    fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            validations: self.validations.clone(),
            is_form_valid: self.is_form_valid,
            flush_count: self.flush_count,
        }
    }

    fn recompute_form_validity(&mut self) {
        self.is_form_valid = !self.validations.values().any(|v| !v.is_valid);
    }
}

struct Shared {
    state: Mutex<SessionState>,
    snapshots: watch::Sender<FormSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Run every queued rule and merge the results in one update.
    ///
    /// `expected_generation` is set by timer tasks; a stale timer does nothing.
    fn flush(&self, expected_generation: Option<u64>) -> bool {
        let mut state = self.lock();

        if state.disposed {
            return false;
        }
        if let Some(generation) = expected_generation {
            if generation != state.timer_generation {
                debug!("Skipping stale validation timer (generation {})", generation);
                return false;
            }
        }
        if state.pending.is_empty() {
            state.phase = SessionPhase::Idle;
            return false;
        }

        state.phase = SessionPhase::Flushing;
        let pending = std::mem::take(&mut state.pending);
        let updates: Vec<(String, FieldOutcome)> = pending
            .into_iter()
            .map(|(field, p)| {
                let outcome = validate_field(&p.value, p.rule_type);
                (field, outcome)
            })
            .collect();

        debug!("Flushing {} queued field validation(s)", updates.len());
        state.validations.extend(updates);
        state.recompute_form_validity();
        state.flush_count += 1;
        state.phase = SessionPhase::Idle;

        self.publish(&state);
        true
    }
}

/// Run the rule of every field that has one. Fields without a rule are skipped.
pub fn validate_form(
    form_data: &HashMap<String, String>,
    field_types: &HashMap<String, RuleType>,
) -> FieldValidationState {
    form_data
        .iter()
        .filter_map(|(field, value)| {
            field_types
                .get(field)
                .map(|rule| (field.clone(), validate_field(value, *rule)))
        })
        .collect()
}

/// Debounced validator owned by a single form session.
///
/// Scheduling spawns a tokio task, so [`schedule`](Self::schedule) must be
/// called from within a tokio runtime.
pub struct DebouncedFieldValidator {
    shared: Arc<Shared>,
    window: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DebouncedFieldValidator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }
}

impl DebouncedFieldValidator {
    pub fn new(window: Duration) -> Self {
        let state = SessionState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                snapshots,
            }),
            window,
            timer: Mutex::new(None),
        }
    }

    /// Start from previously known outcomes.
    pub fn with_initial(window: Duration, initial: FieldValidationState) -> Self {
        let validator = Self::new(window);
        {
            let mut state = validator.shared.lock();
            state.validations = initial;
            if !state.validations.is_empty() {
                state.recompute_form_validity();
            }
            validator.shared.publish(&state);
        }
        validator
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a field for validation and (re)arm the shared timer.
    ///
    /// Repeated calls for the same field inside one window keep only the last
    /// value. Any previously armed timer is cancelled.
    pub fn schedule(&self, field: impl Into<String>, value: impl Into<String>, rule: RuleType) {
        let field = field.into();
        // Held for the whole re-arm so concurrent schedules cannot leave an
        // older timer installed over a newer generation.
        let mut timer = self.timer();

        let generation = {
            let mut state = self.shared.lock();
            if state.disposed {
                warn!("Ignoring validation for '{}' on a disposed session", field);
                return;
            }
            state.pending.insert(
                field,
                PendingValidation {
                    value: value.into(),
                    rule_type: rule,
                },
            );
            state.phase = SessionPhase::Pending;
            state.timer_generation += 1;
            state.timer_generation
        };

        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let window = self.window;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(shared) = shared.upgrade() {
                shared.flush(Some(generation));
            }
        }));
    }

    /// Validate and apply one field right away, bypassing the timer.
    ///
    /// A queued update for the same field is dropped, since this value is newer.
    pub fn validate_immediate(&self, field: impl Into<String>, value: &str, rule: RuleType) -> FieldOutcome {
        let field = field.into();
        let outcome = validate_field(value, rule);

        let mut state = self.shared.lock();
        if state.disposed {
            return outcome;
        }
        state.pending.remove(&field);
        if state.pending.is_empty() && state.phase == SessionPhase::Pending {
            state.phase = SessionPhase::Idle;
        }
        state.validations.insert(field, outcome.clone());
        state.recompute_form_validity();
        self.shared.publish(&state);

        outcome
    }

    /// Validate every field that has a rule type, replacing the whole state.
    pub fn validate_all(
        &self,
        form_data: &HashMap<String, String>,
        field_types: &HashMap<String, RuleType>,
    ) -> FieldValidationState {
        let results = validate_form(form_data, field_types);

        let mut state = self.shared.lock();
        if !state.disposed {
            state.validations = results.clone();
            state.recompute_form_validity();
            self.shared.publish(&state);
        }
        results
    }

    /// Apply whatever is queued now instead of waiting for the timer.
    pub fn flush_now(&self) -> bool {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
        self.shared.flush(None)
    }

    /// Clear outcomes, queue and timer. The form is invalid until revalidated.
    pub fn reset(&self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
        let mut state = self.shared.lock();
        state.validations.clear();
        state.pending.clear();
        state.is_form_valid = false;
        state.phase = SessionPhase::Idle;
        state.timer_generation += 1;
        self.shared.publish(&state);
    }

    /// Tear the session down. Any armed timer is cancelled and never fires.
    pub fn dispose(&self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
        let mut state = self.shared.lock();
        state.disposed = true;
        state.pending.clear();
        state.phase = SessionPhase::Idle;
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn snapshot(&self) -> FormSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn is_form_valid(&self) -> bool {
        self.shared.lock().is_form_valid
    }

    /// Receive a snapshot after every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<FormSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Fields queued but not yet validated, sorted.
    pub fn pending_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.shared.lock().pending.keys().cloned().collect();
        fields.sort();
        fields
    }

    /// A field with no outcome yet counts as valid.
    pub fn is_field_valid(&self, field: &str) -> bool {
        self.shared
            .lock()
            .validations
            .get(field)
            .map_or(true, |v| v.is_valid)
    }

    pub fn field_error(&self, field: &str) -> Option<String> {
        self.shared
            .lock()
            .validations
            .get(field)
            .filter(|v| !v.is_valid)
            .map(|v| v.message.clone())
    }

    pub fn field_strength(&self, field: &str) -> Option<Strength> {
        self.shared
            .lock()
            .validations
            .get(field)
            .and_then(|v| v.strength)
    }
}

impl Drop for DebouncedFieldValidator {
    fn drop(&mut self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_field_collapses_to_last_value() {
        let session = DebouncedFieldValidator::new(WINDOW);

        session.schedule("nombre", "Ana123", RuleType::NombrePersona);
        sleep_ms(100).await;
        session.schedule("nombre", "A", RuleType::NombrePersona);
        sleep_ms(100).await;
        session.schedule("nombre", "Ana Gómez", RuleType::NombrePersona);
        assert_eq!(session.phase(), SessionPhase::Pending);

        sleep_ms(299).await;
        assert_eq!(session.snapshot().flush_count, 0);

        sleep_ms(2).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.flush_count, 1);
        let outcome = &snapshot.validations["nombre"];
        assert!(outcome.is_valid);
        assert_eq!(outcome.suggestions, vec!["Nombre completo"]);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.pending_fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_fields_one_transition() {
        let session = DebouncedFieldValidator::new(WINDOW);
        let mut rx = session.subscribe();
        rx.borrow_and_update();

        session.schedule("nombre", "Ana", RuleType::NombrePersona);
        session.schedule("email", "ana@", RuleType::Email);
        assert_eq!(session.pending_fields(), vec!["email", "nombre"]);
        assert!(!rx.has_changed().unwrap());

        sleep_ms(301).await;

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.flush_count, 1);
        assert_eq!(snapshot.validations.len(), 2);
        assert!(snapshot.validations["nombre"].is_valid);
        assert!(!snapshot.validations["email"].is_valid);
        assert!(!snapshot.is_form_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_validity_recomputed_after_flush() {
        let session = DebouncedFieldValidator::new(WINDOW);
        assert!(!session.is_form_valid());

        session.schedule("email", "ana@rama.gov.co", RuleType::Email);
        session.schedule("radicado", "05001310202100010000", RuleType::NumeroRadicado);
        sleep_ms(301).await;
        assert!(session.is_form_valid());

        session.schedule("radicado", "123", RuleType::NumeroRadicado);
        sleep_ms(301).await;
        assert!(!session.is_form_valid());
        assert_eq!(session.field_error("radicado").as_deref(), Some("Muy corto (3/11-23 dígitos)"));
        assert_eq!(session.field_strength("radicado"), Some(Strength::Weak));
        assert!(session.is_field_valid("email"));
        assert!(session.is_field_valid("unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_armed_timer() {
        let session = DebouncedFieldValidator::new(WINDOW);
        session.schedule("nombre", "Ana", RuleType::NombrePersona);
        session.dispose();

        sleep_ms(1000).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.flush_count, 0);
        assert!(snapshot.validations.is_empty());
        assert!(session.is_disposed());

        session.schedule("nombre", "Ana", RuleType::NombrePersona);
        assert!(session.pending_fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_session() {
        let session = DebouncedFieldValidator::new(WINDOW);
        let rx = session.subscribe();
        session.schedule("nombre", "Ana", RuleType::NombrePersona);
        drop(session);

        sleep_ms(1000).await;
        assert!(rx.has_changed().is_err());
        assert_eq!(rx.borrow().flush_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_bypasses_timer() {
        let session = DebouncedFieldValidator::new(WINDOW);
        session.schedule("radicado", "12", RuleType::NumeroRadicado);

        let outcome = session.validate_immediate("radicado", "05001310202100010000", RuleType::NumeroRadicado);
        assert!(outcome.is_valid);
        assert!(session.is_form_valid());
        assert!(session.pending_fields().is_empty());

        sleep_ms(301).await;
        // Older queued value did not overwrite the blur result.
        assert!(session.snapshot().validations["radicado"].is_valid);
        assert_eq!(session.snapshot().flush_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_and_reset() {
        let session = DebouncedFieldValidator::new(WINDOW);
        session.schedule("radicacion", "2021-0033", RuleType::NumeroRadicacion);
        assert!(session.flush_now());
        assert!(!session.flush_now());
        assert!(session.is_form_valid());

        sleep_ms(301).await;
        assert_eq!(session.snapshot().flush_count, 1);

        session.schedule("nombre", "Ana", RuleType::NombrePersona);
        session.reset();
        sleep_ms(301).await;
        let snapshot = session.snapshot();
        assert!(snapshot.validations.is_empty());
        assert!(!snapshot.is_form_valid);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_validate_all_replaces_state() {
        let session = DebouncedFieldValidator::default();
        session.validate_immediate("viejo", "x", RuleType::NombrePersona);

        let form: HashMap<String, String> = [
            ("nombre".to_string(), "Ana Gómez".to_string()),
            ("email".to_string(), "ana@rama.gov.co".to_string()),
            ("libre".to_string(), "sin regla".to_string()),
        ]
        .into_iter()
        .collect();
        let types: HashMap<String, RuleType> = [
            ("nombre".to_string(), RuleType::NombrePersona),
            ("email".to_string(), RuleType::Email),
        ]
        .into_iter()
        .collect();

        let results = session.validate_all(&form, &types);
        assert_eq!(results.len(), 2);
        let snapshot = session.snapshot();
        assert!(!snapshot.validations.contains_key("viejo"));
        assert!(!snapshot.validations.contains_key("libre"));
        assert!(snapshot.is_form_valid);
    }

    #[test]
    fn test_initial_state() {
        let mut initial = FieldValidationState::new();
        initial.insert("email".to_string(), validate_field("mal", RuleType::Email));
        let session = DebouncedFieldValidator::with_initial(WINDOW, initial);
        assert!(!session.is_field_valid("email"));
        assert!(!session.is_form_valid());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_valid_initial_state_makes_form_valid() {
        let mut initial = FieldValidationState::new();
        initial.insert(
            "email".to_string(),
            validate_field("ana@rama.gov.co", RuleType::Email),
        );
        let session = DebouncedFieldValidator::with_initial(WINDOW, initial);
        assert!(session.is_form_valid());
        assert!(session.subscribe().borrow().is_form_valid);

        let empty = DebouncedFieldValidator::with_initial(WINDOW, FieldValidationState::new());
        assert!(!empty.is_form_valid());
    }
}
