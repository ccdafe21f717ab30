//! Radicado Intake - bulk upload and field validation server for judicial case numbers.

mod config;
mod error;
mod ingest;
mod pipeline;
mod preview;
mod radicado;
mod record;
mod rules;
mod session;
mod sheet_parser;
mod validator;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::IntakeConfig;
use error::IngestError;
use pipeline::{BulkUploadPipeline, BulkUploadResult};
use radicado::RadicadoStructure;
use rules::{validate_field, FieldOutcome, RuleType, Strength};
use serde::{Deserialize, Serialize};
use session::{
    validate_form, DebouncedFieldValidator, FieldValidationState, FormSnapshot, SessionPhase,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Longest time a change request waits for the next snapshot.
const CHANGES_WAIT: Duration = Duration::from_secs(25);
/// Upper bound on the idle-session sweep period.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A form session plus the last time a request touched it.
struct TrackedSession {
    validator: Arc<DebouncedFieldValidator>,
    last_touched: Instant,
}

type Sessions = HashMap<String, TrackedSession>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<IntakeConfig>,
    pipeline: Arc<BulkUploadPipeline>,
    sessions: Arc<RwLock<Sessions>>,
}

impl AppState {
    fn new(config: IntakeConfig) -> Self {
        Self {
            pipeline: Arc::new(BulkUploadPipeline::from_config(&config)),
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> RwLockReadGuard<'_, Sessions> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_mut(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_session(&self, id: String, validator: Arc<DebouncedFieldValidator>) {
        self.sessions_mut().insert(
            id,
            TrackedSession {
                validator,
                last_touched: Instant::now(),
            },
        );
    }

    /// Look a session up and mark it as used.
    fn session(&self, id: &str) -> Result<Arc<DebouncedFieldValidator>, (StatusCode, String)> {
        let mut sessions = self.sessions_mut();
        let tracked = sessions.get_mut(id).ok_or_else(|| session_not_found(id))?;
        tracked.last_touched = Instant::now();
        Ok(tracked.validator.clone())
    }

    /// Dispose and drop sessions idle for longer than the configured TTL.
    fn sweep_idle_sessions(&self) -> usize {
        let ttl = self.config.session_idle_ttl();
        let now = Instant::now();
        let mut sessions = self.sessions_mut();
        let before = sessions.len();

        sessions.retain(|id, tracked| {
            let keep = !tracked.validator.is_disposed()
                && now.duration_since(tracked.last_touched) < ttl;
            if !keep {
                tracked.validator.dispose();
                debug!("Session expired: {}", id);
            }
            keep
        });

        before - sessions.len()
    }

    fn session_count(&self) -> usize {
        self.sessions().len()
    }
}

/// Spawn the background task that expires idle form sessions.
fn start_session_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = state.config.session_idle_ttl().min(MAX_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            let expired = state.sweep_idle_sessions();
            if expired > 0 {
                info!(
                    "Expired {} idle session(s), {} active",
                    expired,
                    state.session_count()
                );
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "radicado_intake=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IntakeConfig::from_env()?;
    info!(
        "Intake config: max {} records, {} bytes, {} ms debounce, formats {}",
        config.max_records,
        config.max_file_bytes,
        config.debounce_ms,
        config.allowed_extensions_label()
    );

    let bind_addr = config.bind_addr.clone();
    // Leave headroom for multipart framing; the pipeline enforces the real limit.
    let body_limit = config.max_file_bytes + 64 * 1024;
    let state = AppState::new(config);
    let sweeper = start_session_sweeper(state.clone());

    let app = router(state).layer(DefaultBodyLimit::max(body_limit));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .route("/rules", get(list_rules))
        .route("/bulk-upload", post(bulk_upload))
        .route("/validate", post(validate_value))
        .route("/validate/all", post(validate_all))
        .route("/radicado/structure", post(radicado_structure))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(dispose_session))
        .route("/sessions/:id/changes", get(wait_for_change))
        .route("/sessions/:id/fields", post(schedule_field))
        .route("/sessions/:id/fields/immediate", post(validate_field_now))
        .route("/sessions/:id/fields/:field", get(field_status))
        .route("/sessions/:id/validate-all", post(validate_session_form))
        .route("/sessions/:id/flush", post(flush_session))
        .route("/sessions/:id/reset", post(reset_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Effective intake configuration.
async fn get_config(State(state): State<AppState>) -> Json<IntakeConfig> {
    Json((*state.config).clone())
}

/// Rule tags accepted by the validation endpoints.
async fn list_rules() -> Json<Vec<&'static str>> {
    Json(RuleType::ALL.iter().map(RuleType::as_str).collect())
}

/// Upload a spreadsheet of radicados and validate every row.
async fn bulk_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BulkUploadResult>, (StatusCode, String)> {
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("archivo").to_string();
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No se recibió ningún archivo".to_string()));
    }

    info!("Received file: {} ({} bytes)", filename, file_data.len());

    // Parsing a workbook is CPU-bound; keep it off the async workers.
    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.process(&filename, &file_data))
        .await
        .map_err(|e| {
            error!("Upload task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Upload task failed: {}", e))
        })?
        .map_err(ingest_error_response)?;

    info!("Upload processed: {}", result.id);
    Ok(Json(result))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    rule_type: String,
    value: String,
}

/// Run one rule against one value, without any session.
async fn validate_value(
    Json(req): Json<ValidateRequest>,
) -> Result<Json<FieldOutcome>, (StatusCode, String)> {
    let rule = parse_rule(&req.rule_type)?;
    Ok(Json(validate_field(&req.value, rule)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateAllRequest {
    fields: HashMap<String, String>,
    rule_types: HashMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateAllResponse {
    validations: FieldValidationState,
    is_form_valid: bool,
}

/// Validate a whole form in one call, without any session.
async fn validate_all(
    Json(req): Json<ValidateAllRequest>,
) -> Result<Json<ValidateAllResponse>, (StatusCode, String)> {
    let rule_types = parse_rule_map(&req.rule_types)?;
    let validations = validate_form(&req.fields, &rule_types);
    let is_form_valid = validations.values().all(|v| v.is_valid);

    Ok(Json(ValidateAllResponse {
        validations,
        is_form_valid,
    }))
}

#[derive(Deserialize)]
struct StructureRequest {
    value: String,
}

/// Break a radicado into the official 23-digit segments.
async fn radicado_structure(Json(req): Json<StructureRequest>) -> Json<RadicadoStructure> {
    Json(radicado::analyze(req.value.trim()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    id: String,
    phase: SessionPhase,
    debounce_ms: u64,
    pending_fields: Vec<String>,
    #[serde(flatten)]
    snapshot: FormSnapshot,
}

impl SessionView {
    fn of(id: String, session: &DebouncedFieldValidator) -> Self {
        Self {
            id,
            phase: session.phase(),
            debounce_ms: session.window().as_millis() as u64,
            pending_fields: session.pending_fields(),
            snapshot: session.snapshot(),
        }
    }
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    /// Outcomes from an earlier visit to the same form.
    #[serde(default)]
    validations: FieldValidationState,
}

/// Open a new debounced validation session, optionally resuming saved outcomes.
async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Json<SessionView> {
    let id = format!("ses_{}", uuid::Uuid::new_v4().simple());
    let window = state.config.debounce_window();
    let session = match body {
        Some(Json(req)) if !req.validations.is_empty() => {
            Arc::new(DebouncedFieldValidator::with_initial(window, req.validations))
        }
        _ => Arc::new(DebouncedFieldValidator::new(window)),
    };
    let view = SessionView::of(id.clone(), &session);

    state.insert_session(id.clone(), session);
    info!("Session created: {}", id);
    Json(view)
}

/// Current state of a session.
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = state.session(&id)?;
    Ok(Json(SessionView::of(id, &session)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldRequest {
    field: String,
    value: String,
    rule_type: String,
}

/// Queue a field; it is validated when the session's debounce window elapses.
async fn schedule_field(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FieldRequest>,
) -> Result<(StatusCode, Json<SessionView>), (StatusCode, String)> {
    let rule = parse_rule(&req.rule_type)?;
    let session = state.session(&id)?;
    session.schedule(req.field, req.value, rule);
    Ok((StatusCode::ACCEPTED, Json(SessionView::of(id, &session))))
}

/// Validate a field now, bypassing the debounce timer.
async fn validate_field_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FieldRequest>,
) -> Result<Json<FieldOutcome>, (StatusCode, String)> {
    let rule = parse_rule(&req.rule_type)?;
    let session = state.session(&id)?;
    Ok(Json(session.validate_immediate(req.field, &req.value, rule)))
}

/// Wait for the session's next published snapshot, up to a fixed timeout.
async fn wait_for_change(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = state.session(&id)?;
    let mut changes = session.subscribe();
    changes.borrow_and_update();

    match tokio::time::timeout(CHANGES_WAIT, changes.changed()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => return Err(session_not_found(&id)),
        Err(_) => debug!("No change on session {} within {:?}", id, CHANGES_WAIT),
    }
    Ok(Json(SessionView::of(id, &session)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldStatus {
    field: String,
    is_valid: bool,
    error: Option<String>,
    strength: Option<Strength>,
}

/// Validity, error text and strength of one field of a session.
async fn field_status(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
) -> Result<Json<FieldStatus>, (StatusCode, String)> {
    let session = state.session(&id)?;
    Ok(Json(FieldStatus {
        is_valid: session.is_field_valid(&field),
        error: session.field_error(&field),
        strength: session.field_strength(&field),
        field,
    }))
}

/// Validate a whole form inside a session, replacing its state.
async fn validate_session_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValidateAllRequest>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let rule_types = parse_rule_map(&req.rule_types)?;
    let session = state.session(&id)?;
    session.validate_all(&req.fields, &rule_types);
    Ok(Json(SessionView::of(id, &session)))
}

/// Apply queued fields without waiting for the timer.
async fn flush_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = state.session(&id)?;
    if !session.flush_now() {
        info!("Flush on session {} had nothing queued", id);
    }
    Ok(Json(SessionView::of(id, &session)))
}

/// Clear every outcome of a session.
async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = state.session(&id)?;
    session.reset();
    Ok(Json(SessionView::of(id, &session)))
}

/// Dispose a session; its armed timer never fires.
async fn dispose_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let tracked = state.sessions_mut().remove(&id);
    match tracked {
        Some(tracked) => {
            tracked.validator.dispose();
            info!("Session disposed: {}", id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(session_not_found(&id)),
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn session_not_found(id: &str) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("Sesión de validación no encontrada: {}", id),
    )
}

fn parse_rule(tag: &str) -> Result<RuleType, (StatusCode, String)> {
    tag.parse::<RuleType>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

fn parse_rule_map(
    tags: &HashMap<String, String>,
) -> Result<HashMap<String, RuleType>, (StatusCode, String)> {
    tags.iter()
        .map(|(field, tag)| parse_rule(tag).map(|rule| (field.clone(), rule)))
        .collect()
}

/// Map a structural ingestion failure to an HTTP status.
fn ingest_error_response(e: IngestError) -> (StatusCode, String) {
    let status = match &e {
        IngestError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        IngestError::UnsupportedFormat(..) => StatusCode::BAD_REQUEST,
        IngestError::Workbook(_)
        | IngestError::EmptyWorkbook
        | IngestError::NoData
        | IngestError::RecordLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    warn!("Upload failed ({}): {}", status, e);
    (status, e.to_string())
}
