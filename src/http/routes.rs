//! HTTP route definitions

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::scoring::session::SessionError;
use crate::scoring::{ApplyOutcome, ScoreboardSnapshot, SessionHandle};
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;
use crate::ws::protocol::ClientMsg;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - multiple origins comma-separated in CLIENT_ORIGIN
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        }
        None => CorsLayer::permissive(),
    };

    let api_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/:id", get(session_snapshot_handler))
        .route("/sessions/:id/events", post(session_event_handler));

    // Anything else is the scoreboard page and its assets
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .merge(api_routes)
        .fallback_service(static_files)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn find_session(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    connected_clients: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
        connected_clients: state.sessions.total_connections(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
    ws_path: String,
    snapshot: ScoreboardSnapshot,
}

async fn create_session_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let session = state.sessions.create()?;
    info!(session_id = %session.id, "Session created over HTTP");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            ws_path: format!("/ws?session_id={}", session.id),
            snapshot: session.snapshot(),
        }),
    ))
}

async fn session_snapshot_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreboardSnapshot>, AppError> {
    let session = find_session(&state, id)?;
    Ok(Json(session.snapshot()))
}

/// Apply one client message, e.g. from a remote button or a pose worker
async fn session_event_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ClientMsg>, JsonRejection>,
) -> Result<Json<ApplyOutcome>, AppError> {
    let session = find_session(&state, id)?;
    let Json(msg) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let outcome = session.apply(Uuid::nil(), msg, unix_millis()).await?;
    Ok(Json(outcome))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::LimitReached(_) => AppError::Unavailable(e.to_string()),
            SessionError::Closed => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
