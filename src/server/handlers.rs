use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

use super::models::{ErrorResponse, OutcomePayload, SessionResponse, SessionSnapshot, StartRequest};
use super::state::{ServerState, Session};
use crate::error::PipelineError;
use crate::prompts::PromptTemplates;
use crate::settings::Settings;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    let templates = PromptTemplates::load(&settings).with_context(|| "failed to load prompts")?;
    let provider = crate::build_provider(&settings);
    let state = Arc::new(ServerState::new(settings, provider, templates));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("serving pipeline sessions on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(show_session).delete(delete_session))
        .route("/sessions/:id/advance", post(advance_session))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn start_session(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<StartRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let text = payload.text.unwrap_or_default();
    let key = crate::resolve_key(payload.key.as_deref()).unwrap_or_default();
    let chunk_size = payload.chunk_size.unwrap_or(state.settings.chunk_size);

    let pipeline = state.build_pipeline(chunk_size);
    let pipeline_state = pipeline.start(&text, &key).map_err(pipeline_error)?;
    let (id, handle) = state.insert(Session {
        pipeline,
        state: pipeline_state,
    });
    info!("session {} started", id);

    let session = handle.lock_owned().await;
    let response = if payload.auto_start.unwrap_or(true) {
        advance_detached(id, session).await?
    } else {
        SessionResponse {
            outcome: None,
            session: SessionSnapshot::new(&id, &session.state),
        }
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn advance_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = state.get(&id).ok_or_else(|| not_found(&id))?;
    // One chunk in flight per session; a second caller is told to come back.
    let session = handle.try_lock_owned().map_err(|_| {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("session {} already has a chunk in flight", id),
                kind: "conflict".to_string(),
            }),
        )
    })?;
    Ok(Json(advance_detached(id, session).await?))
}

// The chunk runs on its own task so a dropped request cannot cancel it
// between the translate and furigana calls.
async fn advance_detached(
    id: String,
    mut session: OwnedMutexGuard<Session>,
) -> Result<SessionResponse, ApiError> {
    tokio::spawn(async move {
        let Session {
            pipeline,
            state: session_state,
        } = &mut *session;
        let outcome = pipeline.advance_chunk(session_state).await;
        SessionResponse {
            outcome: Some(OutcomePayload::from(&outcome)),
            session: SessionSnapshot::new(&id, &session.state),
        }
    })
    .await
    .map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("chunk task failed: {}", err),
                kind: "internal".to_string(),
            }),
        )
    })
}

async fn show_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.get(&id).ok_or_else(|| not_found(&id))?;
    let session = handle.lock().await;
    Ok(Json(SessionSnapshot::new(&id, &session.state)))
}

async fn delete_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.remove(&id) {
        info!("session {} discarded", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

fn not_found(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("session {} not found", id),
            kind: "not_found".to_string(),
        }),
    )
}

fn pipeline_error(err: PipelineError) -> ApiError {
    let status = match err {
        PipelineError::InvalidInput(_) | PipelineError::InvalidArgument(_) => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::Template { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
}
