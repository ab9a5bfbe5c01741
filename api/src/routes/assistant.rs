use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shule_core::error::ApiError;
use shule_core::flow::FlowState;
use shule_core::phrases::VariedPhrases;
use shule_core::{DialogSession, Identity, Message, Navigation, Reply, SessionHandle, TurnStatus};

use crate::auth::BearerToken;
use crate::error::AppError;
use crate::state::AppState;

const MAX_TURN_CHARS: usize = 2000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/assistant/sessions", post(create_session))
        .route("/v1/assistant/sessions/{id}", delete(close_session))
        .route("/v1/assistant/sessions/{id}/turns", post(submit_turn))
        .route("/v1/assistant/sessions/{id}/transcript", get(get_transcript))
        .route("/v1/assistant/sessions/{id}/flow", delete(cancel_flow))
        .route("/v1/assistant/sessions/{id}/flow/fields", put(set_flow_field))
        .route("/v1/assistant/sessions/{id}/flow/submit", post(submit_flow))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TurnRequest {
    /// What the user typed or said
    pub text: String,
}

/// Outcome of one turn (or flow operation) on a session.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TurnResponse {
    pub status: TurnStatus,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    /// The form still being filled, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowState>,
}

impl From<Reply> for TurnResponse {
    fn from(reply: Reply) -> Self {
        Self {
            status: reply.status,
            messages: vec![reply.message],
            navigation: reply.navigation,
            flow: reply.flow,
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct FlowFieldRequest {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FlowResponse {
    pub flow: Option<FlowState>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TranscriptResponse {
    pub session_id: Uuid,
    pub identity: Identity,
    pub messages: Vec<Message>,
}

/// Start a dialog session for the bearer of the token
///
/// The token is forwarded to the school API, which is asked once for the
/// user's identity and role. Every later call on the session must carry the
/// same token.
#[utoipa::path(
    post,
    path = "/v1/assistant/sessions",
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 401, description = "Missing bearer token", body = ApiError),
        (status = 502, description = "Identity lookup failed", body = ApiError),
        (status = 503, description = "Session limit reached", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn create_session(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    state.sessions.ensure_capacity().await?;

    let backend = state.connector.connect(&token)?;
    let session = DialogSession::connect(backend).await?;
    let session = if state.varied_phrases {
        session.with_phrases(VariedPhrases)
    } else {
        session
    };
    let identity = session.identity().clone();

    let (session_id, created_at) = state
        .sessions
        .insert(SessionHandle::new(session), &token)
        .await?;
    tracing::info!(%session_id, user_id = identity.id, role = %identity.role, "assistant session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            identity,
            created_at,
        }),
    ))
}

/// Send one line of user text to the assistant
#[utoipa::path(
    post,
    path = "/v1/assistant/sessions/{id}/turns",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = TurnRequest,
    responses(
        (status = 200, description = "Assistant reply", body = TurnResponse),
        (status = 400, description = "Empty or oversized text", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 409, description = "A previous turn is still running", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn submit_turn(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "text must not be empty".to_string(),
            field: Some("text".to_string()),
            docs_hint: Some("Try \"help\" to see what the assistant understands.".to_string()),
        });
    }
    if req.text.chars().count() > MAX_TURN_CHARS {
        return Err(AppError::Validation {
            message: format!("text must be at most {MAX_TURN_CHARS} characters"),
            field: Some("text".to_string()),
            docs_hint: None,
        });
    }

    let handle = state.sessions.get(id, &token).await?;
    let reply = handle.try_submit_turn(&req.text).await?;
    tracing::debug!(session_id = %id, status = ?reply.status, "turn handled");
    Ok(Json(reply.into()))
}

/// Set one field of the form in progress (last write wins)
#[utoipa::path(
    put,
    path = "/v1/assistant/sessions/{id}/flow/fields",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = FlowFieldRequest,
    responses(
        (status = 200, description = "Updated form", body = FlowResponse),
        (status = 400, description = "No form in progress, or unknown field", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 409, description = "A turn is still running", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn set_flow_field(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
    Json(req): Json<FlowFieldRequest>,
) -> Result<Json<FlowResponse>, AppError> {
    let handle = state.sessions.get(id, &token).await?;
    handle.try_submit_flow_field(&req.key, &req.value)?;
    let flow = handle.read(|session| session.active_flow().cloned()).await;
    Ok(Json(FlowResponse { flow }))
}

/// Submit the form in progress now
#[utoipa::path(
    post,
    path = "/v1/assistant/sessions/{id}/flow/submit",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Submission outcome", body = TurnResponse),
        (status = 400, description = "No form in progress", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 409, description = "A turn is still running", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn submit_flow(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
) -> Result<Json<TurnResponse>, AppError> {
    let handle = state.sessions.get(id, &token).await?;
    let reply = handle.try_submit_flow_now().await?;
    Ok(Json(reply.into()))
}

/// Abandon the form in progress
#[utoipa::path(
    delete,
    path = "/v1/assistant/sessions/{id}/flow",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Form cancelled", body = TurnResponse),
        (status = 400, description = "No form in progress", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 409, description = "A turn is still running", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn cancel_flow(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
) -> Result<Json<TurnResponse>, AppError> {
    let handle = state.sessions.get(id, &token).await?;
    let reply = handle.try_cancel_flow()?;
    Ok(Json(reply.into()))
}

/// Everything said in the session so far, oldest first
#[utoipa::path(
    get,
    path = "/v1/assistant/sessions/{id}/transcript",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Transcript", body = TranscriptResponse),
        (status = 404, description = "Unknown session", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn get_transcript(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let handle = state.sessions.get(id, &token).await?;
    let (identity, messages) = handle
        .read(|session| (session.identity().clone(), session.transcript().to_vec()))
        .await;
    Ok(Json(TranscriptResponse {
        session_id: id,
        identity,
        messages,
    }))
}

/// End the session; its conversation memory is discarded
#[utoipa::path(
    delete,
    path = "/v1/assistant/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Unknown session", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "assistant"
)]
pub async fn close_session(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}
