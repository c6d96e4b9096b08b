//! HTTP routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use skillbot_agent::{AgentError, ModelError, ReactAgent};
use skillbot_types::{AuthContext, ConversationState, ModelReply, Turn};

use crate::auth::{AuthGate, require_auth};

/// Prompt used by the plain chat endpoints when none is given.
pub const DEFAULT_PROMPT: &str = "Hello, please introduce yourself.";

/// Shared gateway state.
pub struct GatewayState {
    pub agent: Arc<ReactAgent>,
    pub gate: Arc<AuthGate>,
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    let protected = Router::new()
        .route("/chat", post(chat_handler))
        .route("/model/simple/chat", get(simple_chat_handler))
        .route("/model/stream/chat", get(stream_chat_handler))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
}

/// Error body for failed invocations: `{ "error", "kind" }`.
#[derive(Debug)]
pub enum ApiError {
    Agent(AgentError),
    Model(ModelError),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            ApiError::Agent(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), e.kind()),
            ApiError::Model(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "model_unavailable",
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
        };
        (status, Json(json!({ "error": error, "kind": kind }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptQuery {
    pub prompt: Option<String>,
}

impl PromptQuery {
    fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PROMPT)
    }
}

/// GET /health: unauthenticated liveness check.
async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "agent": state.agent.name(),
        "skills": state.agent.skills().count(),
        "tools": state.agent.tools().names(),
    }))
}

/// POST /chat: run the agent on `{ "message": ... }`, answer as text.
async fn chat_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChatRequest>,
) -> Result<String, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    // Dropped with this future when the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = state
        .agent
        .call(&req.message, &auth, &cancel)
        .await
        .map_err(ApiError::Agent)?;
    Ok(outcome.answer)
}

/// GET /model/simple/chat: one plain model call, no tools or skills.
async fn simple_chat_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PromptQuery>,
) -> Result<String, ApiError> {
    let conversation = ConversationState::new(None, query.prompt());
    match state
        .agent
        .model()
        .respond(&conversation, &[])
        .await
        .map_err(ApiError::Model)?
    {
        ModelReply::FinalAnswer(text) => Ok(text),
        ModelReply::ToolCall(call) => Err(ApiError::Model(ModelError::InvalidResponse(format!(
            "unexpected tool call '{}'",
            call.name
        )))),
    }
}

/// GET /model/stream/chat: the same call streamed as server-sent events.
async fn stream_chat_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PromptQuery>,
) -> Result<Response, ApiError> {
    let chunks = state
        .agent
        .model()
        .stream(vec![Turn::user(query.prompt())])
        .await
        .map_err(ApiError::Model)?;

    let events = chunks.map(|chunk| {
        Ok::<_, Infallible>(match chunk {
            Ok(text) => Event::default().data(text),
            Err(e) => Event::default().event("error").data(e.to_string()),
        })
    });
    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}
