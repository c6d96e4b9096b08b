//! Shared-secret token gate.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use skillbot_config::AuthConfig;
use skillbot_types::AuthContext;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("missing auth token header '{0}'")]
    MissingToken(String),
    #[error("invalid auth token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Maps configured tokens to principal names.
pub struct AuthGate {
    header: HeaderName,
    tokens: HashMap<String, String>,
}

impl AuthGate {
    pub fn new(header: &str, tokens: HashMap<String, String>) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes())?,
            tokens,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, InvalidHeaderName> {
        Self::new(&config.header, config.tokens.clone())
    }

    pub fn header_name(&self) -> &str {
        self.header.as_str()
    }

    /// Validate the token header and resolve its principal.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let value = headers
            .get(&self.header)
            .ok_or_else(|| AuthError::MissingToken(self.header.to_string()))?;
        let token = value.to_str().map_err(|_| AuthError::InvalidToken)?.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken(self.header.to_string()));
        }
        let principal = self.tokens.get(token).ok_or(AuthError::InvalidToken)?;
        Ok(AuthContext::new(token, Some(principal.clone())))
    }
}

/// Middleware: reject before any handler runs, or attach the
/// [`AuthContext`] to the request.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.authenticate(request.headers()) {
        Ok(ctx) => {
            tracing::debug!(
                principal = ctx.principal().unwrap_or_default(),
                path = %request.uri().path(),
                "Request authenticated"
            );
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(header = gate.header_name(), path = %request.uri().path(), "Rejected request: {e}");
            e.into_response()
        }
    }
}
