//! Exchange API handlers.

use super::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::exchange::{ExchangeError, ExchangeRequest};

/// Client-facing gateway failures, rendered as `400 {"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// An empty body means an all-defaults request.
fn parse_request(body: &[u8]) -> Result<ExchangeRequest, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExchangeRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

// ── Handlers ────────────────────────────────────────────────────

/// POST /api/exchange/{component_id}/{session_id}
pub async fn handle_exchange(
    State(state): State<AppState>,
    Path((component_id, session_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = parse_request(&body)?;
    let response = state
        .exchange
        .exchange(&component_id, &session_id, &request)
        .await?;
    Ok(Json(response).into_response())
}

/// GET /api/config/{component_id}
pub async fn handle_config(
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> impl IntoResponse {
    Json(state.exchange.components().config(&component_id))
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.exchange.sessions().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_is_default_request() {
        assert_eq!(parse_request(b"").unwrap(), ExchangeRequest::default());
        assert_eq!(parse_request(b" \n").unwrap(), ExchangeRequest::default());
    }

    #[test]
    fn malformed_body_is_invalid_request() {
        let err = parse_request(b"{not json").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn not_found_message_matches_wire_format() {
        let err = GatewayError::from(ExchangeError::ComponentNotFound("x".into()));
        assert_eq!(err.to_string(), "Component: x not found");
    }
}
