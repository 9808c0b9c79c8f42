use super::error::ApiError;
use super::AppState;
use crate::chat::{normalize, ChatRequest};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

/// `POST /api/chat`
///
/// The body is parsed as JSON whatever its content type, so clients limited
/// to `text/plain` can still post a chat request.
pub(super) async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let mut request: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::Unprocessable(e.to_string()))?;
    debug!("Chat request with {} messages", request.messages.len());

    let chat = normalize(&mut request, &state.template)?;
    let answer = state.pipeline.start(chat).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(answer.into_stream()),
    )
        .into_response())
}

/// `GET /api/health`
pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "passages": state.pipeline.engine().index().len(),
    }))
}
