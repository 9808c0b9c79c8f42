use crate::chat::ChatError;
use crate::query::QueryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

/// Error returned by a handler before the response body starts.
///
/// Rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// Request failed validation.
    BadRequest(String),
    /// Body is not a well-formed chat request.
    Unprocessable(String),
    /// The provider failed before generation started.
    BadGateway(String),
    /// The query deadline passed before generation started.
    GatewayTimeout(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(detail)
            | ApiError::Unprocessable(detail)
            | ApiError::BadGateway(detail)
            | ApiError::GatewayTimeout(detail) => detail,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        ApiError::BadRequest(error.to_string())
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Timeout(_) => ApiError::GatewayTimeout(error.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("{}: {}", status, self.detail());
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
