//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use storefront_common::Error;

/// A failed request: what the handler was doing and why it failed
#[derive(Debug)]
pub struct ApiError {
    action: &'static str,
    source: Error,
}

impl ApiError {
    /// Map errors raised while performing `action` (e.g. "create store")
    pub fn during(action: &'static str) -> impl FnOnce(Error) -> Self {
        move |source| Self { action, source }
    }

    /// HTTP status for the underlying error
    pub fn status(&self) -> StatusCode {
        match &self.source {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.source.is_client_error() {
            error!(action = self.action, error = %self.source, "request failed");
        }
        let body = match &self.source {
            Error::Validation { message, .. } => json!({ "error": message }),
            Error::NotFound { .. } => json!({ "error": "Store not found" }),
            Error::Conflict { message } => json!({
                "error": format!("Failed to {}", self.action),
                "details": message,
            }),
            other => json!({
                "error": format!("Failed to {}", self.action),
                "details": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
