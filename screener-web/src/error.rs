//! Error types for screener-web.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Failures of the service itself, as opposed to a failed screener run.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Page rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let code = match &self {
            WebError::Render(_) => "RENDER_FAILED",
            WebError::Internal(_) => "INTERNAL_ERROR",
        };
        tracing::error!(error = %self, "Request failed");

        let body = serde_json::json!({
            "success": false,
            "error": ApiError {
                code: code.to_string(),
                message: self.to_string(),
            }
        });

        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
