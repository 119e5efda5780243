use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors produced by the identity proxy routes.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Refresh requested without a refresh token.
    #[error("Missing refresh_token")]
    MissingRefreshToken,

    /// Upstream unreachable or answered with something other than JSON.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingRefreshToken => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            Self::Upstream(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Identity proxy error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal Server Error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}
