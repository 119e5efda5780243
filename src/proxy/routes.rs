use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::config::ProxyConfig;
use super::error::ProxyError;
use super::state::ProxyState;
use crate::types::Credentials;

/// Create the identity proxy router.
///
/// Mounts `POST {auth_path}/login`, `/signup`, `/refresh` and `/logout`.
pub fn proxy_routes(config: ProxyConfig) -> Router {
    proxy_routes_with_client(config, reqwest::Client::new())
}

/// [`proxy_routes`] with a custom upstream HTTP client.
pub fn proxy_routes_with_client(config: ProxyConfig, http: reqwest::Client) -> Router {
    let auth_path = config.auth_path.clone();

    let state = ProxyState {
        http,
        config: Arc::new(config),
    };

    Router::new()
        .route(&format!("{auth_path}/login"), post(login))
        .route(&format!("{auth_path}/signup"), post(signup))
        .route(&format!("{auth_path}/refresh"), post(refresh))
        .route(&format!("{auth_path}/logout"), post(logout))
        .with_state(state)
}

// ── Login / Signup ─────────────────────────────────────────────────

async fn login(
    State(state): State<ProxyState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ProxyError> {
    forward_verbatim(&state, &state.config.login_path, &credentials).await
}

async fn signup(
    State(state): State<ProxyState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ProxyError> {
    forward_verbatim(&state, &state.config.signup_path, &credentials).await
}

// ── Refresh / Logout ───────────────────────────────────────────────

#[derive(Deserialize)]
struct RefreshTokenParams {
    #[serde(default)]
    refresh_token: Option<String>,
}

impl RefreshTokenParams {
    fn token(self) -> Option<String> {
        self.refresh_token.filter(|t| !t.is_empty())
    }
}

async fn refresh(
    State(state): State<ProxyState>,
    Json(params): Json<RefreshTokenParams>,
) -> Result<Response, ProxyError> {
    let refresh_token = params.token().ok_or(ProxyError::MissingRefreshToken)?;
    forward_json(
        &state,
        &state.config.refresh_path,
        &json!({ "refresh_token": refresh_token }),
    )
    .await
}

async fn logout(
    State(state): State<ProxyState>,
    Json(params): Json<RefreshTokenParams>,
) -> Result<Response, ProxyError> {
    let Some(refresh_token) = params.token() else {
        return Ok((
            StatusCode::OK,
            Json(json!({ "status": "No token to invalidate" })),
        )
            .into_response());
    };
    forward_json(
        &state,
        &state.config.logout_path,
        &json!({ "refresh_token": refresh_token }),
    )
    .await
}

// ── Helpers ────────────────────────────────────────────────────────

/// Forward and pass the upstream status, content type and body through untouched.
async fn forward_verbatim<B: Serialize>(
    state: &ProxyState,
    path: &str,
    body: &B,
) -> Result<Response, ProxyError> {
    let upstream = post_upstream(state, path, body).await?;
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let bytes = upstream.bytes().await?;

    Ok((status, [(CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Forward, requiring a JSON answer; the upstream status is preserved.
async fn forward_json<B: Serialize>(
    state: &ProxyState,
    path: &str,
    body: &B,
) -> Result<Response, ProxyError> {
    let upstream = post_upstream(state, path, body).await?;
    let status = upstream.status();
    let data: serde_json::Value = upstream.json().await?;

    if !status.is_success() {
        tracing::warn!(path = %path, status = %status, "Identity backend refused request");
    }
    Ok((status, Json(data)).into_response())
}

async fn post_upstream<B: Serialize>(
    state: &ProxyState,
    path: &str,
    body: &B,
) -> Result<reqwest::Response, ProxyError> {
    let url = state
        .config
        .upstream
        .join(path)
        .map_err(|e| ProxyError::Config(format!("upstream path {path}: {e}")))?;
    let response = state.http.post(url).json(body).send().await?;
    tracing::debug!(path = %path, status = %response.status(), "Forwarded to identity backend");
    Ok(response)
}
