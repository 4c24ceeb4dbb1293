//! Axum Handlers for the REST API
//!
//! The REST surface is intentionally small: a bootstrap endpoint that
//! issues WebSocket connection credentials, and a health probe. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{AudioParams, ConnectResponse, ErrorResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Issue WebSocket connection credentials for a new voice session.
#[utoipa::path(
    post,
    path = "/connect",
    responses(
        (status = 201, description = "Session credentials issued", body = ConnectResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller opening the session")
    )
)]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))?;

    let session_id = state.registry.issue(user_id).await;
    let config = &state.config;

    let response = ConnectResponse {
        session_id,
        ws_url: format!("{}?session={}", config.public_ws_url, session_id),
        audio: AudioParams {
            sample_rate_hz: config.sample_rate_hz,
            encoding: config.audio_encoding.clone(),
            channels: config.audio_channels,
            vad_silence_ms: config.vad_silence_ms,
            vad_threshold: config.vad_threshold,
        },
        expires_in: config.session_ttl_secs,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Service is up"))
)]
pub async fn healthz() -> &'static str {
    "ok"
}
