//! REST Payloads for the Session Bootstrap Surface
//!
//! These types back the `/connect` endpoint that hands a client its
//! WebSocket credentials, and the shared error body. They double as the
//! OpenAPI schema source via `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Audio capture parameters the client must use for the session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioParams {
    #[schema(example = 16000)]
    pub sample_rate_hz: u32,
    #[schema(example = "pcm16")]
    pub encoding: String,
    #[schema(example = 1)]
    pub channels: u8,
    #[schema(example = 700)]
    pub vad_silence_ms: u32,
    #[schema(example = 0.5)]
    pub vad_threshold: f32,
}

/// Connection credentials issued by the bootstrap endpoint.
///
/// Provider secrets never appear here; the session id is the only
/// capability the client receives.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "ws://localhost:3000/ws?session=...")]
    pub ws_url: String,
    pub audio: AudioParams,
    /// Seconds until the issued session id expires unused.
    #[schema(example = 900)]
    pub expires_in: u64,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
