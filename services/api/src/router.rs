//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application:
//! the session bootstrap endpoint, the health probe, the WebSocket
//! endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{AudioParams, ConnectResponse, ErrorResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::connect, handlers::healthz),
    components(schemas(ConnectResponse, AudioParams, ErrorResponse)),
    tags(
        (name = "Docent API", description = "Session bootstrap for the docent voice agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/connect", post(handlers::connect))
        .route("/healthz", get(handlers::healthz))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
