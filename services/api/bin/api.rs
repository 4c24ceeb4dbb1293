//! Main Entrypoint for the Docent API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Constructing the upstream provider clients and session registry.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use docent_api::{
    config::Config,
    providers::{
        persona::HttpPersonaClient,
        rag::HttpRagClient,
        stt::WsSttConnector,
        tts::{FallbackSpeaker, HttpTtsProvider},
    },
    registry::SessionRegistry,
    router::create_router,
    state::AppState,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Provider Clients and Session Registry ---
    let http = reqwest::Client::new();

    let rag = Arc::new(HttpRagClient::from_config(&config, http.clone()));
    let speaker = Arc::new(FallbackSpeaker::new(
        Arc::new(HttpTtsProvider::new(
            "tts-primary",
            config.tts_primary_url.clone(),
            config.tts_primary_api_key.clone(),
            http.clone(),
        )),
        Arc::new(HttpTtsProvider::new(
            "tts-fallback",
            config.tts_fallback_url.clone(),
            config.tts_fallback_api_key.clone(),
            http.clone(),
        )),
    ));
    let stt = Arc::new(WsSttConnector::new(
        config.stt_ws_url.clone(),
        config.stt_api_key.clone(),
    ));
    let persona = Arc::new(HttpPersonaClient::new(
        config.persona_url.clone(),
        config.default_voice_id.clone(),
        http,
    ));

    let registry = Arc::new(SessionRegistry::new(config.session_ttl_secs));
    let _sweeper = registry.spawn_sweeper(Duration::from_secs(60));

    let app_state = Arc::new(AppState {
        stt,
        rag,
        speaker,
        persona,
        registry,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        ws_url = %config.public_ws_url,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
