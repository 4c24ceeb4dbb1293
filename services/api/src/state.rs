//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the provider
//! clients, the session registry, and configuration shared by all handlers.

use crate::config::Config;
use crate::providers::persona::PersonaSource;
use crate::providers::rag::RagBackend;
use crate::providers::stt::SttConnector;
use crate::providers::tts::FallbackSpeaker;
use crate::registry::SessionRegistry;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub stt: Arc<dyn SttConnector>,
    pub rag: Arc<dyn RagBackend>,
    pub speaker: Arc<FallbackSpeaker>,
    pub persona: Arc<dyn PersonaSource>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}
