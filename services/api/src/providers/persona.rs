//! Client for the session/persona config endpoint.
//!
//! The endpoint stores a per-caller display name, voice, greeting, and
//! personality prompt. Absence of a stored config — or any fetch failure —
//! yields the documented defaults, never an error.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_AGENT_NAME: &str = "Docent";
pub const DEFAULT_GREETING: &str =
    "Hello! I'm your document assistant. Ask me about anything in your library.";
pub const DEFAULT_PERSONALITY: &str =
    "You are a helpful, concise voice assistant for a private document library.";

/// Resolved persona for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaConfig {
    pub name: String,
    pub voice_id: String,
    pub greeting: String,
    pub personality_prompt: String,
}

impl PersonaConfig {
    /// The documented defaults, with the service-wide default voice.
    pub fn fallback(default_voice_id: &str) -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            voice_id: default_voice_id.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            personality_prompt: DEFAULT_PERSONALITY.to_string(),
        }
    }
}

/// Source of per-caller persona configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonaSource: Send + Sync {
    /// Never fails: an absent or unreachable config yields the defaults.
    async fn fetch(&self, user_id: &str) -> PersonaConfig;
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoredPersona {
    name: Option<String>,
    voice_id: Option<String>,
    greeting: Option<String>,
    personality_prompt: Option<String>,
}

/// HTTP client for the persona config endpoint.
pub struct HttpPersonaClient {
    endpoint: Option<String>,
    default_voice_id: String,
    client: reqwest::Client,
}

impl HttpPersonaClient {
    pub fn new(
        endpoint: Option<String>,
        default_voice_id: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint,
            default_voice_id: default_voice_id.into(),
            client,
        }
    }
}

#[async_trait]
impl PersonaSource for HttpPersonaClient {
    async fn fetch(&self, user_id: &str) -> PersonaConfig {
        let defaults = PersonaConfig::fallback(&self.default_voice_id);
        let Some(endpoint) = &self.endpoint else {
            return defaults;
        };

        let stored = match self
            .client
            .get(endpoint)
            .query(&[("user", user_id)])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                match response.json::<StoredPersona>().await {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!(error = %e, "Persona config response was unreadable; using defaults");
                        return defaults;
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "Persona config fetch failed; using defaults");
                return defaults;
            }
            Err(e) => {
                warn!(error = %e, "Persona config endpoint unreachable; using defaults");
                return defaults;
            }
        };

        // Missing fields fall back individually.
        PersonaConfig {
            name: stored.name.unwrap_or(defaults.name),
            voice_id: stored.voice_id.unwrap_or(defaults.voice_id),
            greeting: stored.greeting.unwrap_or(defaults.greeting),
            personality_prompt: stored.personality_prompt.unwrap_or(defaults.personality_prompt),
        }
    }
}
