use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// WebSocket URL advertised to clients by the bootstrap endpoint.
    pub public_ws_url: String,

    // Retrieval backend.
    pub rag_base_url: String,
    pub rag_internal_token: String,
    pub rag_privilege_mode: String,
    pub rag_max_tier: u8,

    // Streaming transcription provider.
    pub stt_ws_url: String,
    pub stt_api_key: String,

    // Speech synthesis providers, tried in order.
    pub tts_primary_url: String,
    pub tts_primary_api_key: String,
    pub tts_fallback_url: String,
    pub tts_fallback_api_key: String,

    /// Persona/config endpoint; when unset, built-in defaults apply.
    pub persona_url: Option<String>,
    pub default_voice_id: String,

    // Audio parameters advertised to clients and sent to synthesis.
    pub sample_rate_hz: u32,
    pub audio_encoding: String,
    pub audio_channels: u8,
    pub vad_silence_ms: u32,
    pub vad_threshold: f32,

    pub session_ttl_secs: u64,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let public_ws_url =
            std::env::var("PUBLIC_WS_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            public_ws_url,
            rag_base_url: required("RAG_BACKEND_URL")?,
            rag_internal_token: required("RAG_INTERNAL_TOKEN")?,
            rag_privilege_mode: std::env::var("RAG_PRIVILEGE_MODE")
                .unwrap_or_else(|_| "standard".to_string()),
            rag_max_tier: parsed_or("RAG_MAX_TIER", 3)?,
            stt_ws_url: required("STT_WS_URL")?,
            stt_api_key: required("STT_API_KEY")?,
            tts_primary_url: required("TTS_PRIMARY_URL")?,
            tts_primary_api_key: required("TTS_PRIMARY_API_KEY")?,
            tts_fallback_url: required("TTS_FALLBACK_URL")?,
            tts_fallback_api_key: required("TTS_FALLBACK_API_KEY")?,
            persona_url: std::env::var("PERSONA_CONFIG_URL").ok(),
            default_voice_id: std::env::var("DEFAULT_VOICE_ID")
                .unwrap_or_else(|_| "amber".to_string()),
            sample_rate_hz: parsed_or("AUDIO_SAMPLE_RATE_HZ", 16_000)?,
            audio_encoding: std::env::var("AUDIO_ENCODING")
                .unwrap_or_else(|_| "pcm16".to_string()),
            audio_channels: parsed_or("AUDIO_CHANNELS", 1)?,
            vad_silence_ms: parsed_or("VAD_SILENCE_MS", 700)?,
            vad_threshold: parsed_or("VAD_THRESHOLD", 0.5)?,
            session_ttl_secs: parsed_or("SESSION_TTL_SECS", 900)?,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const ALL_VARS: &[&str] = &[
        "BIND_ADDRESS",
        "PUBLIC_WS_URL",
        "RAG_BACKEND_URL",
        "RAG_INTERNAL_TOKEN",
        "RAG_PRIVILEGE_MODE",
        "RAG_MAX_TIER",
        "STT_WS_URL",
        "STT_API_KEY",
        "TTS_PRIMARY_URL",
        "TTS_PRIMARY_API_KEY",
        "TTS_FALLBACK_URL",
        "TTS_FALLBACK_API_KEY",
        "PERSONA_CONFIG_URL",
        "DEFAULT_VOICE_ID",
        "AUDIO_SAMPLE_RATE_HZ",
        "AUDIO_ENCODING",
        "AUDIO_CHANNELS",
        "VAD_SILENCE_MS",
        "VAD_THRESHOLD",
        "SESSION_TTL_SECS",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in ALL_VARS {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("RAG_BACKEND_URL", "http://localhost:9100");
            env::set_var("RAG_INTERNAL_TOKEN", "internal-test-token");
            env::set_var("STT_WS_URL", "wss://stt.test/v1/stream");
            env::set_var("STT_API_KEY", "stt-test-key");
            env::set_var("TTS_PRIMARY_URL", "https://tts-primary.test/synthesize");
            env::set_var("TTS_PRIMARY_API_KEY", "primary-test-key");
            env::set_var("TTS_FALLBACK_URL", "https://tts-fallback.test/synthesize");
            env::set_var("TTS_FALLBACK_API_KEY", "fallback-test-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.public_ws_url, "ws://localhost:3000/ws");
        assert_eq!(config.rag_base_url, "http://localhost:9100");
        assert_eq!(config.rag_privilege_mode, "standard");
        assert_eq!(config.rag_max_tier, 3);
        assert_eq!(config.persona_url, None);
        assert_eq!(config.default_voice_id, "amber");
        assert_eq!(config.sample_rate_hz, 16_000);
        assert_eq!(config.audio_encoding, "pcm16");
        assert_eq!(config.audio_channels, 1);
        assert_eq!(config.vad_silence_ms, 700);
        assert_eq!(config.vad_threshold, 0.5);
        assert_eq!(config.session_ttl_secs, 900);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("PUBLIC_WS_URL", "wss://voice.example.com/ws");
            env::set_var("RAG_PRIVILEGE_MODE", "elevated");
            env::set_var("RAG_MAX_TIER", "5");
            env::set_var("PERSONA_CONFIG_URL", "http://localhost:9200/persona");
            env::set_var("DEFAULT_VOICE_ID", "marcus");
            env::set_var("AUDIO_SAMPLE_RATE_HZ", "24000");
            env::set_var("SESSION_TTL_SECS", "120");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.public_ws_url, "wss://voice.example.com/ws");
        assert_eq!(config.rag_privilege_mode, "elevated");
        assert_eq!(config.rag_max_tier, 5);
        assert_eq!(
            config.persona_url.as_deref(),
            Some("http://localhost:9200/persona")
        );
        assert_eq!(config.default_voice_id, "marcus");
        assert_eq!(config.sample_rate_hz, 24_000);
        assert_eq!(config.session_ttl_secs, 120);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_max_tier() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RAG_MAX_TIER", "many");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, value) => {
                assert_eq!(var, "RAG_MAX_TIER");
                assert_eq!(value, "many");
            }
            _ => panic!("Expected InvalidValue for RAG_MAX_TIER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_required_var() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::remove_var("STT_API_KEY");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(name) => assert_eq!(name, "STT_API_KEY"),
            _ => panic!("Expected MissingVar for STT_API_KEY"),
        }
    }
}
