//! Speech synthesis with primary/fallback provider failover.
//!
//! Both providers expose the same HTTP contract: POST the text and voice
//! parameters, receive a base64 audio payload. A failed primary call is a
//! warning, not a client-visible error; only a failed fallback surfaces.

use crate::audio;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("{provider}: synthesis request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned {status}: {detail}")]
    Provider {
        provider: String,
        status: u16,
        detail: String,
    },
    #[error("{provider}: synthesis response contained no audio")]
    EmptyAudio { provider: String },
}

/// Synthesis parameters, identical for every provider attempt in a call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    pub voice_id: String,
    pub sample_rate_hz: u32,
    pub encoding: String,
}

/// One speech-synthesis provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<Bytes, TtsError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    sample_rate_hz: u32,
    encoding: &'a str,
}

#[derive(Deserialize)]
struct SynthesisResponse {
    audio: String,
}

/// A provider reached over plain HTTP.
pub struct HttpTtsProvider {
    name: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpTtsProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpTtsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<Bytes, TtsError> {
        let request = SynthesisRequest {
            text,
            voice_id: &params.voice_id,
            sample_rate_hz: params.sample_rate_hz,
            encoding: &params.encoding,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|source| TtsError::Transport {
                provider: self.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TtsError::Provider {
                provider: self.name.clone(),
                status: status.as_u16(),
                detail,
            });
        }

        let payload: SynthesisResponse =
            response
                .json()
                .await
                .map_err(|source| TtsError::Transport {
                    provider: self.name.clone(),
                    source,
                })?;
        let bytes = audio::decode_base64_audio(&payload.audio);
        if bytes.is_empty() {
            return Err(TtsError::EmptyAudio {
                provider: self.name.clone(),
            });
        }
        Ok(Bytes::from(bytes))
    }
}

/// Primary/secondary failover for a single `speak` call.
///
/// Each call is independent: the fallback decision is re-evaluated from
/// scratch every time and nothing (chunk counts, provider choice, errors)
/// carries over between calls.
pub struct FallbackSpeaker {
    primary: Arc<dyn SpeechSynthesizer>,
    secondary: Arc<dyn SpeechSynthesizer>,
}

impl FallbackSpeaker {
    pub fn new(primary: Arc<dyn SpeechSynthesizer>, secondary: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { primary, secondary }
    }

    /// Synthesizes `text`, returning the audio framed into wire-sized
    /// chunks in byte order.
    ///
    /// Primary attempt, then one secondary attempt with identical
    /// parameters. A primary failure is logged as a warning only; a
    /// secondary failure is returned with the secondary's detail and no
    /// chunks are produced.
    pub async fn speak(
        &self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<Bytes>, TtsError> {
        let audio = match self.primary.synthesize(text, params).await {
            Ok(audio) => audio,
            Err(primary_err) => {
                warn!(
                    provider = self.primary.name(),
                    fallback = self.secondary.name(),
                    error = %primary_err,
                    "Primary synthesis failed; retrying on fallback provider"
                );
                self.secondary.synthesize(text, params).await?
            }
        };
        Ok(audio::frame_chunks(&audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_base64_audio, AUDIO_CHUNK_BYTES};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> SynthesisParams {
        SynthesisParams {
            voice_id: "amber".to_string(),
            sample_rate_hz: 16_000,
            encoding: "pcm16".to_string(),
        }
    }

    fn audio_body(bytes: &[u8]) -> serde_json::Value {
        serde_json::json!({ "audio": encode_base64_audio(bytes) })
    }

    fn provider(name: &str, server: &MockServer) -> Arc<dyn SpeechSynthesizer> {
        Arc::new(HttpTtsProvider::new(
            name,
            format!("{}/synthesize", server.uri()),
            format!("{name}-key"),
            reqwest::Client::new(),
        ))
    }

    #[tokio::test]
    async fn test_primary_success_chunks_in_order() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        let audio: Vec<u8> = (0..40_000u32).map(|i| (i % 239) as u8).collect();
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .and(header("authorization", "Bearer primary-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(audio_body(&audio)))
            .expect(1)
            .mount(&primary_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&secondary_server)
            .await;

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        let chunks = speaker.speak("hello", &params()).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[..2].iter().all(|c| c.len() == AUDIO_CHUNK_BYTES));
        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(reassembled, audio);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_secondary() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&primary_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(audio_body(b"fallback audio")))
            .expect(1)
            .mount(&secondary_server)
            .await;

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        let chunks = speaker.speak("hello", &params()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], b"fallback audio");
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_secondary_detail() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&primary_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("voice model unavailable"))
            .expect(1)
            .mount(&secondary_server)
            .await;

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        let err = speaker.speak("hello", &params()).await.unwrap_err();
        match err {
            TtsError::Provider {
                provider,
                status,
                detail,
            } => {
                assert_eq!(provider, "secondary");
                assert_eq!(status, 502);
                assert_eq!(detail, "voice model unavailable");
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_five_fallback_calls_are_independent() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(5)
            .mount(&primary_server)
            .await;
        for i in 0..5 {
            Mock::given(method("POST"))
                .and(body_string_contains(format!("call-{i}")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(audio_body(format!("audio for call-{i}").as_bytes())),
                )
                .expect(1)
                .mount(&secondary_server)
                .await;
        }

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        let mut delivered = Vec::new();
        for i in 0..5 {
            let chunks = speaker
                .speak(&format!("call-{i}"), &params())
                .await
                .expect("fallback should succeed");
            assert_eq!(chunks.len(), 1);
            delivered.push(chunks[0].clone());
        }

        // No cross-call leakage: each call produced its own audio.
        for i in 0..5 {
            assert_eq!(&delivered[i][..], format!("audio for call-{i}").as_bytes());
            for j in (i + 1)..5 {
                assert_ne!(delivered[i], delivered[j]);
            }
        }
        // Mock expectations verify 5 primary + 5 secondary calls on drop.
    }

    #[tokio::test]
    async fn test_call_after_total_failure_recovers() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        {
            let _down_primary = Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount_as_scoped(&primary_server)
                .await;
            let _down_secondary = Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount_as_scoped(&secondary_server)
                .await;
            assert!(speaker.speak("first", &params()).await.is_err());
        }

        // Providers recover; the next call is evaluated from scratch.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(audio_body(b"recovered")))
            .expect(1)
            .mount(&primary_server)
            .await;

        let chunks = speaker.speak("second", &params()).await.unwrap();
        assert_eq!(&chunks[0][..], b"recovered");
    }

    #[tokio::test]
    async fn test_empty_audio_payload_is_an_error() {
        let primary_server = MockServer::start().await;
        let secondary_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"audio": ""})))
            .expect(1)
            .mount(&primary_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(audio_body(b"plan b")))
            .expect(1)
            .mount(&secondary_server)
            .await;

        let speaker = FallbackSpeaker::new(
            provider("primary", &primary_server),
            provider("secondary", &secondary_server),
        );

        // An empty payload counts as a primary failure and falls back.
        let chunks = speaker.speak("hello", &params()).await.unwrap();
        assert_eq!(&chunks[0][..], b"plan b");
    }
}
