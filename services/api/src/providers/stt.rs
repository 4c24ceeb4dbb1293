//! Streaming speech-to-text over the transcription provider's WebSocket.
//!
//! Audio frames are forwarded to the provider as binary messages exactly as
//! they arrive; the provider answers with interim and final transcripts.
//! Dropping the frame sender ends the capture: the client task asks the
//! provider to finalize, drains any late transcripts, and closes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("failed to reach transcription provider: {0}")]
    Connect(String),
}

/// A transcription update from the provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Partial(String),
    Final(String),
}

/// One live transcription stream.
///
/// `frames` accepts raw audio frames; dropping it flushes and closes the
/// provider stream. `events` yields transcripts until the provider closes.
pub struct SttSession {
    pub frames: mpsc::Sender<Bytes>,
    pub events: mpsc::Receiver<TranscriptEvent>,
}

/// Opens transcription streams against the configured provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SttConnector: Send + Sync {
    async fn open(&self) -> Result<SttSession, SttError>;
}

// --- Provider wire types ---
mod wire {
    use serde::{Deserialize, Serialize};

    /// Messages sent to the transcription provider.
    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum Command {
        Finalize,
    }

    /// Messages received from the transcription provider.
    #[derive(Deserialize, Debug)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum Event {
        Transcript { text: String, is_final: bool },
        #[serde(other)]
        Unknown,
    }
}

/// Maps a raw provider message to a transcript event, if it carries one.
fn parse_transcript(raw: &str) -> Option<TranscriptEvent> {
    match serde_json::from_str::<wire::Event>(raw) {
        Ok(wire::Event::Transcript { text, is_final: true }) => Some(TranscriptEvent::Final(text)),
        Ok(wire::Event::Transcript { text, is_final: false }) => {
            Some(TranscriptEvent::Partial(text))
        }
        Ok(wire::Event::Unknown) => None,
        Err(_) => {
            debug!("Ignoring unparseable transcription provider message");
            None
        }
    }
}

/// Connector for the provider's WebSocket streaming API.
pub struct WsSttConnector {
    url: String,
    api_key: String,
}

impl WsSttConnector {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SttConnector for WsSttConnector {
    async fn open(&self) -> Result<SttSession, SttError> {
        let mut request = self
            .url
            .clone()
            .into_client_request()
            .map_err(|e| SttError::Connect(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|_| SttError::Connect("invalid API key header".to_string()))?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| SttError::Connect(e.to_string()))?;
        debug!("Connected to transcription provider.");

        let (frames_tx, mut frames_rx) = mpsc::channel::<Bytes>(64);
        let (events_tx, events_rx) = mpsc::channel::<TranscriptEvent>(32);

        tokio::spawn(async move {
            let (mut provider_tx, mut provider_rx) = ws_stream.split();
            loop {
                tokio::select! {
                    frame = frames_rx.recv() => match frame {
                        Some(bytes) => {
                            if provider_tx.send(WsMessage::Binary(bytes)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            // Capture ended: flush and drain late transcripts.
                            if let Ok(finalize) = serde_json::to_string(&wire::Command::Finalize) {
                                let _ = provider_tx.send(WsMessage::Text(finalize.into())).await;
                            }
                            while let Some(Ok(msg)) = provider_rx.next().await {
                                match msg {
                                    WsMessage::Text(text) => {
                                        if let Some(event) = parse_transcript(&text) {
                                            if events_tx.send(event).await.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                    WsMessage::Close(_) => break,
                                    _ => {}
                                }
                            }
                            break;
                        }
                    },
                    msg = provider_rx.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = parse_transcript(&text) {
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Error reading from transcription provider: {}", e);
                            break;
                        }
                    },
                }
            }
        });

        Ok(SttSession {
            frames: frames_tx,
            events: events_rx,
        })
    }
}
