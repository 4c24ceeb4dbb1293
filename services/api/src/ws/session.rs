//! Manages the WebSocket connection lifecycle for an agent session.
//!
//! The connection controller is split in two: `SessionHandler` holds the
//! protocol state machine and is driven one inbound frame at a time, while
//! the socket glue (`handle_socket` plus a writer task) moves frames
//! between the socket and the handler. The handler never touches the
//! socket, so the whole protocol is testable without one.

use super::protocol::{self, AgentState, ClientMessage, Inbound, Outbound, ServerEvent};
use super::turn::TurnContext;
use super::voice::VoiceSession;
use crate::providers::persona::PersonaSource;
use crate::providers::rag::RagBackend;
use crate::providers::stt::SttConnector;
use crate::providers::tts::FallbackSpeaker;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Session state and outbound sink shared between the handler and the
/// tasks it spawns (transcript pump, turns).
pub(crate) struct SessionShared {
    state: Mutex<AgentState>,
    outbound: mpsc::Sender<Outbound>,
}

impl SessionShared {
    fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            state: Mutex::new(AgentState::Connecting),
            outbound,
        }
    }

    /// Moves to `next` and announces it. The `state` event is queued before
    /// control returns to the caller; transitions are never coalesced.
    pub async fn transition(&self, next: AgentState) {
        let mut state = self.state.lock().await;
        *state = next;
        self.send(Outbound::Event(ServerEvent::State { state: next }))
            .await;
    }

    pub async fn state(&self) -> AgentState {
        *self.state.lock().await
    }

    pub async fn emit(&self, event: ServerEvent) {
        self.send(Outbound::Event(event)).await;
    }

    pub async fn emit_audio(&self, chunk: Bytes) {
        self.send(Outbound::Audio(chunk)).await;
    }

    async fn send(&self, frame: Outbound) {
        // A closed channel means the client is gone; the session is already
        // winding down and frames can only be dropped.
        let _ = self.outbound.send(frame).await;
    }
}

/// Provider handles and session defaults threaded into each connection.
#[derive(Clone)]
pub(crate) struct SessionDeps {
    pub stt: Arc<dyn SttConnector>,
    pub rag: Arc<dyn RagBackend>,
    pub speaker: Arc<FallbackSpeaker>,
    pub persona: Arc<dyn PersonaSource>,
    pub sample_rate_hz: u32,
    pub audio_encoding: String,
}

impl SessionDeps {
    fn from_state(state: &AppState) -> Self {
        Self {
            stt: state.stt.clone(),
            rag: state.rag.clone(),
            speaker: state.speaker.clone(),
            persona: state.persona.clone(),
            sample_rate_hz: state.config.sample_rate_hz,
            audio_encoding: state.config.audio_encoding.clone(),
        }
    }
}

/// The per-connection protocol state machine.
///
/// Exclusively owned by the connection's read loop; inbound messages are
/// dispatched in arrival order, never in parallel.
pub(crate) struct SessionHandler {
    audio_session_active: bool,
    voice: VoiceSession,
    shared: Arc<SessionShared>,
}

impl SessionHandler {
    pub fn new(user_id: String, deps: SessionDeps, outbound: mpsc::Sender<Outbound>) -> Self {
        let shared = Arc::new(SessionShared::new(outbound));
        let ctx = TurnContext {
            shared: shared.clone(),
            rag: deps.rag,
            speaker: deps.speaker,
            persona_source: deps.persona,
            persona: Arc::new(OnceCell::new()),
            history: Arc::new(Mutex::new(Vec::new())),
            user_id,
            sample_rate_hz: deps.sample_rate_hz,
            audio_encoding: deps.audio_encoding,
        };
        Self {
            audio_session_active: false,
            voice: VoiceSession::new(deps.stt, ctx),
            shared,
        }
    }

    /// Announces the initial state and speaks the greeting.
    pub async fn on_connect(&mut self) {
        self.shared.transition(AgentState::Connecting).await;
        self.voice.trigger_greeting().await;
    }

    /// Parses and dispatches one inbound text frame. Malformed input is
    /// answered with a non-fatal error event and the connection carries on;
    /// unrecognised tags are ignored.
    pub async fn on_text_message(&mut self, raw: &str) {
        match protocol::parse_inbound(raw) {
            Inbound::Message(message) => self.dispatch(message).await,
            Inbound::Ignored => {}
            Inbound::Invalid => {
                self.shared
                    .emit(ServerEvent::Error {
                        message: "Invalid message format".to_string(),
                        code: None,
                    })
                    .await;
            }
        }
    }

    /// Forwards a binary audio frame while a capture is active; frames
    /// outside an active capture are dropped without error.
    pub async fn on_binary_message(&mut self, frame: Bytes) {
        if !self.audio_session_active {
            return;
        }
        self.voice.send_audio(frame).await;
    }

    pub async fn on_close(&mut self) {
        self.voice.shutdown().await;
    }

    async fn dispatch(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Start => {
                if self.audio_session_active {
                    return;
                }
                match self.voice.start_audio_session().await {
                    Ok(()) => {
                        self.audio_session_active = true;
                        self.shared.transition(AgentState::Listening).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to open transcription stream");
                        self.shared
                            .emit(ServerEvent::Error {
                                message: "Could not start audio capture.".to_string(),
                                code: Some("stt_unavailable".to_string()),
                            })
                            .await;
                    }
                }
            }
            ClientMessage::Stop => {
                if !self.audio_session_active {
                    return;
                }
                self.audio_session_active = false;
                // State first: the client sees feedback before the
                // teardown call completes.
                self.shared.transition(AgentState::Processing).await;
                self.voice.end_audio_session().await;
            }
            ClientMessage::BargeIn => {
                self.voice.cancel_response().await;
                self.shared.transition(AgentState::Listening).await;
            }
            ClientMessage::Text { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                self.shared.transition(AgentState::Processing).await;
                self.voice.handle_text_query(text.to_string()).await;
            }
            // Reserved: tool callbacks are not acted on in this core.
            ClientMessage::ToolResult { .. } => {}
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    session: Option<Uuid>,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session))
}

/// Main handler for an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session: Option<Uuid>) {
    let conn_id: u32 = rand::random();
    info!(conn_id, "New WebSocket connection. Claiming session credentials...");

    let claim = match session {
        Some(id) => state.registry.claim(id).await.map(|entry| (id, entry)),
        None => None,
    };

    let (socket_tx, mut socket_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(256);
    let writer = tokio::spawn(write_outbound(socket_tx, out_rx));

    let Some((session_id, entry)) = claim else {
        warn!(conn_id, "WebSocket connection with missing or expired session credentials.");
        let _ = out_tx
            .send(Outbound::Event(ServerEvent::Error {
                message: "Unknown or expired session".to_string(),
                code: Some("unauthorized".to_string()),
            }))
            .await;
        drop(out_tx);
        let _ = writer.await;
        return;
    };

    let span = info_span!("agent_session", %session_id);
    async move {
        info!("New agent session established.");
        let mut handler = SessionHandler::new(entry.user_id, SessionDeps::from_state(&state), out_tx);
        handler.on_connect().await;

        loop {
            match socket_rx.next().await {
                Some(Ok(ws_msg)) => match ws_msg {
                    Message::Text(text) => handler.on_text_message(&text).await,
                    Message::Binary(data) => handler.on_binary_message(data).await,
                    Message::Close(_) => {
                        info!("Client sent close frame. Shutting down session.");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                },
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break;
                }
                None => break,
            }
        }

        handler.on_close().await;
        info!("WebSocket connection closed and agent session terminated.");
    }
    .instrument(span)
    .await;

    let _ = writer.await;
}

/// Drains the outbound channel into the socket: events as JSON text
/// frames, audio chunks as binary frames.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = frames.recv().await {
        let message = match frame {
            Outbound::Event(event) => match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    error!("Failed to serialize server event: {}", e);
                    continue;
                }
            },
            Outbound::Audio(chunk) => Message::Binary(chunk),
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
}
