//! The per-connection voice session.
//!
//! Owns the audio capture lifecycle, the in-flight turn (as a cancellable
//! handle), and the greeting. Composes the transcription connector with the
//! turn pipeline; the protocol handler drives it and applies the dispatch
//! guards.

use super::protocol::{AgentState, ServerEvent};
use super::turn::{run_turn, TurnContext, TurnInput};
use crate::providers::stt::{SttConnector, SttError, SttSession, TranscriptEvent};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The cancellable unit of work for one in-flight response.
struct TurnHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct AudioSession {
    /// Dropped on `stop`; the provider then flushes and closes.
    frames: Option<mpsc::Sender<Bytes>>,
    pump: JoinHandle<()>,
}

pub(crate) struct VoiceSession {
    stt: Arc<dyn SttConnector>,
    ctx: TurnContext,
    turn: Arc<Mutex<Option<TurnHandle>>>,
    audio: Option<AudioSession>,
}

impl VoiceSession {
    pub fn new(stt: Arc<dyn SttConnector>, ctx: TurnContext) -> Self {
        Self {
            stt,
            ctx,
            turn: Arc::new(Mutex::new(None)),
            audio: None,
        }
    }

    /// Opens the transcription stream and starts pumping transcripts.
    /// The handler's guard prevents double-start.
    pub async fn start_audio_session(&mut self) -> Result<(), SttError> {
        let SttSession { frames, events } = self.stt.open().await?;
        let pump = tokio::spawn(pump_transcripts(
            events,
            self.ctx.clone(),
            self.turn.clone(),
        ));
        self.audio = Some(AudioSession {
            frames: Some(frames),
            pump,
        });
        Ok(())
    }

    /// Forwards one raw audio frame to the transcription stream, unmodified.
    pub async fn send_audio(&self, frame: Bytes) {
        if let Some(frames) = self.audio.as_ref().and_then(|a| a.frames.as_ref()) {
            if frames.send(frame).await.is_err() {
                warn!("Transcription stream closed; dropping audio frame");
            }
        }
    }

    /// Ends the capture. The transcript pump keeps running so a final
    /// transcript that is still in flight can land; it exits when the
    /// provider closes the stream.
    pub async fn end_audio_session(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            audio.frames = None;
        }
    }

    /// Cancels the in-flight turn, if any. Safe to call when nothing is in
    /// flight; a cancelled turn's results are discarded, never delivered.
    pub async fn cancel_response(&self) {
        if let Some(handle) = self.turn.lock().await.take() {
            handle.cancel.cancel();
            handle.task.abort();
        }
    }

    /// Speaks the session greeting as a normal (cancellable) turn.
    pub async fn trigger_greeting(&self) {
        launch_turn(&self.turn, self.ctx.clone(), TurnInput::Greeting).await;
    }

    /// Runs a typed query through the answer pipeline.
    pub async fn handle_text_query(&self, text: String) {
        launch_turn(&self.turn, self.ctx.clone(), TurnInput::Query(text)).await;
    }

    /// Tears everything down on disconnect.
    pub async fn shutdown(&mut self) {
        self.cancel_response().await;
        if let Some(audio) = self.audio.take() {
            audio.pump.abort();
        }
    }
}

/// Starts a new turn, implicitly cancelling one still in flight: a new
/// turn always wins, consistent with `barge_in`.
async fn launch_turn(
    slot: &Arc<Mutex<Option<TurnHandle>>>,
    ctx: TurnContext,
    input: TurnInput,
) {
    let mut guard = slot.lock().await;
    if let Some(previous) = guard.take() {
        previous.cancel.cancel();
        previous.task.abort();
    }
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_turn(ctx, input, cancel.clone()));
    *guard = Some(TurnHandle { cancel, task });
}

/// Relays transcription events: interim transcripts become `asr_partial`,
/// a final transcript becomes `asr_final` and starts the answer pipeline.
async fn pump_transcripts(
    mut events: mpsc::Receiver<TranscriptEvent>,
    ctx: TurnContext,
    turn: Arc<Mutex<Option<TurnHandle>>>,
) {
    let mut finalized = false;
    while let Some(event) = events.recv().await {
        match event {
            TranscriptEvent::Partial(text) => {
                ctx.shared.emit(ServerEvent::AsrPartial { text }).await;
            }
            TranscriptEvent::Final(text) => {
                finalized = true;
                ctx.shared
                    .emit(ServerEvent::AsrFinal { text: text.clone() })
                    .await;
                if ctx.shared.state().await != AgentState::Processing {
                    ctx.shared.transition(AgentState::Processing).await;
                }
                launch_turn(&turn, ctx.clone(), TurnInput::Query(text)).await;
            }
        }
    }
    // The capture ended with nothing transcribed: no query is issued, and
    // the client must not be left waiting in `processing`.
    if !finalized && ctx.shared.state().await == AgentState::Processing {
        ctx.shared.transition(AgentState::Idle).await;
    }
}
