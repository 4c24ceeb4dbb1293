//! The per-turn answer pipeline.
//!
//! One turn runs tool routing, retrieval (or a listing fetch), the silence
//! substitution policy, speech sanitisation, and synthesis as a sequential
//! chain. The whole chain is cancellable: `barge_in` (or a newer turn)
//! flips the token and the pipeline stops before emitting anything further.

use super::protocol::{AgentState, ServerEvent};
use super::session::SessionShared;
use crate::providers::persona::{PersonaConfig, PersonaSource};
use crate::providers::rag::{HistoryTurn, RagBackend, Role};
use crate::providers::tts::{FallbackSpeaker, SynthesisParams};
use docent_core::intent::{self, ListingKind, ToolAction};
use docent_core::rag::RagResponse;
use docent_core::speech;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Fallback when a listing/stats endpoint cannot be reached.
pub(crate) const LISTING_UNAVAILABLE: &str =
    "I couldn't reach the document index just now. Please try again in a moment.";
pub(crate) const NO_DOCUMENTS: &str =
    "Your library is empty; no documents have been indexed yet.";
pub(crate) const NO_GAPS: &str = "I didn't find any coverage gaps in your library.";

/// Everything a spawned turn needs. Cloned once per turn.
#[derive(Clone)]
pub(crate) struct TurnContext {
    pub shared: Arc<SessionShared>,
    pub rag: Arc<dyn RagBackend>,
    pub speaker: Arc<FallbackSpeaker>,
    pub persona_source: Arc<dyn PersonaSource>,
    /// Persona is fetched once per connection, on first use.
    pub persona: Arc<OnceCell<PersonaConfig>>,
    /// Connection-scoped conversation history; discarded on disconnect.
    pub history: Arc<Mutex<Vec<HistoryTurn>>>,
    pub user_id: String,
    pub sample_rate_hz: u32,
    pub audio_encoding: String,
}

impl TurnContext {
    async fn persona(&self) -> PersonaConfig {
        self.persona
            .get_or_init(|| async { self.persona_source.fetch(&self.user_id).await })
            .await
            .clone()
    }

    fn synthesis_params(&self, persona: &PersonaConfig) -> SynthesisParams {
        SynthesisParams {
            voice_id: persona.voice_id.clone(),
            sample_rate_hz: self.sample_rate_hz,
            encoding: self.audio_encoding.clone(),
        }
    }
}

/// What a turn says: the session greeting, or an answer to user text.
pub(crate) enum TurnInput {
    Greeting,
    Query(String),
}

/// Entry point for a spawned turn task.
pub(crate) async fn run_turn(ctx: TurnContext, input: TurnInput, cancel: CancellationToken) {
    if let Err(e) = drive_turn(&ctx, input, &cancel).await {
        if cancel.is_cancelled() {
            // An abandoned turn surfaces nothing.
            return;
        }
        error!(error = ?e, "Turn failed");
        ctx.shared
            .emit(ServerEvent::Error {
                message: "Something went wrong handling that request.".to_string(),
                code: None,
            })
            .await;
        ctx.shared.transition(AgentState::Idle).await;
    }
}

async fn drive_turn(
    ctx: &TurnContext,
    input: TurnInput,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let persona = ctx.persona().await;

    let reply = match &input {
        TurnInput::Greeting => persona.greeting.clone(),
        TurnInput::Query(text) => {
            ctx.history.lock().await.push(HistoryTurn {
                role: Role::User,
                text: text.clone(),
            });
            let reply = answer(ctx, text, &persona, cancel).await?;
            ctx.history.lock().await.push(HistoryTurn {
                role: Role::Assistant,
                text: reply.clone(),
            });
            reply
        }
    };
    if cancel.is_cancelled() {
        return Ok(());
    }

    // The final text always precedes the `speaking` transition.
    ctx.shared
        .emit(ServerEvent::AgentTextFinal { text: reply.clone() })
        .await;
    ctx.shared.transition(AgentState::Speaking).await;

    let spoken = speech::strip_markdown_for_speech(&reply);
    match ctx
        .speaker
        .speak(&spoken, &ctx.synthesis_params(&persona))
        .await
    {
        Ok(chunks) => {
            for chunk in chunks {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                ctx.shared.emit_audio(chunk).await;
            }
        }
        Err(e) => {
            error!(error = %e, "Speech synthesis failed on both providers");
            ctx.shared
                .emit(ServerEvent::Error {
                    message: "Speech synthesis is currently unavailable.".to_string(),
                    code: Some("tts_failed".to_string()),
                })
                .await;
        }
    }

    if cancel.is_cancelled() {
        return Ok(());
    }
    ctx.shared.transition(AgentState::Idle).await;
    Ok(())
}

/// Resolves user text to reply text: tool intents first, then retrieval.
async fn answer(
    ctx: &TurnContext,
    text: &str,
    persona: &PersonaConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    if let Some(action) = intent::route(text) {
        return Ok(match action {
            ToolAction::Static(reply) => reply,
            ToolAction::Retrieve(query) => retrieve(ctx, &query, cancel).await?.text,
            ToolAction::Listing(kind) => {
                ctx.shared.transition(AgentState::Executing).await;
                fetch_listing(ctx, kind).await
            }
        });
    }

    let response = retrieve(ctx, text, cancel).await?;
    // Replacing a grounding refusal with smalltalk is this caller's policy;
    // the retrieval pipeline itself never substitutes.
    if response.is_silence && intent::is_conversational(text) {
        return Ok(conversational_reply(persona));
    }
    Ok(response.text)
}

fn conversational_reply(persona: &PersonaConfig) -> String {
    format!(
        "I'm {}, your guide to this document library. Ask me a question about your documents, \
         or say \"help\" to hear what I can do.",
        persona.name
    )
}

/// Calls the retrieval backend, streaming token deltas to the client as
/// `agent_text_partial` events while the answer is still arriving.
async fn retrieve(
    ctx: &TurnContext,
    query: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<RagResponse> {
    let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
    let shared = ctx.shared.clone();
    let cancelled = cancel.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(token) = token_rx.recv().await {
            if cancelled.is_cancelled() {
                break;
            }
            shared
                .emit(ServerEvent::AgentTextPartial { text: token })
                .await;
        }
    });

    let history = ctx.history.lock().await.clone();
    let result = ctx.rag.query(query, &history, token_tx).await;
    let _ = forwarder.await;
    Ok(result?)
}

/// Fetches a listing/stats endpoint and formats a spoken summary,
/// substituting a fixed message on any fetch failure.
async fn fetch_listing(ctx: &TurnContext, kind: ListingKind) -> String {
    match kind {
        ListingKind::Documents => match ctx.rag.list_documents().await {
            Ok(docs) if docs.is_empty() => NO_DOCUMENTS.to_string(),
            Ok(docs) => {
                let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
                format!(
                    "You have {} document{} in your library: {}.",
                    docs.len(),
                    if docs.len() == 1 { "" } else { "s" },
                    names.join(", ")
                )
            }
            Err(e) => {
                warn!(error = %e, "Document listing fetch failed");
                LISTING_UNAVAILABLE.to_string()
            }
        },
        ListingKind::Gaps => match ctx.rag.list_gaps().await {
            Ok(gaps) if gaps.is_empty() => NO_GAPS.to_string(),
            Ok(gaps) => format!(
                "I found {} coverage gap{}: {}.",
                gaps.len(),
                if gaps.len() == 1 { "" } else { "s" },
                gaps.join("; ")
            ),
            Err(e) => {
                warn!(error = %e, "Gap listing fetch failed");
                LISTING_UNAVAILABLE.to_string()
            }
        },
        ListingKind::Stats => match ctx.rag.corpus_stats().await {
            Ok(stats) => format!(
                "Your library holds {} documents indexed into {} searchable passages.",
                stats.document_count, stats.chunk_count
            ),
            Err(e) => {
                warn!(error = %e, "Corpus stats fetch failed");
                LISTING_UNAVAILABLE.to_string()
            }
        },
    }
}
