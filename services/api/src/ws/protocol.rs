//! Defines the WebSocket message protocol between the client and the session core.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Lifecycle states of one agent session. Exactly one is current at any
/// time; every transition is announced with a `state` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Connecting,
    Listening,
    Processing,
    Speaking,
    Executing,
    Idle,
    Error,
}

/// Messages sent from the client to the server as text frames.
/// Binary frames carry raw audio and are not control messages.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin audio capture.
    Start,
    /// End audio capture.
    Stop,
    /// Cancel the in-flight response.
    BargeIn,
    /// A typed query.
    Text { text: String },
    /// Reserved for tool callbacks; currently ignored.
    ToolResult {
        name: String,
        result: serde_json::Value,
    },
}

/// Events sent from the server to the client as text frames.
/// Binary frames carry synthesized audio chunks.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    State {
        state: AgentState,
    },
    AsrPartial {
        text: String,
    },
    AsrFinal {
        text: String,
    },
    AgentTextPartial {
        text: String,
    },
    AgentTextFinal {
        text: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// A frame queued for the client: a JSON event or a binary audio chunk.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(ServerEvent),
    Audio(Bytes),
}

/// Outcome of parsing one inbound text frame.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    /// A well-formed message with an unrecognised tag; ignored silently.
    Ignored,
    /// Malformed JSON or invalid fields; answered with an error event.
    Invalid,
}

const KNOWN_TAGS: [&str; 5] = ["start", "stop", "barge_in", "text", "tool_result"];

/// Parses an inbound text frame, distinguishing unknown-but-well-formed
/// tags (ignored) from malformed input (error event).
pub fn parse_inbound(raw: &str) -> Inbound {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Inbound::Invalid,
    };
    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(message) => Inbound::Message(message),
        Err(_) => match value.get("type").and_then(|tag| tag.as_str()) {
            Some(tag) if !KNOWN_TAGS.contains(&tag) => Inbound::Ignored,
            _ => Inbound::Invalid,
        },
    }
}
