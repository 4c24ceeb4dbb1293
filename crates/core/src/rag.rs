//! Parser for the retrieval backend's event-stream responses.
//!
//! The backend answers a query with a body made of `event:`/`data:` line
//! pairs (`token`, `confidence`, `silence`, `citations`, `status`, `done`).
//! Only a handful of event kinds matter to the voice pipeline; the rest are
//! recognised and skipped so a backend upgrade cannot break the parser.

use serde::Deserialize;

/// Fixed refusal used when a `silence` event carries no message of its own.
pub const DEFAULT_REFUSAL: &str =
    "I couldn't find an answer to that in your documents.";

/// Parsed result of one retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RagResponse {
    /// The answer text, or the refusal message when the backend declined.
    pub text: String,
    /// Backend confidence; 0 when the backend declined to answer.
    pub confidence: Option<f32>,
    /// True when the backend signalled it cannot ground an answer.
    pub is_silence: bool,
    /// Follow-up questions the backend suggested alongside a refusal.
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SilencePayload {
    message: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Incremental `event:`/`data:` line-pair scanner.
///
/// Feed lines in arrival order with [`push_line`](Self::push_line); token
/// deltas are handed back so the caller can stream partial text onward.
/// [`finish`](Self::finish) yields the final response.
#[derive(Debug, Default)]
pub struct ResponseParser {
    pending_event: Option<String>,
    text: String,
    confidence: Option<f32>,
    is_silence: bool,
    suggestions: Vec<String>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one line of the stream. Returns the token delta when the
    /// line completed a `token` event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("event:") {
            self.pending_event = Some(name.trim().to_string());
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        let event = self.pending_event.take()?;
        match event.as_str() {
            "token" => {
                // Token data is a JSON string when quoted, raw text otherwise.
                let token = serde_json::from_str::<String>(data)
                    .unwrap_or_else(|_| data.to_string());
                self.text.push_str(&token);
                return Some(token);
            }
            "confidence" => {
                if let Ok(value) = data.parse::<f32>() {
                    self.confidence = Some(value);
                }
            }
            "silence" => {
                let payload: SilencePayload = serde_json::from_str(data).unwrap_or_default();
                self.is_silence = true;
                self.confidence = Some(0.0);
                self.text = payload
                    .message
                    .unwrap_or_else(|| DEFAULT_REFUSAL.to_string());
                self.suggestions = payload.suggestions;
            }
            "citations" | "status" | "done" => {}
            other => {
                tracing::debug!(event = other, "ignoring unknown retrieval event");
            }
        }
        None
    }

    pub fn finish(self) -> RagResponse {
        RagResponse {
            text: self.text,
            confidence: self.confidence,
            is_silence: self.is_silence,
            suggestions: self.suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> (RagResponse, Vec<String>) {
        let mut parser = ResponseParser::new();
        let mut deltas = Vec::new();
        for line in body.lines() {
            if let Some(delta) = parser.push_line(line) {
                deltas.push(delta);
            }
        }
        (parser.finish(), deltas)
    }

    #[test]
    fn tokens_accumulate_in_order() {
        let body = "event: token\ndata: \"The policy \"\n\nevent: token\ndata: \"covers water damage.\"\n\nevent: done\ndata: {}\n";
        let (response, deltas) = parse(body);
        assert_eq!(response.text, "The policy covers water damage.");
        assert!(!response.is_silence);
        assert_eq!(deltas, vec!["The policy ", "covers water damage."]);
    }

    #[test]
    fn unquoted_token_data_is_taken_verbatim() {
        let body = "event: token\ndata: plain text\n";
        let (response, _) = parse(body);
        assert_eq!(response.text, "plain text");
    }

    #[test]
    fn confidence_is_captured() {
        let body = "event: token\ndata: \"Answer.\"\n\nevent: confidence\ndata: 0.83\n\nevent: done\ndata: {}\n";
        let (response, _) = parse(body);
        assert_eq!(response.confidence, Some(0.83));
    }

    #[test]
    fn silence_replaces_text_and_zeroes_confidence() {
        let body = concat!(
            "event: token\ndata: \"partial draft\"\n\n",
            "event: confidence\ndata: 0.4\n\n",
            "event: silence\ndata: {\"message\": \"I can't answer that from your documents.\", \"suggestions\": [\"What is covered?\", \"How do I file a claim?\"]}\n"
        );
        let (response, _) = parse(body);
        assert!(response.is_silence);
        assert_eq!(response.text, "I can't answer that from your documents.");
        assert_eq!(response.confidence, Some(0.0));
        assert_eq!(
            response.suggestions,
            vec!["What is covered?", "How do I file a claim?"]
        );
    }

    #[test]
    fn silence_without_message_uses_the_default_refusal() {
        let body = "event: silence\ndata: {}\n";
        let (response, _) = parse(body);
        assert!(response.is_silence);
        assert_eq!(response.text, DEFAULT_REFUSAL);
        assert_eq!(response.confidence, Some(0.0));
        assert!(response.suggestions.is_empty());
    }

    #[test]
    fn citations_status_and_unknown_events_are_skipped() {
        let body = concat!(
            "event: status\ndata: searching\n\n",
            "event: token\ndata: \"Answer\"\n\n",
            "event: citations\ndata: [{\"doc\": \"a.pdf\", \"page\": 3}]\n\n",
            "event: shiny_new_thing\ndata: {}\n\n",
            "event: done\ndata: {}\n"
        );
        let (response, _) = parse(body);
        assert_eq!(response.text, "Answer");
    }

    #[test]
    fn data_without_a_preceding_event_is_ignored() {
        let body = "data: orphan\nevent: token\ndata: \"kept\"\n";
        let (response, _) = parse(body);
        assert_eq!(response.text, "kept");
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut parser = ResponseParser::new();
        parser.push_line("event: token\r");
        let delta = parser.push_line("data: \"hi\"\r");
        assert_eq!(delta.as_deref(), Some("hi"));
        assert_eq!(parser.finish().text, "hi");
    }

    #[test]
    fn empty_stream_yields_empty_response() {
        let (response, deltas) = parse("");
        assert_eq!(response.text, "");
        assert_eq!(response.confidence, None);
        assert!(!response.is_silence);
        assert!(deltas.is_empty());
    }
}
