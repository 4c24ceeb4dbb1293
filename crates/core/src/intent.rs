//! Tool-intent routing for user utterances.
//!
//! A fixed, ordered table of intent patterns is matched against the trimmed
//! user text before any retrieval call is made. Declaration order is the
//! tie-break: the first matching pattern wins, so the more specific "list
//! gaps" entry must stay ahead of the generic document listing.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Fixed reply for an audit-log export request. The export itself runs out
/// of band; the agent only acknowledges it.
pub const AUDIT_EXPORT_REPLY: &str =
    "I've started an export of the audit log. You'll find it in the exports area of your \
     dashboard in a minute or two.";

/// Fixed reply describing what the agent can do.
pub const HELP_REPLY: &str =
    "I can answer questions about your documents, list what's in your library, point out \
     coverage gaps, summarize a document, or export the audit log. Just ask.";

/// Which backend endpoint a listing intent reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    /// Coverage gaps in the indexed corpus.
    Gaps,
    /// Documents currently in the corpus.
    Documents,
    /// Aggregate corpus statistics.
    Stats,
}

/// The action a matched tool intent resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    /// Answer directly from static text; no backend call.
    Static(String),
    /// Re-enter retrieval with a synthesised query.
    Retrieve(String),
    /// Fetch a listing/stats endpoint and format a summary.
    Listing(ListingKind),
}

type Build = fn(&Captures) -> ToolAction;

static PATTERNS: Lazy<Vec<(Regex, Build)>> = Lazy::new(|| {
    vec![
        // "list gaps" before "list documents": an utterance like "list the
        // gaps in my documents" matches both.
        (
            Regex::new(r"(?i)\b(?:list|show|what are)\b.*\bgaps?\b").unwrap(),
            (|_| ToolAction::Listing(ListingKind::Gaps)) as Build,
        ),
        (
            Regex::new(r"(?i)\b(?:list|show)\b.*\b(?:documents?|docs?|files?|library)\b").unwrap(),
            |_| ToolAction::Listing(ListingKind::Documents),
        ),
        (
            Regex::new(r"(?i)\bhow many\b.*\b(?:documents?|docs?|files?)\b").unwrap(),
            |_| ToolAction::Listing(ListingKind::Stats),
        ),
        (
            Regex::new(r"(?i)^summar(?:ize|ise)\s+(?:the\s+)?(?:document\s+)?(.+)$").unwrap(),
            |caps| ToolAction::Retrieve(format!("Summarize document: {}", caps[1].trim())),
        ),
        (
            Regex::new(r"(?i)\bexport\b.*\baudit\s+log\b").unwrap(),
            |_| ToolAction::Static(AUDIT_EXPORT_REPLY.to_string()),
        ),
        (
            Regex::new(r"(?i)^(?:help|what can you do)\b").unwrap(),
            |_| ToolAction::Static(HELP_REPLY.to_string()),
        ),
    ]
});

/// Matches the trimmed user text against the intent table.
///
/// Returns `None` when no tool intent applies and the text should go to
/// retrieval as-is.
pub fn route(text: &str) -> Option<ToolAction> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    PATTERNS
        .iter()
        .find_map(|(pattern, build)| pattern.captures(trimmed).map(|caps| build(&caps)))
}

static CONVERSATIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:hi|hello|hey|good\s+(?:morning|afternoon|evening)|how are you|who are you|what(?:'|’)?s up|thanks?|thank you|bye|goodbye)\b",
    )
    .unwrap()
});

/// Whether the utterance reads as smalltalk rather than a document query.
///
/// Used by the turn pipeline to decide if a grounding refusal should be
/// replaced with the persona's conversational reply. The pipeline itself
/// never applies that substitution.
pub fn is_conversational(text: &str) -> bool {
    CONVERSATIONAL.is_match(text)
}
