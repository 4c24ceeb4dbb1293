//! Normalises assistant text for speech synthesis.
//!
//! Retrieval answers arrive as markdown. Read aloud verbatim they are full
//! of asterisks, citation brackets, and list markers, so the turn pipeline
//! strips formatting down to plain prose before handing text to the
//! synthesizer.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b_([^_\n]+)_\b").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[\d+\]").unwrap());
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.)\s+").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips markdown formatting so the text reads naturally aloud.
///
/// Removes emphasis markers, citation-number brackets, link syntax (keeping
/// the link text), headers, and list markers, and collapses runs of three or
/// more newlines to two.
pub fn strip_markdown_for_speech(text: &str) -> String {
    // Links before citations: `[text](url)` would otherwise leave `[text]`
    // behind for the citation pass to ignore.
    let text = LINK.replace_all(text, "$1");
    let text = CITATION.replace_all(&text, "");
    let text = HEADER.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
