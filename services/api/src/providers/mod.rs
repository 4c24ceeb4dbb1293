//! Clients for the opaque upstream providers.
//!
//! Each provider is reached over HTTP or WebSocket and hidden behind a
//! trait so the session logic can be exercised against mocks:
//!
//! - `stt`: streaming speech-to-text over the provider's WebSocket API.
//! - `tts`: speech synthesis with primary/fallback failover.
//! - `rag`: the retrieval backend (grounded answers, listings, stats).
//! - `persona`: the session/persona config endpoint.

pub mod persona;
pub mod rag;
pub mod stt;
pub mod tts;
