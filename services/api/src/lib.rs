//! Docent API Library Crate
//!
//! This library contains all the core logic for the docent voice agent
//! service: configuration, the session bootstrap surface, the WebSocket
//! session protocol, and the upstream provider clients. The `api` binary
//! is a thin wrapper around this library.

pub mod audio;
pub mod config;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
