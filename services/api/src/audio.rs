//! Byte-level audio helpers.
//!
//! The session core never resamples or re-encodes: providers define their
//! own formats and the core only frames and forwards byte buffers. These
//! helpers move audio between raw bytes, the base64 payloads provider APIs
//! use, and the wire-sized chunks sent to the client.

use base64::Engine;
use bytes::Bytes;

/// Maximum size of one binary audio frame sent to the client.
pub const AUDIO_CHUNK_BYTES: usize = 16 * 1024;

/// Splits synthesized audio into wire-sized chunks, preserving byte order.
pub fn frame_chunks(audio: &[u8]) -> Vec<Bytes> {
    audio
        .chunks(AUDIO_CHUNK_BYTES)
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Decodes a base64 audio payload into raw bytes. Invalid input yields an
/// empty buffer rather than an error; callers treat that as missing audio.
pub fn decode_base64_audio(fragment: &str) -> Vec<u8> {
    match base64::engine::general_purpose::STANDARD.decode(fragment) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::error!("Failed to decode base64 audio payload");
            Vec::new()
        }
    }
}

/// Encodes raw audio bytes as base64 for provider payloads.
pub fn encode_base64_audio(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
