//! Gemini Live API provider.
//!
//! Implements the `BaseLive` trait over the BidiGenerateContent WebSocket
//! protocol.

mod client;
mod config;
mod messages;

pub use client::GeminiLive;
pub use config::{DEFAULT_MODEL, GEMINI_LIVE_URL, GeminiVoice};
pub use messages::{ClientMessage, ServerMessage};
