//! Live-conversation session management.
//!
//! `base` defines the provider-agnostic trait and types; `gemini` implements
//! them over the Gemini Live WebSocket API.

pub mod base;
pub mod gemini;

pub use base::{
    BaseLive, ClosedCallback, FunctionCall, FunctionResponse, InterruptedCallback,
    LiveAudioCallback, LiveAudioFrame, LiveConfig, LiveError, LiveErrorCallback, LiveResult,
    LiveTextCallback, SessionState, ToolCallCallback, ToolDeclaration, TurnCompleteCallback,
};
pub use gemini::GeminiLive;
