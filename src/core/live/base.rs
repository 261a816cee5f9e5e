//! Base trait and types for live-conversation providers.
//!
//! A live session is one persistent duplex connection to a generative-AI
//! backend that streams audio in both directions and can request structured
//! tool calls mid-conversation.
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit signed little-endian at 16kHz; output audio is
//! PCM 16-bit signed little-endian at 24kHz.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during live-session operations.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Session setup did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The session is not open
    #[error("Session not open")]
    NotOpen,

    /// The session was already opened once
    #[error("Session already opened")]
    AlreadyOpen,
}

/// Result type for live-session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// A declared tool the model may call during the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    pub description: String,
    /// JSON schema for the function parameters
    pub parameters: serde_json::Value,
}

/// Configuration for a live session.
#[derive(Debug, Clone, Default)]
pub struct LiveConfig {
    /// API key for authentication
    pub api_key: String,

    /// Model id
    pub model: String,

    /// Voice name for audio output
    pub voice: Option<String>,

    /// System instructions for the assistant
    pub instructions: Option<String>,

    /// Tools the model may call
    pub tools: Vec<ToolDeclaration>,

    /// How long `open` may wait for session setup before failing
    pub open_timeout_ms: u64,
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of a live session.
///
/// The session moves strictly forward: `Unopened -> Opening -> Open ->
/// Closed`. A session that failed to open goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Never opened
    #[default]
    Unopened,
    /// Connection established, waiting for setup to complete
    Opening,
    /// Ready for audio and tool traffic
    Open,
    /// Torn down (intentionally or not)
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unopened => write!(f, "Unopened"),
            SessionState::Opening => write!(f, "Opening"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Audio produced by the model.
#[derive(Debug, Clone)]
pub struct LiveAudioFrame {
    /// Raw audio bytes (PCM 16-bit, mono, little-endian)
    pub data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// A function call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Provider-assigned call id used to correlate the result
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result of an executed function call, returned to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    /// Call id this result answers
    pub id: String,
    /// Function name
    pub name: String,
    /// Structured result payload
    pub response: serde_json::Value,
}

/// Callback type for model audio output.
pub type LiveAudioCallback =
    Arc<dyn Fn(LiveAudioFrame) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for model text output.
pub type LiveTextCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for tool-call batches.
pub type ToolCallCallback =
    Arc<dyn Fn(Vec<FunctionCall>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for turn completion.
pub type TurnCompleteCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for error events.
pub type LiveErrorCallback =
    Arc<dyn Fn(LiveError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for the model being interrupted by user speech.
pub type InterruptedCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for unexpected session closure.
pub type ClosedCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for live-conversation providers.
///
/// Callbacks must be registered before `open` so no early event is lost.
/// `open` is single-shot: a second call is an error, and a failed open is
/// fatal to the session (retrying means starting a fresh call).
#[async_trait]
pub trait BaseLive: Send + Sync {
    /// Create a new live session instance.
    fn new(config: LiveConfig) -> LiveResult<Self>
    where
        Self: Sized;

    /// Open the session: connect, send setup, and wait (bounded by the
    /// configured timeout) until the backend acknowledges.
    async fn open(&mut self) -> LiveResult<()>;

    /// Close the session and release resources. Idempotent; subsequent
    /// sends become errors that callers may ignore.
    async fn close(&mut self);

    /// Whether the session is open for traffic.
    fn is_open(&self) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    // -------------------------------------------------------------------------
    // Sending
    // -------------------------------------------------------------------------

    /// Forward one audio frame (PCM 16-bit, 16kHz, mono, little-endian).
    ///
    /// Frames are delivered to the backend in send order.
    async fn send_audio(&self, audio: Bytes) -> LiveResult<()>;

    /// Send a user text turn into the conversation.
    async fn send_text(&self, text: &str) -> LiveResult<()>;

    /// Return results for a batch of tool calls.
    ///
    /// Each observed call id must be answered exactly once; results for
    /// unknown or already-answered ids are logged and skipped.
    async fn send_tool_results(&self, responses: Vec<FunctionResponse>) -> LiveResult<()>;

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    /// Register a callback for model audio output.
    fn on_audio(&mut self, callback: LiveAudioCallback);

    /// Register a callback for model text output.
    fn on_text(&mut self, callback: LiveTextCallback);

    /// Register a callback for tool-call batches.
    fn on_tool_call(&mut self, callback: ToolCallCallback);

    /// Register a callback for turn completion.
    fn on_turn_complete(&mut self, callback: TurnCompleteCallback);

    /// Register a callback for the model being interrupted by user speech.
    fn on_interrupted(&mut self, callback: InterruptedCallback);

    /// Register a callback for error events.
    fn on_error(&mut self, callback: LiveErrorCallback);

    /// Register a callback invoked when the connection closes without
    /// `close` having been called.
    fn on_closed(&mut self, callback: ClosedCallback);
}

/// Boxed trait object for live sessions.
pub type BoxedLive = Box<dyn BaseLive>;

/// Factory closure producing a live session from configuration.
///
/// The orchestrator receives one of these at construction so tests can
/// substitute a scripted implementation.
pub type LiveFactory = Arc<dyn Fn(LiveConfig) -> LiveResult<BoxedLive> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Unopened.to_string(), "Unopened");
        assert_eq!(SessionState::Opening.to_string(), "Opening");
        assert_eq!(SessionState::Open.to_string(), "Open");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_error_display() {
        let err = LiveError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));
        assert_eq!(LiveError::NotOpen.to_string(), "Session not open");
        assert_eq!(LiveError::AlreadyOpen.to_string(), "Session already opened");
    }

    #[test]
    fn test_function_call_args_default() {
        let call: FunctionCall = serde_json::from_str(
            r#"{"id": "call-1", "name": "lookup_event_content"}"#,
        )
        .unwrap();
        assert_eq!(call.id, "call-1");
        assert!(call.args.is_null());
    }

    #[test]
    fn test_default_config() {
        let config = LiveConfig::default();
        assert!(config.api_key.is_empty());
        assert!(config.voice.is_none());
        assert!(config.tools.is_empty());
    }
}
