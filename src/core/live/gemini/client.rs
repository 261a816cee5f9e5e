//! Gemini Live API client implementation.
//!
//! This module provides the Gemini Live client that implements the `BaseLive`
//! trait over the BidiGenerateContent WebSocket protocol.
//!
//! # Protocol
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Audio in: PCM 16-bit, 16kHz, mono, base64 in `realtimeInput` chunks
//! - Audio out: PCM 16-bit, 24kHz, mono, base64 in `serverContent` parts
//!
//! A failed or lost connection is fatal to the session: there is no mid-call
//! reconnection, because the conversation state held by the backend cannot be
//! restored for a caller already on the line.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::config::{build_ws_url, qualified_model, GeminiVoice};
use super::messages::{
    ClientMessage, Content, GenerationConfig, Part, PrebuiltVoiceConfig, ServerMessage, Setup,
    SpeechConfig, ToolList, ToolResponsePayload, VoiceConfig,
};
use crate::core::live::base::{
    BaseLive, ClosedCallback, FunctionCall, FunctionResponse, InterruptedCallback,
    LiveAudioCallback, LiveAudioFrame, LiveConfig, LiveError, LiveErrorCallback, LiveResult,
    LiveTextCallback, SessionState, ToolCallCallback, TurnCompleteCallback,
};

/// Channel capacity for outgoing WebSocket messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Sample rate of audio sent to the model.
const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio produced by the model.
const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Registered callbacks, shared with the connection task.
#[derive(Default)]
struct Callbacks {
    audio: Mutex<Option<LiveAudioCallback>>,
    text: Mutex<Option<LiveTextCallback>>,
    tool_call: Mutex<Option<ToolCallCallback>>,
    turn_complete: Mutex<Option<TurnCompleteCallback>>,
    interrupted: Mutex<Option<InterruptedCallback>>,
    error: Mutex<Option<LiveErrorCallback>>,
    closed: Mutex<Option<ClosedCallback>>,
}

/// Gemini Live API client.
///
/// All mutable state is behind `Arc` so it can be shared with the spawned
/// connection task; the `ready` flag gives lock-free state checks on the
/// audio hot path.
pub struct GeminiLive {
    config: LiveConfig,
    voice: GeminiVoice,
    state: Arc<RwLock<SessionState>>,
    /// Fast-path flag: true exactly while state is Open
    ready: Arc<AtomicBool>,
    /// Signalled once the backend acknowledges setup
    setup_complete: Arc<Notify>,
    /// Suppresses the closed callback during an intentional close
    intentional_close: Arc<AtomicBool>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    callbacks: Arc<Callbacks>,
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Call ids observed in tool-call batches and not yet answered
    pending_tool_calls: Arc<RwLock<HashSet<String>>>,
}

impl GeminiLive {
    /// Build the session setup message from the configuration.
    fn build_setup(&self) -> Setup {
        Setup {
            model: qualified_model(&self.config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.as_str().to_string(),
                        },
                    },
                }),
            },
            system_instruction: self.config.instructions.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::text(text.clone())],
            }),
            tools: if self.config.tools.is_empty() {
                Vec::new()
            } else {
                vec![ToolList {
                    function_declarations: self.config.tools.clone(),
                }]
            },
        }
    }

    /// Dispatch one server message to the registered callbacks.
    async fn handle_server_message(
        msg: ServerMessage,
        callbacks: &Arc<Callbacks>,
        state: &Arc<RwLock<SessionState>>,
        ready: &Arc<AtomicBool>,
        setup_complete: &Arc<Notify>,
        pending_tool_calls: &Arc<RwLock<HashSet<String>>>,
    ) {
        if msg.setup_complete.is_some() {
            tracing::info!("Gemini Live setup complete");
            *state.write() = SessionState::Open;
            ready.store(true, Ordering::SeqCst);
            setup_complete.notify_waiters();
        }

        if let Some(content) = msg.server_content {
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(text) = part.text
                        && let Some(cb) = callbacks.text.lock().await.as_ref()
                    {
                        cb(text).await;
                    }

                    if let Some(blob) = part.inline_data {
                        if !blob.mime_type.starts_with("audio/") {
                            tracing::debug!("Ignoring non-audio inline data: {}", blob.mime_type);
                            continue;
                        }
                        match BASE64_STANDARD.decode(&blob.data) {
                            Ok(audio_bytes) => {
                                if let Some(cb) = callbacks.audio.lock().await.as_ref() {
                                    cb(LiveAudioFrame {
                                        data: Bytes::from(audio_bytes),
                                        sample_rate: OUTPUT_SAMPLE_RATE,
                                    })
                                    .await;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to decode audio part: {}", e);
                            }
                        }
                    }
                }
            }

            if content.interrupted == Some(true) {
                tracing::debug!("Model response interrupted by user speech");
                if let Some(cb) = callbacks.interrupted.lock().await.as_ref() {
                    cb().await;
                }
            }

            if content.turn_complete == Some(true)
                && let Some(cb) = callbacks.turn_complete.lock().await.as_ref()
            {
                cb().await;
            }
        }

        if let Some(tool_call) = msg.tool_call {
            let calls: Vec<FunctionCall> = tool_call
                .function_calls
                .into_iter()
                .map(|c| FunctionCall {
                    id: c.id,
                    name: c.name,
                    args: c.args,
                })
                .collect();

            if !calls.is_empty() {
                {
                    let mut pending = pending_tool_calls.write();
                    for call in &calls {
                        pending.insert(call.id.clone());
                    }
                }
                if let Some(cb) = callbacks.tool_call.lock().await.as_ref() {
                    cb(calls).await;
                }
            }
        }

        if let Some(cancellation) = msg.tool_call_cancellation {
            let mut pending = pending_tool_calls.write();
            for id in &cancellation.ids {
                if !pending.remove(id) {
                    tracing::warn!("Cancellation for unknown tool call id: {}", id);
                }
            }
        }

        if let Some(usage) = msg.usage_metadata {
            tracing::trace!("Usage metadata: {}", usage);
        }

        if msg.go_away.is_some() {
            tracing::warn!("Gemini Live server announced imminent disconnect");
        }
    }

    /// Send an event through the writer channel.
    async fn send_message(&self, message: ClientMessage) -> LiveResult<()> {
        if let Some(sender) = self.ws_sender.lock().await.as_ref() {
            sender
                .send(message)
                .await
                .map_err(|e| LiveError::WebSocketError(e.to_string()))?;
            Ok(())
        } else {
            Err(LiveError::NotOpen)
        }
    }
}

#[async_trait]
impl BaseLive for GeminiLive {
    fn new(config: LiveConfig) -> LiveResult<Self> {
        if config.api_key.is_empty() {
            return Err(LiveError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if config.model.is_empty() {
            return Err(LiveError::InvalidConfiguration(
                "model is required".to_string(),
            ));
        }

        let voice = config
            .voice
            .as_deref()
            .map(GeminiVoice::from_str_or_default)
            .unwrap_or_default();

        Ok(Self {
            config,
            voice,
            state: Arc::new(RwLock::new(SessionState::Unopened)),
            ready: Arc::new(AtomicBool::new(false)),
            setup_complete: Arc::new(Notify::new()),
            intentional_close: Arc::new(AtomicBool::new(false)),
            ws_sender: Arc::new(Mutex::new(None)),
            callbacks: Arc::new(Callbacks::default()),
            connection_handle: Arc::new(Mutex::new(None)),
            pending_tool_calls: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    async fn open(&mut self) -> LiveResult<()> {
        if *self.state.read() != SessionState::Unopened {
            return Err(LiveError::AlreadyOpen);
        }
        *self.state.write() = SessionState::Opening;

        let url = build_ws_url(&self.config.api_key);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(|e| {
            tracing::error!("Gemini Live connection failed: {}", e);
            LiveError::ConnectionFailed(e.to_string())
        })?;

        tracing::info!(model = %self.config.model, "Connected to Gemini Live API");

        let (mut ws_sink, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let callbacks = self.callbacks.clone();
        let state = self.state.clone();
        let ready = self.ready.clone();
        let setup_complete = self.setup_complete.clone();
        let intentional_close = self.intentional_close.clone();
        let pending_tool_calls = self.pending_tool_calls.clone();
        let ws_sender = self.ws_sender.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Outgoing messages, serialized through one writer so
                    // send order is preserved
                    outgoing = rx.recv() => {
                        let Some(event) = outgoing else { break };
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize client message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }

                    // Incoming messages
                    incoming = ws_read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        Self::handle_server_message(
                                            msg,
                                            &callbacks,
                                            &state,
                                            &ready,
                                            &setup_complete,
                                            &pending_tool_calls,
                                        ).await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse server message: {}", e);
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                // The Live API may frame JSON as binary
                                match serde_json::from_slice::<ServerMessage>(&data) {
                                    Ok(msg) => {
                                        Self::handle_server_message(
                                            msg,
                                            &callbacks,
                                            &state,
                                            &ready,
                                            &setup_complete,
                                            &pending_tool_calls,
                                        ).await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse binary server message: {}", e);
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!("Gemini Live closed the connection: {:?}", frame);
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("Gemini Live WebSocket error: {}", e);
                                if let Some(cb) = callbacks.error.lock().await.as_ref() {
                                    cb(LiveError::WebSocketError(e.to_string())).await;
                                }
                                break;
                            }
                            Some(Ok(_)) => {}
                            None => break,
                        }
                    }
                }
            }

            // Connection ended
            ready.store(false, Ordering::SeqCst);
            *state.write() = SessionState::Closed;
            *ws_sender.lock().await = None;

            if !intentional_close.load(Ordering::SeqCst) {
                tracing::warn!("Gemini Live connection ended unexpectedly");
                if let Some(cb) = callbacks.closed.lock().await.as_ref() {
                    cb().await;
                }
            }
            tracing::info!("Gemini Live connection task ended");
        });

        *self.connection_handle.lock().await = Some(handle);

        // Send setup and wait (bounded) for the acknowledgement. A timeout
        // here is fatal: the caller must treat the session as dead.
        let setup = self.build_setup();
        let notified = self.setup_complete.notified();
        self.send_message(ClientMessage::Setup(setup)).await?;

        let timeout = Duration::from_millis(self.config.open_timeout_ms.max(1));
        let timed_out = tokio::time::timeout(timeout, notified).await.is_err();
        if timed_out {
            self.close().await;
            return Err(LiveError::Timeout(format!(
                "setup not acknowledged within {}ms",
                self.config.open_timeout_ms
            )));
        }

        Ok(())
    }

    async fn close(&mut self) {
        self.intentional_close.store(true, Ordering::SeqCst);

        *self.ws_sender.lock().await = None;
        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }

        self.ready.store(false, Ordering::SeqCst);
        *self.state.write() = SessionState::Closed;

        tracing::info!("Gemini Live session closed");
    }

    fn is_open(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    async fn send_audio(&self, audio: Bytes) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotOpen);
        }
        self.send_message(ClientMessage::audio_chunk(&audio, INPUT_SAMPLE_RATE))
            .await
    }

    async fn send_text(&self, text: &str) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotOpen);
        }
        self.send_message(ClientMessage::user_text(text)).await
    }

    async fn send_tool_results(&self, responses: Vec<FunctionResponse>) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotOpen);
        }

        // Results for ids never observed (or already answered) are a
        // protocol violation: logged and skipped, never fatal.
        let mut accepted = Vec::with_capacity(responses.len());
        {
            let mut pending = self.pending_tool_calls.write();
            for response in responses {
                if pending.remove(&response.id) {
                    accepted.push(response);
                } else {
                    tracing::warn!(
                        call_id = %response.id,
                        "Dropping tool result for unknown or already-answered call id"
                    );
                }
            }
        }

        if accepted.is_empty() {
            return Ok(());
        }

        self.send_message(ClientMessage::ToolResponse(ToolResponsePayload {
            function_responses: accepted,
        }))
        .await
    }

    fn on_audio(&mut self, callback: LiveAudioCallback) {
        if let Ok(mut guard) = self.callbacks.audio.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.audio.lock().await = Some(callback);
            });
        }
    }

    fn on_text(&mut self, callback: LiveTextCallback) {
        if let Ok(mut guard) = self.callbacks.text.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.text.lock().await = Some(callback);
            });
        }
    }

    fn on_tool_call(&mut self, callback: ToolCallCallback) {
        if let Ok(mut guard) = self.callbacks.tool_call.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.tool_call.lock().await = Some(callback);
            });
        }
    }

    fn on_turn_complete(&mut self, callback: TurnCompleteCallback) {
        if let Ok(mut guard) = self.callbacks.turn_complete.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.turn_complete.lock().await = Some(callback);
            });
        }
    }

    fn on_interrupted(&mut self, callback: InterruptedCallback) {
        if let Ok(mut guard) = self.callbacks.interrupted.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.interrupted.lock().await = Some(callback);
            });
        }
    }

    fn on_error(&mut self, callback: LiveErrorCallback) {
        if let Ok(mut guard) = self.callbacks.error.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.error.lock().await = Some(callback);
            });
        }
    }

    fn on_closed(&mut self, callback: ClosedCallback) {
        if let Ok(mut guard) = self.callbacks.closed.try_lock() {
            *guard = Some(callback);
        } else {
            let cbs = self.callbacks.clone();
            tokio::spawn(async move {
                *cbs.closed.lock().await = Some(callback);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LiveConfig {
        LiveConfig {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            voice: Some("Kore".to_string()),
            instructions: Some("Be brief.".to_string()),
            tools: Vec::new(),
            open_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_creation() {
        let live = GeminiLive::new(test_config()).unwrap();
        assert!(!live.is_open());
        assert_eq!(live.state(), SessionState::Unopened);
        assert_eq!(live.voice, GeminiVoice::Kore);
    }

    #[test]
    fn test_api_key_required() {
        let config = LiveConfig {
            api_key: String::new(),
            model: "gemini-test".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiLive::new(config),
            Err(LiveError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_model_required() {
        let config = LiveConfig {
            api_key: "k".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiLive::new(config),
            Err(LiveError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_send_audio_requires_open() {
        let live = GeminiLive::new(test_config()).unwrap();
        let result = live.send_audio(Bytes::from(vec![0u8; 320])).await;
        assert!(matches!(result, Err(LiveError::NotOpen)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut live = GeminiLive::new(test_config()).unwrap();
        live.close().await;
        live.close().await;
        assert_eq!(live.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_open_after_close_rejected() {
        let mut live = GeminiLive::new(test_config()).unwrap();
        live.close().await;
        assert!(matches!(live.open().await, Err(LiveError::AlreadyOpen)));
    }

    #[test]
    fn test_build_setup_shape() {
        let live = GeminiLive::new(test_config()).unwrap();
        let setup = live.build_setup();
        assert_eq!(setup.model, "models/gemini-test");
        assert_eq!(setup.generation_config.response_modalities, vec!["AUDIO"]);
        assert!(setup.tools.is_empty());
        assert_eq!(
            setup
                .system_instruction
                .as_ref()
                .unwrap()
                .parts[0]
                .text
                .as_deref(),
            Some("Be brief.")
        );
    }

    #[tokio::test]
    async fn test_tool_call_tracking() {
        let live = GeminiLive::new(test_config()).unwrap();
        live.pending_tool_calls.write().insert("call-1".to_string());

        // Unknown ids are filtered out before sending; with no accepted
        // responses remaining the send is skipped entirely, so this does
        // not error even though the session is closed.
        live.ready.store(true, Ordering::SeqCst);
        let result = live
            .send_tool_results(vec![FunctionResponse {
                id: "call-unknown".to_string(),
                name: "x".to_string(),
                response: serde_json::json!({}),
            }])
            .await;
        assert!(result.is_ok());
        assert!(live.pending_tool_calls.read().contains("call-1"));
    }
}
