//! Per-call session orchestration.
//!
//! One `SessionOrchestrator` exists per bridged call and owns everything the
//! call needs: the parsed session parameters, the live session, the tool
//! dispatcher, the transcript, and the bounded queue for audio produced
//! before the telephony stream id is known. It moves through
//! `Init -> Resolving -> Bridging -> Finalizing -> Done` and is driven
//! entirely from the session's own event loop, so its state needs no locks.

pub mod prompt;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::*;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::core::audio;
use crate::core::live::base::{
    BoxedLive, FunctionCall, LiveAudioFrame, LiveConfig, LiveError, LiveFactory,
};
use crate::core::tools::{self, ToolDefaults, ToolDispatcher};
use crate::errors::{SessionError, SessionResult};
use crate::store::{AttendeeIdentity, CallEndRecord, CallStartRecord, EventContext, EventStore};

pub use prompt::build_system_instruction;

/// Call direction, from the telephony provider's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

impl Direction {
    /// Parse the wire form; anything unrecognized is treated as inbound.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("outbound") {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

/// Parameters describing one call, parsed from the connection URL and merged
/// once with the start message's custom parameters. Immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SessionParams {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Direction,
    pub event_id: Option<String>,
    pub attendee_id: Option<String>,
}

impl SessionParams {
    /// Parse from key/value pairs. Accepts both the lowercase and the
    /// provider's capitalized spellings.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut params = SessionParams::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            match key {
                "callSid" | "CallSid" => params.call_sid = Some(value.to_string()),
                "from" | "From" => params.from = Some(value.to_string()),
                "to" | "To" => params.to = Some(value.to_string()),
                "direction" => params.direction = Direction::parse(value),
                "eventId" => params.event_id = Some(value.to_string()),
                "attendeeId" => params.attendee_id = Some(value.to_string()),
                _ => {}
            }
        }
        params
    }

    /// Fill any missing fields from the start message's custom parameters.
    fn merge_custom_parameters(&mut self, custom: &HashMap<String, String>) {
        let merged = SessionParams::from_pairs(
            custom.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        self.call_sid = self.call_sid.take().or(merged.call_sid);
        self.from = self.from.take().or(merged.from);
        self.to = self.to.take().or(merged.to);
        self.event_id = self.event_id.take().or(merged.event_id);
        self.attendee_id = self.attendee_id.take().or(merged.attendee_id);
        if custom.contains_key("direction") {
            self.direction = merged.direction;
        }
    }
}

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Init,
    Resolving,
    Bridging,
    Finalizing,
    Done,
}

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Assistant,
}

impl Speaker {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Speaker::Caller => "caller",
            Speaker::Assistant => "assistant",
        }
    }
}

/// One line of conversation.
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp_ms: u64,
}

/// Summarize a finished call from its transcript.
pub fn generate_summary(transcript: &[TranscriptLine]) -> String {
    if transcript.is_empty() {
        return "No conversation recorded".to_string();
    }
    let caller = transcript
        .iter()
        .filter(|l| l.speaker == Speaker::Caller)
        .count();
    let assistant = transcript
        .iter()
        .filter(|l| l.speaker == Speaker::Assistant)
        .count();
    format!(
        "Call completed with {caller} caller messages and {assistant} assistant responses. \
         Duration: ~{} exchanges.",
        transcript.len()
    )
}

/// Events from the live session, forwarded into the session loop so all
/// per-call state is mutated from one place.
#[derive(Debug)]
pub enum LiveEvent {
    Audio(LiveAudioFrame),
    Text(String),
    ToolCalls(Vec<FunctionCall>),
    TurnComplete,
    Interrupted,
    Error(LiveError),
    Closed,
}

/// What the session emits toward the telephony connection. The handler owns
/// the wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyOut {
    /// One outbound μ-law frame, base64 encoded, tagged with the stream SID
    Media {
        stream_sid: String,
        payload: String,
    },
    /// Ask the provider to drop its buffered outbound audio
    Clear { stream_sid: String },
    /// Close the telephony connection
    Close,
}

/// The session-facing slice of the server configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_voice: String,
    pub live_open_timeout_ms: u64,
    pub outbound_queue_capacity: usize,
}

impl BridgeConfig {
    pub fn from_server(config: &ServerConfig) -> Self {
        Self {
            gemini_api_key: config.gemini_api_key.clone(),
            gemini_model: config.gemini_model.clone(),
            gemini_voice: config.gemini_voice.clone(),
            live_open_timeout_ms: config.live_open_timeout_ms,
            outbound_queue_capacity: config.outbound_queue_capacity,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The per-call state machine bridging telephony and the live session.
pub struct SessionOrchestrator {
    session_id: String,
    params: SessionParams,
    config: BridgeConfig,
    store: Arc<dyn EventStore>,
    live_factory: LiveFactory,
    telephony_tx: mpsc::Sender<TelephonyOut>,
    live_tx: mpsc::Sender<LiveEvent>,

    phase: SessionPhase,
    stream_sid: Option<String>,
    live: Option<BoxedLive>,
    dispatcher: Option<ToolDispatcher>,
    event_context: Option<EventContext>,
    callee_identity: Option<AttendeeIdentity>,
    transcript: Vec<TranscriptLine>,
    /// Outbound frames produced before the stream SID was known
    pending_out: VecDeque<String>,
    call_record_id: Option<String>,
    /// Media frames dropped while no live session was ready
    dropped_frames: u64,
}

impl SessionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        params: SessionParams,
        config: BridgeConfig,
        store: Arc<dyn EventStore>,
        live_factory: LiveFactory,
        telephony_tx: mpsc::Sender<TelephonyOut>,
        live_tx: mpsc::Sender<LiveEvent>,
    ) -> Self {
        Self {
            session_id,
            params,
            config,
            store,
            live_factory,
            telephony_tx,
            live_tx,
            phase: SessionPhase::Init,
            stream_sid: None,
            live: None,
            dispatcher: None,
            event_context: None,
            callee_identity: None,
            transcript: Vec::new(),
            pending_out: VecDeque::new(),
            call_record_id: None,
            dropped_frames: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == SessionPhase::Done
    }

    /// Handle the telephony start event: resolve context and identity, then
    /// bridge to the live session.
    pub async fn handle_start(
        &mut self,
        stream_sid: String,
        call_sid: Option<String>,
        custom_parameters: HashMap<String, String>,
    ) -> SessionResult<()> {
        if self.phase != SessionPhase::Init {
            let err = SessionError::Protocol(format!(
                "start message in phase {:?}",
                self.phase
            ));
            tracing::warn!(session_id = %self.session_id, "{}, ignored", err);
            return Ok(());
        }

        // The stream SID is set exactly once, here.
        self.stream_sid = Some(stream_sid.clone());
        if self.params.call_sid.is_none() {
            self.params.call_sid = call_sid;
        }
        self.params.merge_custom_parameters(&custom_parameters);

        tracing::info!(
            session_id = %self.session_id,
            stream_sid = %stream_sid,
            call_sid = ?self.params.call_sid,
            direction = %self.params.direction.as_str(),
            "Telephony stream started"
        );

        // Audio queued before the stream SID was known can go out now.
        self.drain_pending_out().await;

        self.phase = SessionPhase::Resolving;
        self.resolve().await?;

        self.phase = SessionPhase::Bridging;
        if let Err(e) = self.bridge().await {
            tracing::error!(session_id = %self.session_id, "Bridging failed: {}", e);
            self.finalize("failed").await;
            let _ = self.telephony_tx.send(TelephonyOut::Close).await;
            return Err(e);
        }

        Ok(())
    }

    /// Look up event context and callee identity. Lookup failures degrade to
    /// a generic context, except a mandatory-identity outbound call, which
    /// aborts before any live connection is opened.
    async fn resolve(&mut self) -> SessionResult<()> {
        if let Some(event_id) = self.params.event_id.clone() {
            match self.store.resolve_context(&event_id).await {
                Ok(context) => {
                    tracing::info!(session_id = %self.session_id, event = %context.name, "Event context resolved");
                    self.event_context = Some(context);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        "Event lookup failed, continuing with generic context: {}",
                        e
                    );
                }
            }
        }

        let identity_phone = match self.params.direction {
            Direction::Inbound => self.params.from.clone(),
            Direction::Outbound => self.params.to.clone(),
        };
        if let Some(phone) = identity_phone {
            match self
                .store
                .resolve_identity(&phone, self.params.event_id.as_deref())
                .await
            {
                Ok(Some(identity)) => {
                    tracing::info!(session_id = %self.session_id, attendee = %identity.name, "Callee identity resolved");
                    self.callee_identity = Some(identity);
                }
                Ok(None) => {
                    tracing::info!(session_id = %self.session_id, "No attendee found for {phone}");
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, "Identity lookup failed: {}", e);
                }
            }
        }

        // An outbound confirmation call without a target identity has no
        // scripted objective; abort before opening the live session.
        if self.params.direction == Direction::Outbound
            && self.params.attendee_id.is_none()
            && self.callee_identity.is_none()
        {
            let err = SessionError::Setup(
                "outbound call requires a resolvable callee identity".to_string(),
            );
            tracing::error!(session_id = %self.session_id, "{}", err);
            let _ = self.telephony_tx.send(TelephonyOut::Close).await;
            self.phase = SessionPhase::Done;
            return Err(err);
        }

        Ok(())
    }

    /// Open the live session, wire its events into the session loop, and
    /// persist the call-start record.
    async fn bridge(&mut self) -> SessionResult<()> {
        let record_id = self
            .store
            .record_call_start(CallStartRecord {
                call_sid: self.params.call_sid.clone().unwrap_or_default(),
                event_id: self.params.event_id.clone(),
                attendee_id: self
                    .params
                    .attendee_id
                    .clone()
                    .or_else(|| self.callee_identity.as_ref().map(|a| a.id.clone())),
                direction: self.params.direction.as_str().to_string(),
            })
            .await
            .map_err(|e| SessionError::Setup(format!("call-start record failed: {e}")))?;
        self.call_record_id = Some(record_id);

        let instructions = build_system_instruction(
            self.params.direction,
            self.event_context.as_ref(),
            self.callee_identity.as_ref(),
        );

        self.dispatcher = Some(ToolDispatcher::new(
            self.store.clone(),
            ToolDefaults {
                attendee_id: self
                    .params
                    .attendee_id
                    .clone()
                    .or_else(|| self.callee_identity.as_ref().map(|a| a.id.clone())),
                event_id: self.params.event_id.clone(),
            },
        ));

        let live_config = LiveConfig {
            api_key: self.config.gemini_api_key.clone(),
            model: self.config.gemini_model.clone(),
            voice: Some(self.config.gemini_voice.clone()),
            instructions: Some(instructions),
            tools: tools::declarations(),
            open_timeout_ms: self.config.live_open_timeout_ms,
        };

        let mut live = (self.live_factory)(live_config)
            .map_err(|e| SessionError::Setup(format!("live session creation failed: {e}")))?;

        // Callbacks are registered before open so no early event is lost;
        // each one forwards into the session loop.
        let tx = self.live_tx.clone();
        live.on_audio(Arc::new(move |frame| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::Audio(frame)).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_text(Arc::new(move |text| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::Text(text)).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_tool_call(Arc::new(move |calls| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::ToolCalls(calls)).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_turn_complete(Arc::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::TurnComplete).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_interrupted(Arc::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::Interrupted).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_error(Arc::new(move |error| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::Error(error)).await;
            })
        }));

        let tx = self.live_tx.clone();
        live.on_closed(Arc::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LiveEvent::Closed).await;
            })
        }));

        live.open()
            .await
            .map_err(|e| SessionError::Setup(format!("live session open failed: {e}")))?;

        // On outbound calls the assistant speaks first; give the model an
        // explicit opening turn instead of relying on it to start unprompted.
        if self.params.direction == Direction::Outbound
            && let Err(e) = live
                .send_text("The call has connected. Begin the conversation.")
                .await
        {
            tracing::warn!(session_id = %self.session_id, "Opening turn failed: {}", e);
        }

        self.live = Some(live);
        tracing::info!(session_id = %self.session_id, "Live session bridged");
        Ok(())
    }

    /// Handle one inbound telephony media frame (base64 μ-law).
    pub async fn handle_media(&mut self, payload: &str) {
        if self.phase != SessionPhase::Bridging {
            // Audio before resolution completes is not guaranteed delivery.
            self.dropped_frames += 1;
            return;
        }
        let Some(live) = self.live.as_ref() else {
            self.dropped_frames += 1;
            return;
        };
        if !live.is_open() {
            self.dropped_frames += 1;
            return;
        }

        let mulaw = match BASE64_STANDARD.decode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = SessionError::Transcode(format!("undecodable media payload: {e}"));
                tracing::warn!(session_id = %self.session_id, "{}, frame dropped", err);
                return;
            }
        };

        let pcm = audio::telephony_to_live(&mulaw);
        if let Err(e) = live.send_audio(Bytes::from(pcm)).await {
            tracing::warn!(session_id = %self.session_id, "Failed to forward audio: {}", e);
        }
    }

    /// Handle the telephony stop event. Idempotent.
    pub async fn handle_stop(&mut self) {
        if self.phase == SessionPhase::Done || self.phase == SessionPhase::Finalizing {
            return;
        }
        tracing::info!(session_id = %self.session_id, "Telephony stream stopped");
        self.finalize("completed").await;
    }

    /// Handle one event from the live session.
    pub async fn handle_live_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Audio(frame) => self.handle_live_audio(frame).await,
            LiveEvent::Text(text) => {
                self.transcript.push(TranscriptLine {
                    speaker: Speaker::Assistant,
                    text,
                    timestamp_ms: now_ms(),
                });
            }
            LiveEvent::ToolCalls(calls) => self.handle_tool_calls(calls).await,
            LiveEvent::TurnComplete => {
                tracing::debug!(session_id = %self.session_id, "Model turn complete");
            }
            LiveEvent::Interrupted => {
                // Barge-in: stop playing queued assistant audio to the caller.
                self.pending_out.clear();
                if let Some(stream_sid) = self.stream_sid.clone() {
                    let _ = self
                        .telephony_tx
                        .send(TelephonyOut::Clear { stream_sid })
                        .await;
                }
            }
            LiveEvent::Error(error) => {
                let err = match &error {
                    LiveError::ConnectionFailed(m) | LiveError::WebSocketError(m) => {
                        SessionError::ConnectionLost(m.clone())
                    }
                    other => SessionError::Protocol(other.to_string()),
                };
                if err.is_fatal() && self.phase == SessionPhase::Bridging {
                    tracing::error!(session_id = %self.session_id, "{}", err);
                    self.finalize("failed").await;
                    let _ = self.telephony_tx.send(TelephonyOut::Close).await;
                } else {
                    tracing::warn!(session_id = %self.session_id, "{}", err);
                }
            }
            LiveEvent::Closed => {
                if self.phase == SessionPhase::Done || self.phase == SessionPhase::Finalizing {
                    return;
                }
                tracing::error!(
                    session_id = %self.session_id,
                    "Live session closed unexpectedly"
                );
                self.finalize("failed").await;
                let _ = self.telephony_tx.send(TelephonyOut::Close).await;
            }
        }
    }

    async fn handle_live_audio(&mut self, frame: LiveAudioFrame) {
        let mulaw = audio::live_to_telephony(&frame.data, frame.sample_rate);
        let payload = BASE64_STANDARD.encode(&mulaw);

        match self.stream_sid.clone() {
            Some(stream_sid) => {
                let _ = self
                    .telephony_tx
                    .send(TelephonyOut::Media {
                        stream_sid,
                        payload,
                    })
                    .await;
            }
            None => {
                // Setup race: the model produced audio before the telephony
                // start message arrived. Queue, bounded, oldest first out.
                if self.pending_out.len() >= self.config.outbound_queue_capacity {
                    self.pending_out.pop_front();
                    tracing::warn!(
                        session_id = %self.session_id,
                        "Outbound queue full, dropping oldest frame"
                    );
                }
                self.pending_out.push_back(payload);
            }
        }
    }

    async fn drain_pending_out(&mut self) {
        let Some(stream_sid) = self.stream_sid.clone() else {
            return;
        };
        while let Some(payload) = self.pending_out.pop_front() {
            let _ = self
                .telephony_tx
                .send(TelephonyOut::Media {
                    stream_sid: stream_sid.clone(),
                    payload,
                })
                .await;
        }
    }

    async fn handle_tool_calls(&mut self, calls: Vec<FunctionCall>) {
        let Some(dispatcher) = self.dispatcher.as_ref() else {
            tracing::warn!(
                session_id = %self.session_id,
                "Tool calls received before bridging; ignored"
            );
            return;
        };

        let mut responses = Vec::with_capacity(calls.len());
        for call in &calls {
            tracing::info!(
                session_id = %self.session_id,
                call_id = %call.id,
                tool = %call.name,
                "Executing tool call"
            );
            responses.push(dispatcher.execute(call).await);
        }

        if let Some(live) = self.live.as_ref()
            && let Err(e) = live.send_tool_results(responses).await
        {
            tracing::warn!(session_id = %self.session_id, "Failed to return tool results: {}", e);
        }
    }

    /// Tear the session down and persist the call-end record. Idempotent.
    pub async fn finalize(&mut self, status: &str) {
        if self.phase == SessionPhase::Done || self.phase == SessionPhase::Finalizing {
            return;
        }
        self.phase = SessionPhase::Finalizing;

        if let Some(mut live) = self.live.take() {
            live.close().await;
        }

        if self.dropped_frames > 0 {
            tracing::debug!(
                session_id = %self.session_id,
                dropped = self.dropped_frames,
                "Frames dropped while no live session was ready"
            );
        }

        if let Some(record_id) = self.call_record_id.clone() {
            let transcript_text = self
                .transcript
                .iter()
                .map(|l| format!("[{}] {}: {}", l.timestamp_ms, l.speaker.as_str(), l.text))
                .collect::<Vec<_>>()
                .join("\n");
            let summary = generate_summary(&self.transcript);

            if let Err(e) = self
                .store
                .record_call_end(
                    &record_id,
                    CallEndRecord {
                        status: status.to_string(),
                        transcript: transcript_text,
                        summary: Some(summary),
                    },
                )
                .await
            {
                tracing::error!(session_id = %self.session_id, "Call-end record failed: {}", e);
            }
        }

        self.phase = SessionPhase::Done;
        tracing::info!(session_id = %self.session_id, status = %status, "Session finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            gemini_api_key: "test-key".to_string(),
            gemini_model: "gemini-test".to_string(),
            gemini_voice: "Puck".to_string(),
            live_open_timeout_ms: 1_000,
            outbound_queue_capacity: 3,
        }
    }

    fn orchestrator(
        params: SessionParams,
    ) -> (
        SessionOrchestrator,
        mpsc::Receiver<TelephonyOut>,
        mpsc::Receiver<LiveEvent>,
    ) {
        let (telephony_tx, telephony_rx) = mpsc::channel(64);
        let (live_tx, live_rx) = mpsc::channel(64);
        let store = Arc::new(MemoryStore::default());
        let factory: LiveFactory =
            Arc::new(|_| Err(LiveError::ConnectionFailed("not under test".to_string())));
        (
            SessionOrchestrator::new(
                "session-test".to_string(),
                params,
                test_config(),
                store,
                factory,
                telephony_tx,
                live_tx,
            ),
            telephony_rx,
            live_rx,
        )
    }

    #[test]
    fn test_params_from_pairs_accepts_both_spellings() {
        let params = SessionParams::from_pairs([
            ("CallSid", "CA1"),
            ("from", "+15550100"),
            ("To", "+15550101"),
            ("direction", "OUTBOUND"),
            ("eventId", "event-7"),
            ("ignored", "x"),
        ]);
        assert_eq!(params.call_sid.as_deref(), Some("CA1"));
        assert_eq!(params.from.as_deref(), Some("+15550100"));
        assert_eq!(params.to.as_deref(), Some("+15550101"));
        assert_eq!(params.direction, Direction::Outbound);
        assert_eq!(params.event_id.as_deref(), Some("event-7"));
        assert!(params.attendee_id.is_none());
    }

    #[test]
    fn test_merge_custom_parameters_keeps_existing() {
        let mut params = SessionParams::from_pairs([("callSid", "CA1")]);
        let custom = HashMap::from([
            ("callSid".to_string(), "CA2".to_string()),
            ("attendeeId".to_string(), "attendee-42".to_string()),
        ]);
        params.merge_custom_parameters(&custom);
        assert_eq!(params.call_sid.as_deref(), Some("CA1"));
        assert_eq!(params.attendee_id.as_deref(), Some("attendee-42"));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("OUTBOUND"), Direction::Outbound);
        assert_eq!(Direction::parse("outbound"), Direction::Outbound);
        assert_eq!(Direction::parse("INBOUND"), Direction::Inbound);
        assert_eq!(Direction::parse("garbage"), Direction::Inbound);
    }

    #[test]
    fn test_summary_counts_speakers() {
        let transcript = vec![
            TranscriptLine {
                speaker: Speaker::Assistant,
                text: "Hello".to_string(),
                timestamp_ms: 1,
            },
            TranscriptLine {
                speaker: Speaker::Caller,
                text: "Hi".to_string(),
                timestamp_ms: 2,
            },
            TranscriptLine {
                speaker: Speaker::Assistant,
                text: "Bye".to_string(),
                timestamp_ms: 3,
            },
        ];
        let summary = generate_summary(&transcript);
        assert!(summary.contains("1 caller messages"));
        assert!(summary.contains("2 assistant responses"));
    }

    #[test]
    fn test_summary_empty_transcript() {
        assert_eq!(generate_summary(&[]), "No conversation recorded");
    }

    #[tokio::test]
    async fn test_live_audio_before_stream_sid_is_queued_bounded() {
        let (mut orch, mut telephony_rx, _live_rx) = orchestrator(SessionParams::default());

        for i in 0..5u8 {
            orch.handle_live_event(LiveEvent::Audio(LiveAudioFrame {
                data: Bytes::from(vec![i; 6]),
                sample_rate: 24_000,
            }))
            .await;
        }

        // Capacity is 3: the two oldest frames were discarded.
        assert_eq!(orch.pending_out.len(), 3);
        assert!(telephony_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_media_before_bridging_is_dropped() {
        let (mut orch, _telephony_rx, _live_rx) = orchestrator(SessionParams::default());
        orch.handle_media("AAAA").await;
        orch.handle_media("AAAA").await;
        assert_eq!(orch.dropped_frames, 2);
        assert_eq!(orch.phase(), SessionPhase::Init);
    }

    #[tokio::test]
    async fn test_outbound_without_identity_aborts_before_bridging() {
        let params = SessionParams {
            direction: Direction::Outbound,
            to: Some("+15550199".to_string()),
            ..Default::default()
        };
        let (mut orch, mut telephony_rx, _live_rx) = orchestrator(params);

        let result = orch
            .handle_start("MZ1".to_string(), Some("CA1".to_string()), HashMap::new())
            .await;

        assert!(matches!(result, Err(SessionError::Setup(_))));
        assert!(orch.is_done());
        assert!(orch.live.is_none());
        assert_eq!(telephony_rx.recv().await, Some(TelephonyOut::Close));
    }

    #[tokio::test]
    async fn test_duplicate_start_ignored() {
        let params = SessionParams {
            direction: Direction::Outbound,
            ..Default::default()
        };
        let (mut orch, _telephony_rx, _live_rx) = orchestrator(params);

        let _ = orch
            .handle_start("MZ1".to_string(), None, HashMap::new())
            .await;
        let phase = orch.phase();
        let second = orch
            .handle_start("MZ2".to_string(), None, HashMap::new())
            .await;
        assert!(second.is_ok());
        assert_eq!(orch.stream_sid.as_deref(), Some("MZ1"));
        assert_eq!(orch.phase(), phase);
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let (mut orch, _telephony_rx, _live_rx) = orchestrator(SessionParams::default());
        orch.finalize("completed").await;
        orch.finalize("failed").await;
        assert!(orch.is_done());
    }
}
