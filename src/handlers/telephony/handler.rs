//! Telephony media-stream WebSocket handler.
//!
//! One connection equals one call. The handler splits the socket into a
//! sender task fed by an mpsc channel and a receive loop that drives the
//! session orchestrator. Events from the live session are forwarded into the
//! same loop, so every piece of per-call state is touched from exactly one
//! task.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use super::messages::{OutboundMedia, TwilioIncoming, TwilioOutgoing};
use crate::core::live::base::{BaseLive, BoxedLive, LiveFactory};
use crate::core::live::gemini::GeminiLive;
use crate::core::session::{
    BridgeConfig, LiveEvent, SessionOrchestrator, SessionParams, TelephonyOut,
};
use crate::state::AppState;

/// Channel buffer size for audio workloads.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB). Call audio frames are tiny; anything
/// larger is not ours.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB).
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Media-stream WebSocket handler.
///
/// Upgrades the HTTP connection for one call's media stream. Session
/// parameters arrive in the URL query string and are merged with the start
/// message's custom parameters.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let params = SessionParams::from_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    info!(call_sid = ?params.call_sid, direction = %params.direction.as_str(),
        "Media stream WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_socket(socket, state, params))
}

/// Handle one media-stream connection from upgrade to teardown.
async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>, params: SessionParams) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Media stream connected");

    let (mut sender, mut receiver) = socket.split();
    let (telephony_tx, mut telephony_rx) = mpsc::channel::<TelephonyOut>(CHANNEL_BUFFER_SIZE);
    let (live_tx, mut live_rx) = mpsc::channel::<LiveEvent>(CHANNEL_BUFFER_SIZE);

    // Sender task: serializes everything going back to the provider.
    let sender_task = tokio::spawn(async move {
        while let Some(out) = telephony_rx.recv().await {
            let result = match out {
                TelephonyOut::Media {
                    stream_sid,
                    payload,
                } => {
                    let message = TwilioOutgoing::Media {
                        stream_sid,
                        media: OutboundMedia { payload },
                    };
                    match serde_json::to_string(&message) {
                        Ok(json) => sender.send(Message::Text(json.into())).await,
                        Err(e) => {
                            error!("Failed to serialize outgoing media: {}", e);
                            continue;
                        }
                    }
                }
                TelephonyOut::Clear { stream_sid } => {
                    let message = TwilioOutgoing::Clear { stream_sid };
                    match serde_json::to_string(&message) {
                        Ok(json) => sender.send(Message::Text(json.into())).await,
                        Err(e) => {
                            error!("Failed to serialize clear message: {}", e);
                            continue;
                        }
                    }
                }
                TelephonyOut::Close => {
                    info!("Closing media stream WebSocket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let factory: LiveFactory = Arc::new(|config| {
        GeminiLive::new(config).map(|live| Box::new(live) as BoxedLive)
    });

    let mut orchestrator = SessionOrchestrator::new(
        session_id.clone(),
        params,
        BridgeConfig::from_server(&state.config),
        state.store.clone(),
        factory,
        telephony_tx,
        live_tx,
    );

    // How often we check if the connection went quiet
    let processing_timeout = Duration::from_secs(30);

    // Maximum idle time before closing the connection. A live call always
    // has media flowing, so a quiet connection is a dead one.
    let idle_timeout = Duration::from_secs(120);
    let mut last_activity = std::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = std::time::Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_telephony_message(msg, &mut orchestrator).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Media stream WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Media stream closed by provider");
                        break;
                    }
                }
            }
            live_event = live_rx.recv() => {
                if let Some(event) = live_event {
                    orchestrator.handle_live_event(event).await;
                    if orchestrator.is_done() {
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(processing_timeout) => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        session_id = %session_id,
                        "Media stream idle for {}s, closing stale connection",
                        last_activity.elapsed().as_secs()
                    );
                    break;
                }
                debug!(session_id = %session_id, "Media stream idle check - still active");
            }
        }
    }

    // Transport-level disconnect is an implicit stop.
    orchestrator.finalize("completed").await;

    sender_task.abort();
    info!(session_id = %session_id, "Media stream session terminated");
}

/// Process one incoming WebSocket message. Returns false when the session
/// loop should end.
async fn process_telephony_message(
    msg: Message,
    orchestrator: &mut SessionOrchestrator,
) -> bool {
    match msg {
        Message::Text(text) => {
            let incoming: TwilioIncoming = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    // Malformed control messages never terminate the call.
                    warn!("Malformed control message ignored: {}", e);
                    return true;
                }
            };

            if let Err(e) = incoming.validate_size() {
                warn!("Control message rejected: {}", e);
                return true;
            }

            handle_telephony_incoming(incoming, orchestrator).await
        }
        Message::Binary(_) => {
            debug!("Unexpected binary frame on media stream, ignoring");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!("Media stream close frame received");
            false
        }
    }
}

/// Handle one parsed control message.
async fn handle_telephony_incoming(
    msg: TwilioIncoming,
    orchestrator: &mut SessionOrchestrator,
) -> bool {
    match msg {
        TwilioIncoming::Connected { protocol, version } => {
            debug!(?protocol, ?version, "Media stream protocol connected");
            true
        }
        TwilioIncoming::Start { start } => {
            if let Err(e) = orchestrator
                .handle_start(start.stream_sid, start.call_sid, start.custom_parameters)
                .await
            {
                error!("Session setup failed: {}", e);
                return false;
            }
            true
        }
        TwilioIncoming::Media { media } => {
            orchestrator.handle_media(&media.payload).await;
            true
        }
        TwilioIncoming::Stop { .. } => {
            orchestrator.handle_stop().await;
            false
        }
        TwilioIncoming::Dtmf { dtmf } => {
            debug!(digit = %dtmf.digit, "DTMF received");
            true
        }
        TwilioIncoming::Mark { mark } => {
            debug!(name = %mark.name, "Mark echoed by provider");
            true
        }
    }
}
