//! Telephony route configuration.
//!
//! # Endpoints
//!
//! - `POST /voice/inbound` - TwiML webhook for inbound calls
//! - `POST /voice/outbound` - TwiML webhook for outbound calls
//! - `GET /media-stream` - WebSocket upgrade for the per-call media stream
//!
//! The webhooks answer with a `<Connect><Stream>` document pointing the
//! provider at `/media-stream`, passing session parameters through as stream
//! parameters.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::telephony::{
    inbound_call_handler, media_stream_handler, outbound_call_handler,
};
use crate::state::AppState;

/// Create the telephony router.
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice/inbound", post(inbound_call_handler))
        .route("/voice/outbound", post(outbound_call_handler))
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
