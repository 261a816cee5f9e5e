//! Telephony session handling: the media-stream WebSocket, its wire
//! messages, and the TwiML webhooks that initiate streams.

mod handler;
pub mod messages;
mod webhook;

pub use handler::media_stream_handler;
pub use webhook::{inbound_call_handler, outbound_call_handler};
