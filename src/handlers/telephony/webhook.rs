//! Telephony voice webhooks.
//!
//! The provider calls these when a call connects; the response is a TwiML
//! document instructing it to open the media stream toward this server,
//! carrying the session parameters as stream `<Parameter>`s. This handoff is
//! the one place the gateway must be bit-compatible with the provider's
//! documented markup.

use std::sync::Arc;

use axum::Form;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::state::AppState;

/// Form fields posted by the provider on call connect.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhookForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    /// Custom fields the surrounding system attached when creating the call
    #[serde(rename = "eventId")]
    pub event_id: Option<String>,
    #[serde(rename = "attendeeId")]
    pub attendee_id: Option<String>,
}

/// Webhook for inbound calls: connect the caller to the media stream.
pub async fn inbound_call_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<VoiceWebhookForm>,
) -> Response {
    info!(call_sid = ?form.call_sid, from = ?form.from, "Inbound voice webhook");

    let parameters = [
        ("callSid", form.call_sid.as_deref()),
        ("from", form.from.as_deref()),
        ("to", form.to.as_deref()),
        ("direction", Some("INBOUND")),
        ("eventId", form.event_id.as_deref()),
    ];

    twiml_response(
        "Welcome to the event assistance line. Please wait while we connect you.",
        &state.config.public_stream_url,
        &parameters,
    )
}

/// Webhook for outbound calls: connect the callee to the media stream.
pub async fn outbound_call_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<VoiceWebhookForm>,
) -> Response {
    info!(call_sid = ?form.call_sid, to = ?form.to, "Outbound voice webhook");

    let parameters = [
        ("callSid", form.call_sid.as_deref()),
        ("from", form.from.as_deref()),
        ("to", form.to.as_deref()),
        ("direction", Some("OUTBOUND")),
        ("eventId", form.event_id.as_deref()),
        ("attendeeId", form.attendee_id.as_deref()),
    ];

    twiml_response(
        "Hello, this is your event confirmation assistant.",
        &state.config.public_stream_url,
        &parameters,
    )
}

fn twiml_response(greeting: &str, stream_url: &str, parameters: &[(&str, Option<&str>)]) -> Response {
    let mut params_xml = String::new();
    for (name, value) in parameters {
        let Some(value) = value else { continue };
        params_xml.push_str(&format!(
            "      <Parameter name=\"{}\" value=\"{}\" />\n",
            xml_escape(name),
            xml_escape(value)
        ));
    }

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
    body.push_str(&format!("  <Say>{}</Say>\n", xml_escape(greeting)));
    body.push_str("  <Connect>\n");
    body.push_str(&format!(
        "    <Stream url=\"{}\">\n",
        xml_escape(stream_url)
    ));
    body.push_str(&params_xml);
    body.push_str("    </Stream>\n  </Connect>\n</Response>");

    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a&b<c>\"d\""), "a&amp;b&lt;c&gt;&quot;d&quot;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[tokio::test]
    async fn test_twiml_contains_stream_and_parameters() {
        let response = twiml_response(
            "Hello",
            "wss://gw.example.com/media-stream",
            &[
                ("callSid", Some("CA1")),
                ("direction", Some("OUTBOUND")),
                ("attendeeId", None),
            ],
        );

        let (parts, body) = response.into_parts();
        assert_eq!(parts.headers[header::CONTENT_TYPE.as_str()], "text/xml");

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let xml = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(xml.contains("<Connect>"));
        assert!(xml.contains("<Stream url=\"wss://gw.example.com/media-stream\">"));
        assert!(xml.contains("<Parameter name=\"callSid\" value=\"CA1\" />"));
        assert!(xml.contains("<Parameter name=\"direction\" value=\"OUTBOUND\" />"));
        // Absent fields produce no parameter element
        assert!(!xml.contains("attendeeId"));
    }
}
