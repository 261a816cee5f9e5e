//! Telephony media-stream wire messages.
//!
//! The provider speaks JSON over WebSocket, tagged by an `event` field.
//! Inbound: `connected`, `start`, `media`, `stop`, `dtmf`, `mark`.
//! Outbound: `media`, `clear`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maximum accepted size for a single media payload (base64). 20ms of μ-law
/// at 8kHz is 160 bytes raw; anything near this limit is not call audio.
pub const MAX_MEDIA_PAYLOAD_SIZE: usize = 64 * 1024;

/// Incoming control messages from the telephony transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioIncoming {
    /// First message after the WebSocket opens
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    /// The media stream is live; carries per-call metadata
    Start { start: StartMeta },

    /// One frame of caller audio
    Media { media: MediaMeta },

    /// The media stream ended
    Stop {
        #[serde(default)]
        stop: Option<serde_json::Value>,
    },

    /// A DTMF digit was pressed
    Dtmf { dtmf: DtmfMeta },

    /// Echo of a mark we previously sent
    Mark { mark: MarkMeta },
}

/// Metadata carried by the start message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

/// Declared audio format of the stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// One media frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMeta {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-encoded μ-law audio
    pub payload: String,
}

/// A DTMF press.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmfMeta {
    #[serde(default)]
    pub track: Option<String>,
    pub digit: String,
}

/// A named stream marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkMeta {
    pub name: String,
}

impl TwilioIncoming {
    /// Reject payloads far beyond anything a media frame can carry.
    pub fn validate_size(&self) -> Result<(), String> {
        if let TwilioIncoming::Media { media } = self
            && media.payload.len() > MAX_MEDIA_PAYLOAD_SIZE
        {
            return Err(format!(
                "media payload too large: {} bytes (max {})",
                media.payload.len(),
                MAX_MEDIA_PAYLOAD_SIZE
            ));
        }
        Ok(())
    }
}

/// Outgoing messages to the telephony transport.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutgoing {
    /// One frame of assistant audio
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Drop any audio the provider has buffered but not yet played
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Payload of an outgoing media message.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    /// Base64-encoded μ-law audio
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connected() {
        let msg: TwilioIncoming = serde_json::from_str(
            r#"{"event": "connected", "protocol": "Call", "version": "1.0.0"}"#,
        )
        .unwrap();
        assert!(matches!(msg, TwilioIncoming::Connected { .. }));
    }

    #[test]
    fn test_parse_start_with_custom_parameters() {
        let msg: TwilioIncoming = serde_json::from_str(
            r#"{
                "event": "start",
                "sequenceNumber": "1",
                "start": {
                    "accountSid": "AC1",
                    "streamSid": "MZ1",
                    "callSid": "CA1",
                    "tracks": ["inbound"],
                    "customParameters": {"eventId": "event-7", "direction": "OUTBOUND"},
                    "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
                },
                "streamSid": "MZ1"
            }"#,
        )
        .unwrap();

        let TwilioIncoming::Start { start } = msg else {
            panic!("expected start");
        };
        assert_eq!(start.stream_sid, "MZ1");
        assert_eq!(start.call_sid.as_deref(), Some("CA1"));
        assert_eq!(start.custom_parameters["eventId"], "event-7");
        assert_eq!(start.media_format.unwrap().sample_rate, 8000);
    }

    #[test]
    fn test_parse_media() {
        let msg: TwilioIncoming = serde_json::from_str(
            r#"{
                "event": "media",
                "media": {"track": "inbound", "chunk": "3", "timestamp": "60", "payload": "AAAA"},
                "streamSid": "MZ1"
            }"#,
        )
        .unwrap();

        let TwilioIncoming::Media { media } = msg else {
            panic!("expected media");
        };
        assert_eq!(media.payload, "AAAA");
        assert_eq!(media.track.as_deref(), Some("inbound"));
    }

    #[test]
    fn test_parse_stop_and_dtmf() {
        let stop: TwilioIncoming =
            serde_json::from_str(r#"{"event": "stop", "stop": {"callSid": "CA1"}}"#).unwrap();
        assert!(matches!(stop, TwilioIncoming::Stop { .. }));

        let dtmf: TwilioIncoming =
            serde_json::from_str(r#"{"event": "dtmf", "dtmf": {"digit": "5"}}"#).unwrap();
        let TwilioIncoming::Dtmf { dtmf } = dtmf else {
            panic!("expected dtmf");
        };
        assert_eq!(dtmf.digit, "5");
    }

    #[test]
    fn test_unknown_event_is_parse_error() {
        let result = serde_json::from_str::<TwilioIncoming>(r#"{"event": "telemetry"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_size() {
        let ok = TwilioIncoming::Media {
            media: MediaMeta {
                track: None,
                chunk: None,
                timestamp: None,
                payload: "A".repeat(100),
            },
        };
        assert!(ok.validate_size().is_ok());

        let too_big = TwilioIncoming::Media {
            media: MediaMeta {
                track: None,
                chunk: None,
                timestamp: None,
                payload: "A".repeat(MAX_MEDIA_PAYLOAD_SIZE + 1),
            },
        };
        assert!(too_big.validate_size().is_err());
    }

    #[test]
    fn test_outgoing_media_shape() {
        let msg = TwilioOutgoing::Media {
            stream_sid: "MZ1".to_string(),
            media: OutboundMedia {
                payload: "AAAA".to_string(),
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ1");
        assert_eq!(value["media"]["payload"], "AAAA");
    }

    #[test]
    fn test_outgoing_clear_shape() {
        let msg = TwilioOutgoing::Clear {
            stream_sid: "MZ1".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "clear");
        assert_eq!(value["streamSid"], "MZ1");
    }
}
