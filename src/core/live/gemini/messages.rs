//! Gemini Live API WebSocket message types.
//!
//! All messages are JSON objects over WebSocket. A client message carries
//! exactly one of `setup`, `realtimeInput`, `clientContent`, or
//! `toolResponse`; serde's externally-tagged enum representation produces
//! exactly that shape. Server messages may combine fields (for instance
//! `serverContent` together with `usageMetadata`), so they deserialize into a
//! struct of optionals instead.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - declare model, generation config, system instruction, tools
//! - realtimeInput - streamed media chunks
//! - clientContent - discrete conversation turns
//! - toolResponse - function responses correlated by call id
//!
//! Server messages (received from server):
//! - setupComplete - session is ready for traffic
//! - serverContent - model turn parts (text and inline audio), turn state
//! - toolCall - batch of requested function calls
//! - toolCallCancellation - ids of calls the model withdrew
//! - usageMetadata - token accounting
//! - goAway - imminent server-side disconnect

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::live::base::{FunctionResponse, ToolDeclaration};

// =============================================================================
// Shared content types
// =============================================================================

/// One part of a content turn: text or inline binary data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// Inline binary payload with a mime type, base64 encoded on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// A content turn with an optional role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

// =============================================================================
// Setup
// =============================================================================

/// Session setup: the first (and only) configuration message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolList>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Tool declarations grouped the way the API expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolList {
    pub function_declarations: Vec<ToolDeclaration>,
}

// =============================================================================
// Client Messages (sent to server)
// =============================================================================

/// Streamed realtime media input.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_chunks: Vec<Blob>,
}

/// A discrete client turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// Function responses returned to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePayload {
    pub function_responses: Vec<FunctionResponse>,
}

/// Client messages sent to the Gemini Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponsePayload),
}

impl ClientMessage {
    /// Build a realtime audio chunk from raw PCM bytes.
    pub fn audio_chunk(data: &[u8], sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: format!("audio/pcm;rate={sample_rate}"),
                data: BASE64_STANDARD.encode(data),
            }],
        })
    }

    /// Build a single user text turn.
    pub fn user_text(text: &str) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(text)],
            }],
            turn_complete: true,
        })
    }
}

// =============================================================================
// Server Messages (received from server)
// =============================================================================

/// Content generated by the model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<Content>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
}

/// A batch of function calls requested by the model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallPayload {
    pub function_calls: Vec<WireFunctionCall>,
}

/// One requested function call as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Ids of previously requested calls the model has withdrawn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallCancellation {
    pub ids: Vec<String>,
}

/// A server message. Fields are non-exclusive; handle each that is present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCallPayload>,
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    pub usage_metadata: Option<serde_json::Value>,
    pub go_away: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_serialization_shape() {
        let msg = ClientMessage::Setup(Setup {
            model: "models/gemini-test".to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: "Puck".to_string(),
                        },
                    },
                }),
            },
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text("Be brief.")],
            }),
            tools: vec![ToolList {
                function_declarations: vec![ToolDeclaration {
                    name: "update_attendee_status".to_string(),
                    description: "Update attendance".to_string(),
                    parameters: json!({"type": "object"}),
                }],
            }],
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["setup"]["model"], "models/gemini-test");
        assert_eq!(
            value["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(
            value["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
        assert_eq!(
            value["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            "update_attendee_status"
        );
    }

    #[test]
    fn test_audio_chunk_serialization() {
        let msg = ClientMessage::audio_chunk(&[0u8, 1, 2, 3], 16_000);
        let value = serde_json::to_value(&msg).unwrap();
        let chunk = &value["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], BASE64_STANDARD.encode([0u8, 1, 2, 3]));
    }

    #[test]
    fn test_user_text_serialization() {
        let msg = ClientMessage::user_text("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["clientContent"]["turnComplete"], true);
        assert_eq!(value["clientContent"]["turns"][0]["role"], "user");
        assert_eq!(value["clientContent"]["turns"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_tool_response_serialization() {
        let msg = ClientMessage::ToolResponse(ToolResponsePayload {
            function_responses: vec![FunctionResponse {
                id: "call-7".to_string(),
                name: "lookup_event_content".to_string(),
                response: json!({"success": true}),
            }],
        });
        let value = serde_json::to_value(&msg).unwrap();
        let resp = &value["toolResponse"]["functionResponses"][0];
        assert_eq!(resp["id"], "call-7");
        assert_eq!(resp["response"]["success"], true);
    }

    #[test]
    fn test_server_content_deserialization() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"text": "Hi there"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}
                    ]
                },
                "turnComplete": true
            },
            "usageMetadata": {"totalTokenCount": 42}
        }))
        .unwrap();

        let content = msg.server_content.unwrap();
        let turn = content.model_turn.unwrap();
        assert_eq!(turn.parts.len(), 2);
        assert_eq!(turn.parts[0].text.as_deref(), Some("Hi there"));
        let blob = turn.parts[1].inline_data.as_ref().unwrap();
        assert!(blob.mime_type.starts_with("audio/"));
        assert_eq!(content.turn_complete, Some(true));
        assert!(msg.usage_metadata.is_some());
    }

    #[test]
    fn test_tool_call_deserialization() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "toolCall": {
                "functionCalls": [
                    {"id": "call-1", "name": "remove_attendee", "args": {"eventId": "e-7"}}
                ]
            }
        }))
        .unwrap();

        let calls = msg.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call-1");
        assert_eq!(calls[0].args["eventId"], "e-7");
    }

    #[test]
    fn test_setup_complete_deserialization() {
        let msg: ServerMessage = serde_json::from_value(json!({"setupComplete": {}})).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"somethingNew": {"x": 1}})).unwrap();
        assert!(msg.setup_complete.is_none());
        assert!(msg.tool_call.is_none());
    }
}
