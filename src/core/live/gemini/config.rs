//! Gemini Live API configuration constants and option types.

use std::fmt;

/// WebSocket endpoint for the Gemini Live API.
pub const GEMINI_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Prebuilt voices supported by the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeminiVoice {
    /// Conversational default
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
}

impl GeminiVoice {
    /// Parse a voice name, falling back to the default for unknown values.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => GeminiVoice::Puck,
            "charon" => GeminiVoice::Charon,
            "kore" => GeminiVoice::Kore,
            "fenrir" => GeminiVoice::Fenrir,
            "aoede" => GeminiVoice::Aoede,
            _ => GeminiVoice::default(),
        }
    }

    /// The wire name of this voice.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeminiVoice::Puck => "Puck",
            GeminiVoice::Charon => "Charon",
            GeminiVoice::Kore => "Kore",
            GeminiVoice::Fenrir => "Fenrir",
            GeminiVoice::Aoede => "Aoede",
        }
    }
}

impl fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the connection URL carrying the API key.
pub fn build_ws_url(api_key: &str) -> String {
    format!("{GEMINI_LIVE_URL}?key={api_key}")
}

/// Qualify a bare model id the way the setup message expects.
pub fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
