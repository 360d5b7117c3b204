//! Gemini Live API constants and voice selection.

use url::Url;

use crate::core::live::base::{LiveError, LiveResult};

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Native-audio model used when none is configured.
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Microphone audio sent to the model.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;

/// Model audio received from the service.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices of the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeminiVoice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    #[default]
    Zephyr,
}

impl GeminiVoice {
    pub const ALL: [GeminiVoice; 8] = [
        Self::Puck,
        Self::Charon,
        Self::Kore,
        Self::Fenrir,
        Self::Aoede,
        Self::Leda,
        Self::Orus,
        Self::Zephyr,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Case-insensitive lookup of a known voice.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Resource name of a model, e.g. `models/gemini-2.5-flash`.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// Endpoint URL with the API key attached as the `key` query parameter.
pub fn build_ws_url(endpoint: &str, api_key: &str) -> LiveResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| LiveError::InvalidConfiguration(format!("endpoint {}: {}", endpoint, e)))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(LiveError::InvalidConfiguration(format!(
            "endpoint must use ws:// or wss://, got {}",
            url.scheme()
        )));
    }
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

/// MIME type of outbound microphone audio.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse() {
        assert_eq!(GeminiVoice::parse("zephyr"), Some(GeminiVoice::Zephyr));
        assert_eq!(GeminiVoice::parse("Kore"), Some(GeminiVoice::Kore));
        assert_eq!(GeminiVoice::parse("alloy"), None);
        assert_eq!(GeminiVoice::default().to_string(), "Zephyr");
    }

    #[test]
    fn test_model_resource() {
        assert_eq!(
            model_resource(GEMINI_DEFAULT_MODEL),
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(model_resource("models/x"), "models/x");
    }

    #[test]
    fn test_build_ws_url() {
        let url = build_ws_url(GEMINI_LIVE_URL, "abc123").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("generativelanguage.googleapis.com"));
        assert_eq!(url.query(), Some("key=abc123"));

        assert!(matches!(
            build_ws_url("https://example.com", "k"),
            Err(LiveError::InvalidConfiguration(_))
        ));
        assert!(build_ws_url("not a url", "k").is_err());
    }

    #[test]
    fn test_pcm_mime_type() {
        assert_eq!(pcm_mime_type(16000), "audio/pcm;rate=16000");
    }
}
