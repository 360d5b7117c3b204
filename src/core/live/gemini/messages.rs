//! Gemini Live API WebSocket message types.
//!
//! All messages are camelCase JSON objects keyed by their kind.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - Model, voice, system prompt, tools and transcription settings
//! - realtimeInput - Microphone audio chunks
//! - toolResponse - Results of function calls
//!
//! Server messages (received from server):
//! - setupComplete - Setup accepted, session is open
//! - serverContent - Model audio, transcriptions and turn signals
//! - toolCall - Functions the model wants executed
//! - toolCallCancellation - Calls the model no longer needs
//! - goAway - The server will disconnect soon
//! - usageMetadata - Token accounting

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::config::pcm_mime_type;
use crate::core::audio::encode_outbound;
use crate::core::tools::{FunctionDeclaration, ToolResult};

// =============================================================================
// Shared Types
// =============================================================================

/// Inline binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
}

impl Blob {
    /// The `rate=` parameter of an `audio/pcm` MIME type, if present.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.is_empty() || self.mime_type.starts_with("audio/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

// =============================================================================
// Client Messages
// =============================================================================

/// Response modalities the model may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Enables transcription of one audio direction. Serialized as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Session setup, sent once as the first message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Model resource name (`models/...`)
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// One block of microphone audio as base64 PCM16.
    pub fn audio(samples: &[f32], sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: pcm_mime_type(sample_rate),
                data: encode_outbound(samples),
            }],
        })
    }

    /// The result of one function call, correlated by `id`.
    ///
    /// The result is carried as a JSON string under `response.result`.
    pub fn tool_response(id: impl Into<String>, name: impl Into<String>, result: &ToolResult) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: id.into(),
                name: name.into(),
                response: json!({ "result": result.to_json() }),
            }],
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::RealtimeInput(_) => "realtimeInput",
            ClientMessage::ToolResponse(_) => "toolResponse",
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub turn_complete: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generation_complete: bool,
}

/// One function the model wants executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time before disconnect, e.g. `"10s"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<String>,
}

/// Messages sent from server to client.
///
/// Fields are not exclusive: one frame may carry transcription, audio and a
/// turn signal together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<Value>,
}

/// One logical event, in the order the session must handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    UserTranscription(String),
    AssistantTranscription(String),
    Audio(Blob),
    ToolCalls(Vec<FunctionCall>),
    ToolCallCancellation(Vec<String>),
    TurnComplete,
    Interrupted,
    GoAway { time_left: Option<String> },
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten the message into events.
    ///
    /// Order: transcriptions (user, then assistant), audio parts, tool calls,
    /// turn complete, interrupted. Notices follow.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::SetupComplete);
        }

        let mut turn_complete = false;
        let mut interrupted = false;
        if let Some(content) = self.server_content {
            if let Some(t) = content.input_transcription {
                events.push(InboundEvent::UserTranscription(t.text));
            }
            if let Some(t) = content.output_transcription {
                events.push(InboundEvent::AssistantTranscription(t.text));
            }
            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|part| part.inline_data)
                        .filter(|blob| blob.is_audio() && !blob.data.is_empty())
                        .map(InboundEvent::Audio),
                );
            }
            turn_complete = content.turn_complete;
            interrupted = content.interrupted;
        }

        if let Some(call) = self.tool_call
            && !call.function_calls.is_empty()
        {
            events.push(InboundEvent::ToolCalls(call.function_calls));
        }
        if turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
        if interrupted {
            events.push(InboundEvent::Interrupted);
        }

        if let Some(cancel) = self.tool_call_cancellation {
            events.push(InboundEvent::ToolCallCancellation(cancel.ids));
        }
        if let Some(go_away) = self.go_away {
            events.push(InboundEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_wire_format() {
        let setup = ClientMessage::Setup(Setup {
            model: "models/m".to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: "Zephyr".to_string(),
                        },
                    },
                }),
            },
            system_instruction: Some(Content::text("be brief")),
            tools: vec![Tool {
                function_declarations: crate::core::tools::function_declarations(),
            }],
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: Some(AudioTranscriptionConfig::default()),
        });

        let value = serde_json::to_value(&setup).unwrap();
        let body = &value["setup"];
        assert_eq!(body["model"], "models/m");
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["tools"][0]["functionDeclarations"][2]["name"], "searchGoogle");
        assert_eq!(body["inputAudioTranscription"], json!({}));
        assert_eq!(body["outputAudioTranscription"], json!({}));
    }

    #[test]
    fn test_audio_message() {
        let value = serde_json::to_value(ClientMessage::audio(&[0.5], 16000)).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AEA="}]}})
        );
    }

    #[test]
    fn test_tool_response_carries_json_string() {
        let message = ClientMessage::tool_response("call-1", "openUrl", &ToolResult::ok());
        let value = serde_json::to_value(&message).unwrap();
        let response = &value["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "call-1");
        assert_eq!(response["name"], "openUrl");
        assert_eq!(response["response"]["result"], r#"{"success":true}"#);
        assert_eq!(message.kind(), "toolResponse");
    }

    #[test]
    fn test_parse_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert_eq!(message.into_events(), vec![InboundEvent::SetupComplete]);
    }

    #[test]
    fn test_events_follow_handling_order() {
        let raw = r#"{
            "serverContent": {
                "interrupted": true,
                "turnComplete": true,
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQA="}}
                ]},
                "outputTranscription": {"text": " there"},
                "inputTranscription": {"text": "hello"}
            },
            "toolCall": {"functionCalls": [{"id": "1", "name": "searchGoogle", "args": {"query": "cats"}}]}
        }"#;
        let events = serde_json::from_str::<ServerMessage>(raw)
            .unwrap()
            .into_events();

        assert_eq!(events.len(), 7);
        assert_eq!(events[0], InboundEvent::UserTranscription("hello".into()));
        assert_eq!(events[1], InboundEvent::AssistantTranscription(" there".into()));
        assert!(matches!(&events[2], InboundEvent::Audio(blob) if blob.data == "AAA="));
        assert!(matches!(&events[3], InboundEvent::Audio(blob) if blob.data == "AQA="));
        match &events[4] {
            InboundEvent::ToolCalls(calls) => {
                assert_eq!(calls[0].name, "searchGoogle");
                assert_eq!(calls[0].args["query"], "cats");
            }
            other => panic!("Expected tool calls, got {:?}", other),
        }
        assert_eq!(events[5], InboundEvent::TurnComplete);
        assert_eq!(events[6], InboundEvent::Interrupted);
    }

    #[test]
    fn test_non_audio_inline_data_is_skipped() {
        let raw = r#"{"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "AAA="}}
        ]}}}"#;
        let events = serde_json::from_str::<ServerMessage>(raw)
            .unwrap()
            .into_events();
        assert!(events.is_empty());
    }

    #[test]
    fn test_notices() {
        let raw = r#"{"goAway": {"timeLeft": "10s"}, "toolCallCancellation": {"ids": ["a"]}, "usageMetadata": {"totalTokenCount": 12}}"#;
        let events = serde_json::from_str::<ServerMessage>(raw)
            .unwrap()
            .into_events();
        assert_eq!(
            events,
            vec![
                InboundEvent::ToolCallCancellation(vec!["a".into()]),
                InboundEvent::GoAway {
                    time_left: Some("10s".into())
                },
            ]
        );
    }

    #[test]
    fn test_blob_sample_rate() {
        let blob = Blob {
            mime_type: "audio/pcm;rate=24000".into(),
            data: String::new(),
        };
        assert_eq!(blob.sample_rate(), Some(24000));
        let bare = Blob {
            mime_type: "audio/pcm".into(),
            data: String::new(),
        };
        assert_eq!(bare.sample_rate(), None);
        assert!(bare.is_audio());
    }
}
