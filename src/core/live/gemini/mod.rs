//! Gemini Live API client.
//!
//! Bidirectional audio sessions with Google's native-audio models over a
//! single WebSocket.
//!
//! # Audio Format
//!
//! Microphone input is PCM 16-bit signed little-endian at 16kHz, model output
//! is the same encoding at 24kHz. Both travel base64 encoded inside JSON.

pub mod client;
pub mod config;
pub mod messages;

pub use client::GeminiLive;
pub use config::{
    GEMINI_DEFAULT_MODEL, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE,
    GeminiVoice, build_ws_url, model_resource, pcm_mime_type,
};
pub use messages::{
    Blob, ClientMessage, FunctionCall, FunctionResponse, InboundEvent, ServerContent,
    ServerMessage, Setup,
};
