//! Voice-controlled browser assistant on top of the Gemini Live API.
//!
//! The [`Assistant`] streams microphone audio to the model, plays the spoken
//! reply and carries out the browser actions the model asks for.

pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use config::{AssistantConfig, ConfigError};
pub use crate::core::*;
