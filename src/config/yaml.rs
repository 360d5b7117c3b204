use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// gemini:
///   api_key: "your-gemini-key"
///   model: "gemini-2.5-flash-native-audio-preview-12-2025"
///   voice: "Zephyr"
///   endpoint: "wss://generativelanguage.googleapis.com/ws/..."
///   setup_timeout_ms: 10000
///
/// audio:
///   input_sample_rate: 16000
///   output_sample_rate: 24000
///   capture_block_size: 4096
///
/// assistant:
///   tool_log_capacity: 7
///   system_prompt: "You are a helpful browser assistant."
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub gemini: Option<GeminiYaml>,
    pub audio: Option<AudioYaml>,
    pub assistant: Option<AssistantYaml>,
}

/// Remote model settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub endpoint: Option<String>,
    /// Upper bound on the wait for `setupComplete` (ms)
    pub setup_timeout_ms: Option<u64>,
}

/// Audio path settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    /// Samples per captured block sent to the model
    pub capture_block_size: Option<usize>,
}

/// Front-end settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssistantYaml {
    pub tool_log_capacity: Option<usize>,
    /// Replaces the built-in behavioural prompt
    pub system_prompt: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadFile(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::ParseYaml(format!("Failed to parse YAML config: {e}")))
    }
}
