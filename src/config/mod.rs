//! Configuration module for the assistant
//!
//! Configuration comes from YAML files, environment variables and `.env`
//! files. Priority: YAML > ENV vars > .env values > defaults. The `.env` file
//! is loaded by the binary at start-up, so from here on it is just part of the
//! process environment.
//!
//! # Example
//! ```rust,no_run
//! use jarvis_core::config::AssistantConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = AssistantConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = AssistantConfig::from_file(&PathBuf::from("config.yaml"))?;
//! println!("Using model {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::core::live::LiveSetup;
use crate::core::live::gemini::{
    GEMINI_DEFAULT_MODEL, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE,
    GeminiVoice,
};
use crate::core::session::{AudioSettings, SYSTEM_PROMPT};
use crate::core::tools::function_declarations;

mod yaml;

pub use yaml::YamlConfig;

/// Primary environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Fallback name used by `.env` files written for the browser client.
pub const API_KEY_FALLBACK_ENV: &str = "VITE_GEMINI_API_KEY";

pub const DEFAULT_CAPTURE_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TOOL_LOG_CAPACITY: usize = 7;

/// Configuration failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing API key: set GEMINI_API_KEY or gemini.api_key in the config file")]
    MissingApiKey,

    #[error("{0}")]
    ReadFile(String),

    #[error("{0}")]
    ParseYaml(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Assistant configuration
#[derive(Clone)]
pub struct AssistantConfig {
    /// Gemini API key; empty when not configured
    pub api_key: String,
    pub model: String,
    pub voice: String,
    /// WebSocket endpoint of the Live API
    pub endpoint: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub capture_block_size: usize,
    pub setup_timeout_ms: u64,
    pub tool_log_capacity: usize,
    pub system_prompt: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: GEMINI_DEFAULT_MODEL.to_string(),
            voice: GeminiVoice::default().as_str().to_string(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            input_sample_rate: GEMINI_INPUT_SAMPLE_RATE,
            output_sample_rate: GEMINI_OUTPUT_SAMPLE_RATE,
            capture_block_size: DEFAULT_CAPTURE_BLOCK_SIZE,
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            tool_log_capacity: DEFAULT_TOOL_LOG_CAPACITY,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "[REDACTED]" })
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("endpoint", &self.endpoint)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .field("capture_block_size", &self.capture_block_size)
            .field("setup_timeout_ms", &self.setup_timeout_ms)
            .field("tool_log_capacity", &self.tool_log_capacity)
            .finish_non_exhaustive()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for AssistantConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}

impl AssistantConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// A missing API key is not an error here; sessions refuse to start
    /// without one, while local commands work fine.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of the environment.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed, if an
    /// environment variable has an invalid format, or if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(key) = env_var(API_KEY_ENV).or_else(|| env_var(API_KEY_FALLBACK_ENV)) {
            self.api_key = key;
        }
        if let Some(model) = env_var("JARVIS_MODEL") {
            self.model = model;
        }
        if let Some(voice) = env_var("JARVIS_VOICE") {
            self.voice = voice;
        }
        if let Some(endpoint) = env_var("JARVIS_LIVE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(block) = env_var("JARVIS_CAPTURE_BLOCK") {
            self.capture_block_size = parse_env("JARVIS_CAPTURE_BLOCK", &block)?;
        }
        if let Some(timeout) = env_var("JARVIS_SETUP_TIMEOUT_MS") {
            self.setup_timeout_ms = parse_env("JARVIS_SETUP_TIMEOUT_MS", &timeout)?;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(gemini) = yaml.gemini {
            if let Some(key) = gemini.api_key {
                self.api_key = key;
            }
            if let Some(model) = gemini.model {
                self.model = model;
            }
            if let Some(voice) = gemini.voice {
                self.voice = voice;
            }
            if let Some(endpoint) = gemini.endpoint {
                self.endpoint = endpoint;
            }
            if let Some(timeout) = gemini.setup_timeout_ms {
                self.setup_timeout_ms = timeout;
            }
        }
        if let Some(audio) = yaml.audio {
            if let Some(rate) = audio.input_sample_rate {
                self.input_sample_rate = rate;
            }
            if let Some(rate) = audio.output_sample_rate {
                self.output_sample_rate = rate;
            }
            if let Some(block) = audio.capture_block_size {
                self.capture_block_size = block;
            }
        }
        if let Some(assistant) = yaml.assistant {
            if let Some(capacity) = assistant.tool_log_capacity {
                self.tool_log_capacity = capacity;
            }
            if let Some(prompt) = assistant.system_prompt {
                self.system_prompt = prompt;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "sample rates must be greater than zero".to_string(),
            ));
        }
        if self.capture_block_size == 0 {
            return Err(ConfigError::Invalid(
                "capture_block_size must be greater than zero".to_string(),
            ));
        }
        if self.setup_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "setup_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if GeminiVoice::parse(&self.voice).is_none() {
            warn!(voice = %self.voice, "Unknown voice, passing it to the service unchanged");
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// The API key, or [`ConfigError::MissingApiKey`].
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        if self.has_api_key() {
            Ok(&self.api_key)
        } else {
            Err(ConfigError::MissingApiKey)
        }
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    /// Channel parameters sent with every session setup.
    pub fn live_setup(&self) -> LiveSetup {
        LiveSetup {
            api_key: self.api_key.trim().to_string(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_prompt: self.system_prompt.clone(),
            tools: function_declarations(),
            input_sample_rate: self.input_sample_rate,
            setup_timeout: self.setup_timeout(),
        }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
            capture_block_size: self.capture_block_size,
        }
    }
}

/// A set, non-blank environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value: {value}")))
}
