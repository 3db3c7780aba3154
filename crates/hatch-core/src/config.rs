use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HatchError, Result};

/// Top-level configuration for the Hatch service.
///
/// Loaded from `~/.hatch/config.toml` by default. Every section falls back
/// to its defaults when omitted, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HatchConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub nurture: NurtureConfig,
    #[serde(default)]
    pub ideas: IdeasConfig,
}

impl HatchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HatchConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.hatch/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Hosted language-model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// API key. Usually supplied through `HATCH_LLM_API_KEY` or `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Chat model used for nurturing, documents and enrichment.
    pub model: String,
    /// Speech-to-text model.
    pub transcription_model: String,
    /// Timeout for one-shot calls, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum wait between two streamed fragments, in seconds.
    pub stream_idle_timeout_secs: u64,
    /// Capacity of the relay channel between upstream reader and consumer.
    pub relay_buffer: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            transcription_model: "whisper-1".to_string(),
            request_timeout_secs: 60,
            stream_idle_timeout_secs: 60,
            relay_buffer: 32,
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NurtureConfig {
    /// Maximum user message length in characters.
    pub max_message_length: usize,
    /// Sampling temperature for document generation.
    pub document_temperature: f32,
    /// Token budget for document generation.
    pub document_max_tokens: u32,
}

impl Default for NurtureConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            document_temperature: 0.7,
            document_max_tokens: 1500,
        }
    }
}

/// Idea capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeasConfig {
    /// Ideas a free-plan user may keep.
    pub free_plan_limit: u32,
    /// Maximum idea body length in characters.
    pub max_text_length: usize,
}

impl Default for IdeasConfig {
    fn default() -> Self {
        Self {
            free_plan_limit: 5,
            max_text_length: 5000,
        }
    }
}
