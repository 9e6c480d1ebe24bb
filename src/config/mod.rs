// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for rapport
//!
//! Process-wide configuration, loaded once from a YAML file at startup and
//! read-only afterwards. Selects the adapter, backend parameters, prompt
//! templates, streaming mode, starter suggestions, and the optional static
//! context source.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adapter::Starter;
use crate::error::{Error, Result};
use crate::prompt::PromptTemplate;

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Dotted adapter identifier, e.g. "rapport.adapters.AnthropicChatAdapter"
    pub adapter: String,

    /// Backend configurations
    #[serde(default)]
    pub backends: BackendsConfig,

    /// System instruction injected into the first prompt slot
    #[serde(default)]
    pub system_prompt: String,

    /// Prompt slot templates
    #[serde(default)]
    pub templates: PromptTemplate,

    /// Whether replies are streamed incrementally or emitted once
    #[serde(default)]
    pub stream_response: bool,

    /// Static context source
    #[serde(default)]
    pub context: ContextConfig,

    /// Suggested opening messages offered before the first turn
    #[serde(default)]
    pub starters: Vec<Starter>,

    /// Upper bound for a backend call and for each streamed fragment
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Configuration for LLM backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendsConfig {
    /// Anthropic Claude configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama local model configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Anthropic-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_anthropic_api_key_env")]
    pub api_key_env: String,

    /// Model to use
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens in a response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Ollama local model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Static context source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextConfig {
    /// Directory whose text files are concatenated into the context slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Load the directory once at startup instead of per session
    #[serde(default)]
    pub eager: bool,
}

impl AnthropicConfig {
    /// Resolve the API key from settings or the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_anthropic_api_key_env(),
            model: default_anthropic_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            temperature: default_temperature(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Validate startup invariants: the adapter identifier is well-formed and
    /// every prompt template resolves with the supported placeholders.
    pub fn validate(&self) -> Result<()> {
        if self.adapter.trim().is_empty() {
            return Err(Error::Config("no adapter identifier configured".to_string()));
        }
        if !self.adapter.contains('.') {
            return Err(Error::Config(format!(
                "adapter identifier '{}' is not a dotted '<module-path>.<type-name>' path",
                self.adapter
            )));
        }
        self.templates.validate()?;
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    60
}
