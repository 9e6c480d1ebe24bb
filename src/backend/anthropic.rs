// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic Claude API backend implementation
//!
//! Implements the Backend trait over the Anthropic Messages API, with SSE
//! parsing for streamed replies.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{split_system, Backend, TextStream};
use crate::config::AnthropicConfig;
use crate::error::{BackendError, Error, Result};
use crate::prompt::{PromptMessage, PromptRole};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude backend
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Create with a custom base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build a backend from configuration. Fails if no API key can be
    /// resolved; this is a startup-time configuration error.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            Error::Config(format!(
                "No Anthropic API key found. Set {} or backends.anthropic.api_key.",
                config.api_key_env
            ))
        })?;

        let mut backend = Self::new(api_key, &config.model);
        backend.max_tokens = config.max_tokens;
        backend.temperature = config.temperature;
        if let Some(ref base_url) = config.base_url {
            backend.base_url = base_url.clone();
        }
        Ok(backend)
    }

    /// Build the request body
    fn build_request(&self, messages: &[PromptMessage], stream: bool) -> AnthropicRequest {
        let (system, conversational) = split_system(messages);

        AnthropicRequest {
            model: self.model.clone(),
            messages: conversational
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        PromptRole::Assistant => "assistant".to_string(),
                        _ => "user".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            system: if system.is_empty() { None } else { Some(system) },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = extract_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, retry_after));
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = self.build_request(messages, false);
        tracing::debug!(
            target: "rapport.backend.anthropic",
            model = %body.model,
            message_count = body.messages.len(),
            "requesting completion"
        );

        let response = self.send(&body).await?;
        let api_response: AnthropicResponse = response.json().await?;

        let text: String = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireContentBlock::Text { text } => Some(text),
                WireContentBlock::Other => None,
            })
            .collect();
        Ok(text)
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<TextStream> {
        let body = self.build_request(messages, true);
        tracing::debug!(
            target: "rapport.backend.anthropic",
            model = %body.model,
            message_count = body.messages.len(),
            "requesting streamed completion"
        );

        let response = self.send(&body).await?;
        let mut bytes = response.bytes_stream();

        let fragments = async_stream::try_stream! {
            let mut buffer = String::new();
            let mut done = false;
            while !done {
                let Some(chunk) = bytes.next().await else { break };
                let chunk =
                    chunk.map_err(|e| BackendError::StreamError(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are separated by a blank line.
                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    match parse_sse_event(&event) {
                        Some(SseData::ContentBlockDelta { delta }) => {
                            if let WireDelta::TextDelta { text } = delta {
                                yield text;
                            }
                        }
                        Some(SseData::Error { error }) => {
                            Err(BackendError::StreamError(format!(
                                "{}: {}",
                                error.error_type, error.message
                            )))?;
                        }
                        Some(SseData::MessageStop) => {
                            done = true;
                            break;
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

/// Extract a numeric Retry-After header value, if present
fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Map an error response body onto the backend error taxonomy
fn parse_error(status: u16, body: &str, retry_after: Option<u64>) -> Error {
    if let Ok(error_response) = serde_json::from_str::<AnthropicErrorBody>(body) {
        match error_response.error.error_type.as_str() {
            "authentication_error" => Error::Backend(BackendError::AuthenticationFailed),
            "rate_limit_error" => {
                let retry_secs = retry_after.unwrap_or(10) as u32;
                Error::Backend(BackendError::RateLimited(retry_secs))
            }
            "invalid_request_error" => {
                Error::Backend(BackendError::InvalidResponse(error_response.error.message))
            }
            _ => Error::Backend(BackendError::ServerError {
                status,
                message: error_response.error.message,
            }),
        }
    } else {
        Error::Backend(BackendError::ServerError {
            status,
            message: body.to_string(),
        })
    }
}

/// Parse one Server-Sent Event block into its decoded data payload
fn parse_sse_event(event_str: &str) -> Option<SseData> {
    let data = event_str
        .lines()
        .find_map(|line| line.strip_prefix("data: "))?;
    serde_json::from_str(data).ok()
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseData {
    ContentBlockDelta { delta: WireDelta },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: WireError,
}
