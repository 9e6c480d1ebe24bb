// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama local model backend implementation
//!
//! Implements the Backend trait over Ollama's /api/chat endpoint, with
//! NDJSON parsing for streamed replies.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{split_system, Backend, TextStream};
use crate::config::OllamaConfig;
use crate::error::{BackendError, Error, Result};
use crate::prompt::{PromptMessage, PromptRole};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama local model backend
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaBackend {
    /// Create a new Ollama backend with the default base URL (http://localhost:11434)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    /// Create with a custom base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build a backend from configuration
    pub fn from_config(config: &OllamaConfig) -> Self {
        let mut backend = Self::new(&config.model).with_base_url(&config.base_url);
        backend.temperature = config.temperature;
        backend
    }

    /// Check if Ollama is running and reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                if e.is_connect() {
                    Err(Error::Backend(BackendError::Network(
                        "Ollama is not running. Start the Ollama app or run 'ollama serve'"
                            .to_string(),
                    )))
                } else {
                    Err(Error::Http(e))
                }
            }
        }
    }

    /// Build the request body
    fn build_request(&self, messages: &[PromptMessage], stream: bool) -> OllamaRequest {
        let (system, conversational) = split_system(messages);

        let mut wire_messages = Vec::with_capacity(conversational.len() + 1);
        if !system.is_empty() {
            wire_messages.push(WireMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        wire_messages.extend(conversational.iter().map(|m| WireMessage {
            role: match m.role {
                PromptRole::Assistant => "assistant".to_string(),
                PromptRole::System => "system".to_string(),
                PromptRole::User => "user".to_string(),
            },
            content: m.content.clone(),
        }));

        OllamaRequest {
            model: self.model.clone(),
            messages: wire_messages,
            stream,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }

    async fn send(&self, body: &OllamaRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::Backend(BackendError::Network(format!(
                        "could not reach Ollama at {}: {e}",
                        self.base_url
                    )))
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(Error::Backend(BackendError::ServerError { status, message }));
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = self.build_request(messages, false);
        tracing::debug!(
            target: "rapport.backend.ollama",
            model = %body.model,
            message_count = body.messages.len(),
            "requesting completion"
        );

        let response = self.send(&body).await?;
        let api_response: OllamaChatResponse = response.json().await?;

        if let Some(error) = api_response.error {
            return Err(Error::Backend(BackendError::InvalidResponse(error)));
        }
        Ok(api_response
            .message
            .map(|m| m.content)
            .unwrap_or_default())
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<TextStream> {
        let body = self.build_request(messages, true);
        tracing::debug!(
            target: "rapport.backend.ollama",
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

                // One JSON object per line.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: OllamaChatResponse = serde_json::from_str(&line)
                        .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                    if let Some(error) = parsed.error {
                        Err(BackendError::StreamError(error))?;
                    }
                    if let Some(message) = parsed.message {
                        if !message.content.is_empty() {
                            yield message.content;
                        }
                    }
                    if parsed.done {
                        done = true;
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OllamaBackend {
        OllamaBackend::new("llama3.2")
    }

    #[test]
    fn test_build_request_prepends_system_message() {
        let messages = vec![
            PromptMessage::system("You are helpful."),
            PromptMessage::user("Hi"),
        ];
        let request = backend().build_request(&messages, false);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "You are helpful.");
        assert_eq!(request.messages[1].role, "user");
        assert!(!request.stream);
    }

    #[test]
    fn test_build_request_without_system() {
        let messages = vec![
            PromptMessage::system(""),
            PromptMessage::user("Hi"),
            PromptMessage::assistant("Hello!"),
        ];
        let request = backend().build_request(&messages, true);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");
        assert!(request.stream);
    }

    #[test]
    fn test_from_config() {
        let config = OllamaConfig {
            base_url: "http://127.0.0.1:9999".to_string(),
            model: "mistral".to_string(),
            temperature: 0.2,
        };
        let backend = OllamaBackend::from_config(&config);
        assert_eq!(backend.base_url, "http://127.0.0.1:9999");
        assert_eq!(backend.model, "mistral");
        assert!((backend.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_chat_response_parses_chunk() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.message.unwrap().content, "Hel");
        assert!(!parsed.done);
    }

    #[test]
    fn test_chat_response_parses_final_chunk() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"total_duration":12345}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(line).unwrap();
        assert!(parsed.done);
    }

    #[test]
    fn test_chat_response_parses_error() {
        let line = r#"{"error":"model not found"}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("model not found"));
    }
}
