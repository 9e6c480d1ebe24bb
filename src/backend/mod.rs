// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Backend trait and implementations
//!
//! Defines the abstraction layer for pluggable language-model backends: a
//! buffered invocation returning one terminal text value, and a streamed
//! invocation returning a finite, non-restartable sequence of text
//! fragments in arrival order.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::prompt::PromptMessage;

pub mod anthropic;
pub mod mock;
pub mod ollama;

pub use anthropic::AnthropicBackend;
pub use mock::{MockBackend, MockReply};
pub use ollama::OllamaBackend;

/// A finite stream of response text fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Main trait for language-model backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get the backend name (e.g., "anthropic", "ollama")
    fn name(&self) -> &str;

    /// Buffered completion: one terminal text value
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String>;

    /// Streamed completion: text fragments in arrival order. The stream is
    /// finite and cannot be restarted once consumed.
    async fn stream(&self, messages: &[PromptMessage]) -> Result<TextStream>;
}

/// Split an assembled prompt into the system text (leading system slots,
/// joined by a blank line) and the remaining conversational messages.
/// Both wire protocols here carry the system instruction out of band.
pub(crate) fn split_system(messages: &[PromptMessage]) -> (String, &[PromptMessage]) {
    let boundary = messages
        .iter()
        .position(|m| m.role != crate::prompt::PromptRole::System)
        .unwrap_or(messages.len());

    let system = messages[..boundary]
        .iter()
        .map(|m| m.content.as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (system, &messages[boundary..])
}
