// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Adapter registry and backend selection
//!
//! Maps the configured dotted identifier `"<module-path>.<type-name>"` to a
//! registered adapter constructor, resolved exactly once at process start.
//! An identifier that cannot be resolved or instantiated is a fatal
//! configuration error; the chosen adapter then serves every session, so
//! the hot path carries no further dispatch on the configured name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{Adapter, ChatAdapter};
use crate::backend::{AnthropicBackend, OllamaBackend};
use crate::config::Settings;
use crate::error::{Error, Result};

/// Identifier of the Anthropic-backed chat adapter
pub const ANTHROPIC_ADAPTER: &str = "rapport.adapters.AnthropicChatAdapter";

/// Identifier of the Ollama-backed chat adapter
pub const OLLAMA_ADAPTER: &str = "rapport.adapters.OllamaChatAdapter";

/// Constructor for one adapter variant
pub type AdapterConstructor = fn(Arc<Settings>) -> Result<Arc<dyn Adapter>>;

/// Registry of constructible adapter variants
pub struct AdapterRegistry {
    entries: HashMap<String, AdapterConstructor>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry with the built-in adapter variants registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ANTHROPIC_ADAPTER, build_anthropic);
        registry.register(OLLAMA_ADAPTER, build_ollama);
        registry
    }

    /// Register an adapter constructor under a dotted identifier
    pub fn register(&mut self, identifier: impl Into<String>, constructor: AdapterConstructor) {
        self.entries.insert(identifier.into(), constructor);
    }

    /// Registered identifiers, sorted for stable diagnostics
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve the configured identifier and instantiate the adapter.
    ///
    /// Called once at process start; every failure here means the process
    /// cannot start.
    pub fn resolve(&self, settings: Arc<Settings>) -> Result<Arc<dyn Adapter>> {
        settings.validate()?;

        let identifier = settings.adapter.trim().to_string();
        let identifier = identifier.as_str();
        let (module_path, type_name) = identifier
            .rsplit_once('.')
            .ok_or_else(|| Error::Config(format!("malformed adapter identifier '{identifier}'")))?;

        let constructor = self.entries.get(identifier).ok_or_else(|| {
            Error::Config(format!(
                "unknown adapter type '{type_name}' in module '{module_path}'; \
                 registered adapters: {}",
                self.identifiers().join(", ")
            ))
        })?;

        let adapter = constructor(settings)?;
        tracing::info!(
            target: "rapport.registry",
            adapter = identifier,
            "resolved adapter"
        );
        Ok(adapter)
    }
}

fn build_anthropic(settings: Arc<Settings>) -> Result<Arc<dyn Adapter>> {
    let backend = AnthropicBackend::from_config(&settings.backends.anthropic)?;
    Ok(Arc::new(ChatAdapter::new(settings, Arc::new(backend))?))
}

fn build_ollama(settings: Arc<Settings>) -> Result<Arc<dyn Adapter>> {
    let backend = OllamaBackend::from_config(&settings.backends.ollama);
    Ok(Arc::new(ChatAdapter::new(settings, Arc::new(backend))?))
}
