// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt assembly
//!
//! Deterministic construction of the ordered message sequence sent to a
//! backend: system instruction, context, prior history, current user input,
//! in that fixed order. Template strings may carry `{placeholder}`
//! substitutions resolved from [`PromptInputs`]; any unresolved placeholder
//! is a configuration error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::history::{Role, Turn};

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Placeholder names a template may reference
const SUPPORTED_PLACEHOLDERS: &[&str] = &["system_prompt", "context", "content"];

/// Ephemeral inputs for one prompt build; constructed fresh per message
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// System instruction from configuration
    pub system_prompt: String,

    /// Context string resolved for this session
    pub context: String,

    /// Prior turns in conversational order
    pub history: Vec<Turn>,

    /// Current user message
    pub content: String,
}

/// Role of an assembled prompt message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Instruction to the model
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

/// One entry in the assembled prompt sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    /// Who the message is attributed to
    pub role: PromptRole,

    /// Rendered text
    pub content: String,
}

impl PromptMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for PromptMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => PromptMessage::user(&turn.content),
            Role::Assistant => PromptMessage::assistant(&turn.content),
        }
    }
}

/// Template strings for the three rendered prompt slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System instruction slot
    #[serde(default = "default_system_template")]
    pub system: String,

    /// Context slot
    #[serde(default = "default_context_template")]
    pub context: String,

    /// Current user input slot
    #[serde(default = "default_user_template")]
    pub user: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: default_system_template(),
            context: default_context_template(),
            user: default_user_template(),
        }
    }
}

impl PromptTemplate {
    /// Check every slot template against the supported placeholder names.
    /// Run at startup so malformed templates fail before any session exists.
    pub fn validate(&self) -> Result<()> {
        for template in [&self.system, &self.context, &self.user] {
            for caps in PLACEHOLDER_PATTERN.captures_iter(template) {
                let name = &caps[1];
                if !SUPPORTED_PLACEHOLDERS.contains(&name) {
                    return Err(Error::Config(format!(
                        "unresolved placeholder '{{{name}}}' in prompt template"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_system_template() -> String {
    "{system_prompt}".to_string()
}

fn default_context_template() -> String {
    "{context}".to_string()
}

fn default_user_template() -> String {
    "{content}".to_string()
}

/// Builds the ordered prompt sequence from a template and per-message inputs
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl PromptAssembler {
    /// Create an assembler for the given template
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    /// Assemble the full message sequence for one backend call.
    ///
    /// Slot order is fixed: system instruction, context, the history turns
    /// interleaved in their stored order, then the current user input.
    pub fn assemble(&self, inputs: &PromptInputs) -> Result<Vec<PromptMessage>> {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("system_prompt", inputs.system_prompt.as_str()),
            ("context", inputs.context.as_str()),
            ("content", inputs.content.as_str()),
        ]);

        let mut messages = Vec::with_capacity(inputs.history.len() + 3);
        messages.push(PromptMessage::system(render(&self.template.system, &vars)?));
        messages.push(PromptMessage::system(render(
            &self.template.context,
            &vars,
        )?));
        messages.extend(inputs.history.iter().map(PromptMessage::from));
        messages.push(PromptMessage::user(render(&self.template.user, &vars)?));
        Ok(messages)
    }
}

/// Substitute `{name}` placeholders from `vars`; any unknown name is an error.
fn render(template: &str, vars: &HashMap<&str, &str>) -> Result<String> {
    let mut unresolved: Option<String> = None;
    let rendered = PLACEHOLDER_PATTERN.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => (*value).to_string(),
            None => {
                unresolved.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = unresolved {
        return Err(Error::Config(format!(
            "unresolved placeholder '{{{name}}}' in prompt template"
        )));
    }
    Ok(rendered.into_owned())
}
