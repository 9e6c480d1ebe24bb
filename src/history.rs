// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session-scoped conversation history
//!
//! An ordered, append-only log of user/assistant turns. Turns are only ever
//! appended as a completed (user, assistant) pair, after a response has been
//! fully obtained; failed turns never reach the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn's author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
}

/// A single message in the conversation, immutable after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn
    pub role: Role,

    /// Text content
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Ordered conversation history for one session
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history seeded from existing (user, assistant) pairs,
    /// e.g. when the host resumes a prior thread.
    pub fn from_pairs<I, U, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, A)>,
        U: Into<String>,
        A: Into<String>,
    {
        let mut history = Self::new();
        for (user, assistant) in pairs {
            history.record(user, assistant);
        }
        history
    }

    /// Append one completed exchange. The pair shape is the only write
    /// operation; turns are never inserted individually or out of order.
    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Turn::user(user));
        self.turns.push(Turn::assistant(assistant));
    }

    /// All turns in conversational order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of completed (user, assistant) pairs
    pub fn pairs(&self) -> usize {
        self.turns.len() / 2
    }

    /// Total number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent assistant response, if any
    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }
}
