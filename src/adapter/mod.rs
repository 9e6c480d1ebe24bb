// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session lifecycle adapters
//!
//! The Adapter trait is the contract between the host chat-UI runtime and
//! this crate: four lifecycle hooks plus the starter-suggestion query. One
//! adapter instance serves the whole process and is shared by all sessions,
//! so implementations hold no per-conversation state; that lives in the
//! session registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::SessionId;
use crate::streaming::MessageSink;

pub mod chat;
pub mod registry;

pub use chat::ChatAdapter;
pub use registry::AdapterRegistry;

/// A suggested opening message offered to the user before the first turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Starter {
    /// Short label shown in the UI
    pub label: String,

    /// Message submitted when the starter is picked
    pub message: String,
}

/// A prior conversation handed back by the host on resume.
///
/// The host owns thread persistence; it passes whatever turn pairs it
/// reconstructed, and the adapter re-enters the active state with them.
#[derive(Debug, Clone, Default)]
pub struct ResumedThread {
    /// Host-side identity of the prior thread
    pub thread_id: String,

    /// Completed (user, assistant) pairs in conversational order
    pub turns: Vec<(String, String)>,
}

/// Session lifecycle contract implemented by every adapter variant.
///
/// The host guarantees hook ordering per session: `on_chat_start` (or
/// `on_chat_resume`) before any `on_message`, no messages after
/// `on_chat_end`, and at most one in-flight `on_message` per session.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// A session entered the active state
    async fn on_chat_start(&self, session: SessionId) -> Result<()> {
        let _ = session;
        Ok(())
    }

    /// Handle one user message for an active session
    async fn on_message(
        &self,
        session: SessionId,
        content: &str,
        sink: &dyn MessageSink,
    ) -> Result<()>;

    /// A prior thread re-entered the active state. The base contract is a
    /// no-op; implementations may rebuild session state from the thread.
    async fn on_chat_resume(&self, session: SessionId, thread: &ResumedThread) -> Result<()> {
        let _ = (session, thread);
        Ok(())
    }

    /// A session ended; release everything scoped to it
    async fn on_chat_end(&self, session: SessionId) -> Result<()> {
        let _ = session;
        Ok(())
    }

    /// Configured starter suggestions; empty when none are configured
    fn starters(&self) -> Vec<Starter> {
        Vec::new()
    }
}
