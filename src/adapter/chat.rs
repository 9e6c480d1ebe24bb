// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat adapter: the session lifecycle controller
//!
//! Implements the full lifecycle over any backend: a chain is bound per
//! session at start, each message resolves context (cached per session),
//! assembles the prompt with prior history, runs the chain streamed or
//! buffered, relays the reply to the host sink, and commits the completed
//! turn pair. History is only written after a response has been fully
//! obtained; a failed turn leaves it untouched and the session active.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{Adapter, ResumedThread, Starter};
use crate::backend::Backend;
use crate::chain::Chain;
use crate::config::Settings;
use crate::context::{ContextProvider, DirectoryContext, NullContext, StaticContext};
use crate::error::{Error, Result};
use crate::history::History;
use crate::prompt::{PromptAssembler, PromptInputs};
use crate::session::{SessionId, SessionRegistry, SessionState};
use crate::streaming::{MessageSink, ResponseStreamer};

/// Lifecycle controller binding one backend to the session registry
pub struct ChatAdapter {
    settings: Arc<Settings>,
    backend: Arc<dyn Backend>,
    context: Arc<dyn ContextProvider>,
    sessions: SessionRegistry,
}

impl ChatAdapter {
    /// Create an adapter over the given backend. Builds the context
    /// provider from settings; an eager source is read here, so an
    /// unreadable one fails at startup.
    pub fn new(settings: Arc<Settings>, backend: Arc<dyn Backend>) -> Result<Self> {
        let context = build_context_provider(&settings)?;
        Ok(Self {
            settings,
            backend,
            context,
            sessions: SessionRegistry::new(),
        })
    }

    /// Replace the context provider, for hosts with their own sourcing
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = provider;
        self
    }

    /// Number of currently active sessions
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn build_chain(&self) -> Chain {
        Chain::new(
            PromptAssembler::new(self.settings.templates.clone()),
            self.backend.clone(),
            Duration::from_secs(self.settings.request_timeout_secs),
        )
    }
}

fn build_context_provider(settings: &Settings) -> Result<Arc<dyn ContextProvider>> {
    match &settings.context.dir {
        None => Ok(Arc::new(NullContext)),
        Some(dir) if settings.context.eager => Ok(Arc::new(StaticContext::load(dir)?)),
        Some(dir) => Ok(Arc::new(DirectoryContext::new(dir.clone()))),
    }
}

#[async_trait]
impl Adapter for ChatAdapter {
    async fn on_chat_start(&self, session: SessionId) -> Result<()> {
        self.sessions
            .insert(session, SessionState::new(self.build_chain()));
        tracing::info!(
            target: "rapport.adapter",
            session = %session,
            backend = self.backend.name(),
            "session started"
        );
        Ok(())
    }

    async fn on_chat_resume(&self, session: SessionId, thread: &ResumedThread) -> Result<()> {
        let history = History::from_pairs(thread.turns.iter().cloned());
        let pairs = history.pairs();
        self.sessions
            .insert(session, SessionState::resumed(self.build_chain(), history));
        tracing::info!(
            target: "rapport.adapter",
            session = %session,
            thread = %thread.thread_id,
            restored_pairs = pairs,
            "session resumed"
        );
        Ok(())
    }

    async fn on_chat_end(&self, session: SessionId) -> Result<()> {
        if self.sessions.remove(&session) {
            tracing::info!(target: "rapport.adapter", session = %session, "session ended");
        } else {
            tracing::warn!(
                target: "rapport.adapter",
                session = %session,
                "end requested for unknown session"
            );
        }
        Ok(())
    }

    async fn on_message(
        &self,
        session: SessionId,
        content: &str,
        sink: &dyn MessageSink,
    ) -> Result<()> {
        let entry = self
            .sessions
            .get(&session)
            .ok_or_else(|| Error::Session(format!("no active session {session}")))?;

        // Serialization gate: at most one in-flight message per session.
        let mut state = entry.lock().await;

        let context = match &state.context {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self.context.fetch(&session).await?;
                state.context = Some(fetched.clone());
                fetched
            }
        };

        let inputs = PromptInputs {
            system_prompt: self.settings.system_prompt.clone(),
            context,
            history: state.history.turns().to_vec(),
            content: content.to_string(),
        };

        let streamer = ResponseStreamer::new(sink);
        let result = if self.settings.stream_response {
            match state.chain.stream(&inputs).await {
                Ok(stream) => streamer.relay(stream).await,
                Err(e) => Err(e),
            }
        } else {
            match state.chain.invoke(&inputs).await {
                Ok(text) => {
                    streamer.send(&text).await?;
                    Ok(text)
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(reply) => {
                state.history.record(content, reply);
                tracing::debug!(
                    target: "rapport.adapter",
                    session = %session,
                    pairs = state.history.pairs(),
                    "turn committed"
                );
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    target: "rapport.adapter",
                    session = %session,
                    error = %error,
                    "turn failed; history unchanged"
                );
                Err(error)
            }
        }
    }

    fn starters(&self) -> Vec<Starter> {
        self.settings.starters.clone()
    }
}
