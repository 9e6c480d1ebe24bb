// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chain execution
//!
//! A Chain binds the prompt assembler to a backend for one session. It is
//! constructed at session start and immutable afterwards; neither the
//! template nor the backend changes mid-session. The chain is stateless
//! with respect to history: every call receives fresh [`PromptInputs`].

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, TextStream};
use crate::error::{BackendError, Result};
use crate::prompt::{PromptAssembler, PromptInputs};

/// The bound composition of prompt assembly and backend invocation
pub struct Chain {
    assembler: PromptAssembler,
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl Chain {
    /// Bind an assembler to a backend with the given call timeout
    pub fn new(assembler: PromptAssembler, backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self {
            assembler,
            backend,
            timeout,
        }
    }

    /// Backend name, for diagnostics
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Buffered execution: one terminal text value.
    ///
    /// Times out after the configured bound; an empty reply is a backend
    /// failure, never an empty success.
    pub async fn invoke(&self, inputs: &PromptInputs) -> Result<String> {
        let messages = self.assembler.assemble(inputs)?;
        tracing::debug!(
            target: "rapport.chain",
            backend = self.backend.name(),
            prompt_messages = messages.len(),
            "invoking chain"
        );

        let reply = tokio::time::timeout(self.timeout, self.backend.invoke(&messages))
            .await
            .map_err(|_| BackendError::Timeout)??;

        if reply.is_empty() {
            return Err(BackendError::EmptyResponse.into());
        }
        Ok(reply)
    }

    /// Streamed execution: text fragments in arrival order.
    ///
    /// The timeout bounds both the initial call and the wait for each
    /// fragment, so a stalled stream surfaces as a backend failure instead
    /// of hanging the session.
    pub async fn stream(&self, inputs: &PromptInputs) -> Result<TextStream> {
        let messages = self.assembler.assemble(inputs)?;
        tracing::debug!(
            target: "rapport.chain",
            backend = self.backend.name(),
            prompt_messages = messages.len(),
            "streaming chain"
        );

        let mut inner = tokio::time::timeout(self.timeout, self.backend.stream(&messages))
            .await
            .map_err(|_| BackendError::Timeout)??;

        let timeout = self.timeout;
        let bounded = async_stream::try_stream! {
            loop {
                match tokio::time::timeout(timeout, inner.next()).await {
                    Err(_) => Err(BackendError::Timeout)?,
                    Ok(None) => break,
                    Ok(Some(fragment)) => yield fragment?,
                }
            }
        };
        Ok(Box::pin(bounded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::error::Error;
    use crate::history::Turn;
    use crate::prompt::{PromptMessage, PromptRole};
    use async_trait::async_trait;

    fn inputs(content: &str) -> PromptInputs {
        PromptInputs {
            system_prompt: "You are helpful.".to_string(),
            context: "Doc A text".to_string(),
            history: vec![],
            content: content.to_string(),
        }
    }

    fn chain_with(backend: MockBackend) -> Chain {
        Chain::new(
            PromptAssembler::default(),
            Arc::new(backend),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_invoke_returns_reply() {
        let backend = MockBackend::new().with_reply("Hello!");
        let chain = chain_with(backend.clone());

        assert_eq!(chain.invoke(&inputs("Hi")).await.unwrap(), "Hello!");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invoke_passes_assembled_prompt() {
        let backend = MockBackend::new().with_reply("ok");
        let chain = chain_with(backend.clone());
        chain.invoke(&inputs("Hi")).await.unwrap();

        let prompt = backend.last_prompt().unwrap();
        assert_eq!(prompt[0], PromptMessage::system("You are helpful."));
        assert_eq!(prompt[1], PromptMessage::system("Doc A text"));
        assert_eq!(prompt[2], PromptMessage::user("Hi"));
    }

    #[tokio::test]
    async fn test_invoke_includes_history() {
        let backend = MockBackend::new().with_reply("ok");
        let chain = chain_with(backend.clone());

        let mut turn_inputs = inputs("again");
        turn_inputs.history.push(Turn::user("first"));
        turn_inputs.history.push(Turn::assistant("reply"));
        chain.invoke(&turn_inputs).await.unwrap();

        let prompt = backend.last_prompt().unwrap();
        assert_eq!(prompt.len(), 5);
        assert_eq!(prompt[3].role, PromptRole::Assistant);
    }

    #[tokio::test]
    async fn test_invoke_empty_reply_is_backend_error() {
        let backend = MockBackend::new().with_reply("");
        let chain = chain_with(backend);

        let err = chain.invoke(&inputs("Hi")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Backend(BackendError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_invoke_propagates_backend_failure() {
        let backend = MockBackend::new().with_failure(BackendError::RateLimited(5));
        let chain = chain_with(backend);

        let err = chain.invoke(&inputs("Hi")).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::RateLimited(5))));
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order() {
        let backend = MockBackend::new().with_fragments(vec!["Hel", "lo", "!"]);
        let chain = chain_with(backend);

        let mut stream = chain.stream(&inputs("Hi")).await.unwrap();
        let mut collected = Vec::new();
        while let Some(fragment) = stream.next().await {
            collected.push(fragment.unwrap());
        }
        assert_eq!(collected, vec!["Hel", "lo", "!"]);
    }

    #[tokio::test]
    async fn test_stream_propagates_mid_stream_failure() {
        let backend = MockBackend::new().with_replies(vec![MockReply::FragmentsThenFail(
            vec!["Hel".to_string()],
            BackendError::StreamError("reset".to_string()),
        )]);
        let chain = chain_with(backend);

        let mut stream = chain.stream(&inputs("Hi")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "Hel");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        struct StallingBackend;

        #[async_trait]
        impl Backend for StallingBackend {
            fn name(&self) -> &str {
                "stalling"
            }

            async fn invoke(&self, _messages: &[PromptMessage]) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok("too late".to_string())
            }

            async fn stream(&self, _messages: &[PromptMessage]) -> Result<TextStream> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Box::pin(futures::stream::empty()))
            }
        }

        let chain = Chain::new(
            PromptAssembler::default(),
            Arc::new(StallingBackend),
            Duration::from_millis(20),
        );

        let err = chain.invoke(&inputs("Hi")).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Timeout)));

        let err = chain.stream(&inputs("Hi")).await.err().unwrap();
        assert!(matches!(err, Error::Backend(BackendError::Timeout)));
    }

    #[tokio::test]
    async fn test_stream_fragment_timeout() {
        struct StallingFragmentBackend;

        #[async_trait]
        impl Backend for StallingFragmentBackend {
            fn name(&self) -> &str {
                "stalling-fragment"
            }

            async fn invoke(&self, _messages: &[PromptMessage]) -> Result<String> {
                Ok("ok".to_string())
            }

            async fn stream(&self, _messages: &[PromptMessage]) -> Result<TextStream> {
                Ok(Box::pin(async_stream::try_stream! {
                    yield "first".to_string();
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    yield "never".to_string();
                }))
            }
        }

        let chain = Chain::new(
            PromptAssembler::default(),
            Arc::new(StallingFragmentBackend),
            Duration::from_millis(20),
        );

        let mut stream = chain.stream(&inputs("Hi")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "first");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Timeout)));
    }

    #[tokio::test]
    async fn test_unresolved_placeholder_is_config_error() {
        let backend = MockBackend::new();
        let chain = Chain::new(
            PromptAssembler::new(crate::prompt::PromptTemplate {
                user: "{missing}".to_string(),
                ..Default::default()
            }),
            Arc::new(backend.clone()),
            Duration::from_secs(5),
        );

        let err = chain.invoke(&inputs("Hi")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        // The backend must never be reached with a malformed prompt.
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_backend_name() {
        let chain = chain_with(MockBackend::new());
        assert_eq!(chain.backend_name(), "mock");
    }
}
