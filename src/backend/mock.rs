// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock backend for testing
//!
//! Provides a configurable mock implementation of the Backend trait that
//! can be used in unit and integration tests without network access.

use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, TextStream};
use crate::error::{BackendError, Result};
use crate::prompt::PromptMessage;

/// A scripted reply for the mock backend
#[derive(Clone, Debug)]
pub enum MockReply {
    /// A terminal text value; streamed callers receive it in small chunks
    Text(String),
    /// Exact fragments to yield, in order
    Fragments(Vec<String>),
    /// Fail the call outright
    Failure(BackendError),
    /// Yield some fragments, then fail mid-stream
    FragmentsThenFail(Vec<String>, BackendError),
}

/// A mock backend with scripted replies
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    replies: Arc<Mutex<Vec<MockReply>>>,
    call_count: Arc<AtomicUsize>,
    recorded_prompts: Arc<Mutex<Vec<Vec<PromptMessage>>>>,
    stream_chunk_chars: usize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend with a single default reply
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            replies: Arc::new(Mutex::new(vec![MockReply::Text("Mock reply".to_string())])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_prompts: Arc::new(Mutex::new(vec![])),
            stream_chunk_chars: 10,
        }
    }

    /// Set a single text reply
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        *self.replies.lock().unwrap() = vec![MockReply::Text(text.into())];
        self
    }

    /// Queue scripted replies, consumed in order; the last one repeats
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        *self.replies.lock().unwrap() = replies;
        self
    }

    /// Set exact stream fragments for a single reply
    pub fn with_fragments(self, fragments: Vec<&str>) -> Self {
        *self.replies.lock().unwrap() = vec![MockReply::Fragments(
            fragments.into_iter().map(String::from).collect(),
        )];
        self
    }

    /// Fail every call with the given error
    pub fn with_failure(self, error: BackendError) -> Self {
        *self.replies.lock().unwrap() = vec![MockReply::Failure(error)];
        self
    }

    /// Override the chunk size used when streaming a `Text` reply
    pub fn with_stream_chunk_chars(mut self, chars: usize) -> Self {
        self.stream_chunk_chars = chars.max(1);
        self
    }

    /// Number of invoke/stream calls made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// All prompts this backend has received
    pub fn recorded_prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.recorded_prompts.lock().unwrap().clone()
    }

    /// The most recent prompt, if any call was made
    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.recorded_prompts.lock().unwrap().last().cloned()
    }

    fn next_reply(&self) -> MockReply {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            MockReply::Text(String::new())
        } else {
            replies[count.min(replies.len() - 1)].clone()
        }
    }

    fn record(&self, messages: &[PromptMessage]) {
        self.recorded_prompts.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        self.record(messages);
        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::Fragments(fragments) => Ok(fragments.concat()),
            MockReply::Failure(error) => Err(error.into()),
            MockReply::FragmentsThenFail(_, error) => Err(error.into()),
        }
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<TextStream> {
        self.record(messages);
        let items: Vec<Result<String>> = match self.next_reply() {
            MockReply::Text(text) => {
                let chars: Vec<char> = text.chars().collect();
                chars
                    .chunks(self.stream_chunk_chars)
                    .map(|chunk| Ok(chunk.iter().collect::<String>()))
                    .collect()
            }
            MockReply::Fragments(fragments) => fragments.into_iter().map(Ok).collect(),
            MockReply::Failure(error) => return Err(error.into()),
            MockReply::FragmentsThenFail(fragments, error) => {
                let mut items: Vec<Result<String>> = fragments.into_iter().map(Ok).collect();
                items.push(Err(error.into()));
                items
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
