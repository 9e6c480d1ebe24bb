// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Relays chain output to the host runtime's outgoing-message sink: buffered
//! replies as a single complete write, streamed replies as one visible
//! update per fragment in arrival order. Cancellation is an explicit signal
//! rather than implicit task teardown, so the abort contract is testable in
//! isolation; an aborted or failed stream is a failed turn and the partial
//! visible content is never committed anywhere else.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::backend::TextStream;
use crate::error::{BackendError, Result};

/// Opaque handle to one outgoing message held by the host sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(pub u64);

/// Host-supplied sink for outgoing messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Open a new outgoing message with the given initial text
    async fn open(&self, text: &str) -> Result<MessageHandle>;

    /// Append a fragment; the message's visible content must update
    async fn append(&self, handle: MessageHandle, fragment: &str) -> Result<()>;

    /// Mark the message complete
    async fn finalize(&self, handle: MessageHandle) -> Result<()>;
}

/// Create a linked abort handle/token pair for cancelling a streamed reply
pub fn abort_pair() -> (AbortHandle, AbortToken) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortToken { rx })
}

/// Host-side handle that cancels an in-flight streamed reply
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Signal the paired token. Idempotent.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// The receiving side of an abort signal
#[derive(Debug, Clone)]
pub struct AbortToken {
    rx: watch::Receiver<bool>,
}

impl AbortToken {
    /// Whether the abort was already signalled
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the abort is signalled. If the handle is dropped
    /// without aborting, this never resolves.
    pub async fn aborted(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Relays chain output to a host message sink
pub struct ResponseStreamer<'a> {
    sink: &'a dyn MessageSink,
}

impl<'a> ResponseStreamer<'a> {
    /// Create a streamer over the given sink
    pub fn new(sink: &'a dyn MessageSink) -> Self {
        Self { sink }
    }

    /// Emit one complete buffered reply
    pub async fn send(&self, text: &str) -> Result<()> {
        let handle = self.sink.open(text).await?;
        self.sink.finalize(handle).await
    }

    /// Relay a fragment stream: open empty, append each fragment in arrival
    /// order, finalize on completion. Returns the concatenated final content.
    pub async fn relay(&self, stream: TextStream) -> Result<String> {
        self.relay_inner(stream, None).await
    }

    /// Like [`relay`], but stops with [`BackendError::StreamAborted`] when
    /// the token fires. Partial visible content may remain on the sink; it
    /// is not finalized and the turn counts as failed.
    ///
    /// [`relay`]: ResponseStreamer::relay
    pub async fn relay_with_abort(&self, stream: TextStream, abort: AbortToken) -> Result<String> {
        self.relay_inner(stream, Some(abort)).await
    }

    async fn relay_inner(
        &self,
        mut stream: TextStream,
        abort: Option<AbortToken>,
    ) -> Result<String> {
        let handle = self.sink.open("").await?;
        let mut content = String::new();
        let mut fragment_count = 0usize;
        let mut abort = abort;

        loop {
            let next = match abort.as_mut() {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.aborted() => {
                            tracing::debug!(
                                target: "rapport.streaming",
                                fragments = fragment_count,
                                "stream aborted mid-flight"
                            );
                            return Err(BackendError::StreamAborted.into());
                        }
                        item = stream.next() => item,
                    }
                }
                None => stream.next().await,
            };

            match next {
                None => break,
                Some(fragment) => {
                    let fragment = fragment?;
                    content.push_str(&fragment);
                    self.sink.append(handle, &fragment).await?;
                    fragment_count += 1;
                }
            }
        }

        if content.is_empty() {
            return Err(BackendError::EmptyResponse.into());
        }
        self.sink.finalize(handle).await?;
        tracing::debug!(
            target: "rapport.streaming",
            fragments = fragment_count,
            chars = content.len(),
            "stream relayed to completion"
        );
        Ok(content)
    }
}

/// An in-memory sink that records every visible update, for hosts that
/// buffer output themselves and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkState>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    messages: Vec<SinkMessage>,
    updates: Vec<String>,
}

/// One message accumulated by a [`MemorySink`]
#[derive(Debug, Clone)]
pub struct SinkMessage {
    /// Current visible content
    pub content: String,
    /// Whether the message was finalized
    pub finalized: bool,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in open order
    pub fn messages(&self) -> Vec<SinkMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    /// Final contents of finalized messages, in open order
    pub fn finalized_contents(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.finalized)
            .map(|m| m.content.clone())
            .collect()
    }

    /// The visible content snapshot recorded after each append
    pub fn visible_updates(&self) -> Vec<String> {
        self.inner.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn open(&self, text: &str) -> Result<MessageHandle> {
        let mut state = self.inner.lock().unwrap();
        state.messages.push(SinkMessage {
            content: text.to_string(),
            finalized: false,
        });
        Ok(MessageHandle((state.messages.len() - 1) as u64))
    }

    async fn append(&self, handle: MessageHandle, fragment: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let index = handle.0 as usize;
        let message = state.messages.get_mut(index).ok_or_else(|| {
            crate::error::Error::Session(format!("unknown message handle {}", handle.0))
        })?;
        message.content.push_str(fragment);
        let snapshot = message.content.clone();
        state.updates.push(snapshot);
        Ok(())
    }

    async fn finalize(&self, handle: MessageHandle) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let index = handle.0 as usize;
        let message = state.messages.get_mut(index).ok_or_else(|| {
            crate::error::Error::Session(format!("unknown message handle {}", handle.0))
        })?;
        message.finalized = true;
        Ok(())
    }
}
