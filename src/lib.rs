// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Rapport - session-scoped chat adapter for conversational UI runtimes.
//!
//! This crate bridges a host chat-UI runtime to a pluggable language-model
//! backend. For each session it assembles a prompt from a template, injects
//! context and prior turns, invokes the backend (streamed or buffered), and
//! accumulates the conversation history for the session's lifetime.
//!
//! Architecture highlights:
//! - `adapter`: the session lifecycle contract, the chat adapter, and the
//!   registry that resolves the configured adapter once at startup
//! - `backend`: the invoke/stream abstraction and implementations
//!   (Anthropic, Ollama, and a scripted mock for tests)
//! - `chain`: per-session binding of prompt assembly to a backend
//! - `streaming`: the host message sink seam and fragment relay
//! - `session`: per-session state and the registry that owns it
//! - `context`, `prompt`, `history`: the prompt's three input sources
//!
//! The host owns message transport, rendering, and thread persistence; it
//! drives the [`adapter::Adapter`] hooks and supplies a
//! [`streaming::MessageSink`] per outgoing message.

pub mod adapter;
pub mod backend;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod prompt;
pub mod session;
pub mod streaming;

pub use error::{BackendError, Error, Result};
