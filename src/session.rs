// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session state and registry
//!
//! All per-conversation state lives here, keyed by an opaque session
//! identity: the chain bound at session start, the growing history, and the
//! context string cached on first resolution. Adapters stay stateless and
//! process-wide; the registry owns the state and hands out one async mutex
//! per session, which serializes message handling within a session without
//! coupling independent sessions to each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::chain::Chain;
use crate::history::History;

/// Opaque identity of one host-managed conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh session identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable state scoped to one session's lifetime
pub struct SessionState {
    /// Chain bound at session start, immutable for the session's lifetime
    pub chain: Chain,

    /// Conversation history, appended one completed pair per turn
    pub history: History,

    /// Context string, cached after first resolution
    pub context: Option<String>,
}

impl SessionState {
    /// Create state for a freshly started session
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            history: History::new(),
            context: None,
        }
    }

    /// Create state for a resumed session with host-reconstructed history
    pub fn resumed(chain: Chain, history: History) -> Self {
        Self {
            chain,
            history,
            context: None,
        }
    }
}

/// Map from session identity to session state.
///
/// The outer lock only guards the map and is never held across await
/// points; the per-session async mutex is the serialization gate for
/// message handling.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<SessionState>>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert state for a session, replacing any previous state
    pub fn insert(&self, session: SessionId, state: SessionState) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session, Arc::new(tokio::sync::Mutex::new(state)));
    }

    /// Get the state handle for a session, if it is active
    pub fn get(&self, session: &SessionId) -> Option<Arc<tokio::sync::Mutex<SessionState>>> {
        self.sessions.lock().unwrap().get(session).cloned()
    }

    /// Remove a session's state, returning whether it existed
    pub fn remove(&self, session: &SessionId) -> bool {
        self.sessions.lock().unwrap().remove(session).is_some()
    }

    /// Whether the session is currently active
    pub fn contains(&self, session: &SessionId) -> bool {
        self.sessions.lock().unwrap().contains_key(session)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Whether no session is active
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }
}
