// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for rapport
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for rapport operations
#[derive(Error, Debug)]
pub enum Error {
    /// Backend-related errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration errors (fatal at process startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Context source could not be read
    #[error("Context load error: {0}")]
    ContextLoad(String),

    /// Session lifecycle contract violations
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Backend-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the backend
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the backend
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Backend returned an error
    #[error("Backend error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Backend produced no content
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// Timeout waiting for the backend
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),

    /// Stream was cancelled before completion
    #[error("Stream aborted before completion")]
    StreamAborted,
}

/// Result type alias for rapport operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err.to_string())
    }
}

impl Error {
    /// Whether this error left the session usable for a subsequent message.
    ///
    /// Per-turn failures (backend and context-load errors) leave the session
    /// active; everything else indicates misconfiguration or contract misuse.
    pub fn is_turn_failure(&self) -> bool {
        matches!(self, Error::Backend(_) | Error::ContextLoad(_))
    }
}
