// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context providers
//!
//! A context provider produces the supplementary text injected into the
//! prompt ahead of conversation history. Two strategies satisfy the same
//! contract: an eager provider that reads a fixed file set once at process
//! startup and shares it read-only across sessions, and a lazy provider
//! that reads on a session's first message (the session caches the result,
//! so a source changing mid-session is never observed).

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::session::SessionId;

/// Produces the context string for a session
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Compute the context for the given session. Callers cache the result
    /// per session; implementations must be pure with respect to re-reads.
    async fn fetch(&self, session: &SessionId) -> Result<String>;
}

/// Provider for configurations without a context source
#[derive(Debug, Default)]
pub struct NullContext;

#[async_trait]
impl ContextProvider for NullContext {
    async fn fetch(&self, _session: &SessionId) -> Result<String> {
        Ok(String::new())
    }
}

/// Eager provider: the source directory is read once at construction
/// (process startup) and the result shared by every session.
#[derive(Debug)]
pub struct StaticContext {
    text: String,
}

impl StaticContext {
    /// Load all text files under `dir`. An unreadable source here is a
    /// startup failure rather than a per-turn one.
    pub fn load(dir: &Path) -> Result<Self> {
        let text = read_directory(dir)?;
        tracing::debug!(
            target: "rapport.context",
            dir = %dir.display(),
            bytes = text.len(),
            "loaded static context"
        );
        Ok(Self { text })
    }

    /// Wrap an already-materialized context string
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn fetch(&self, _session: &SessionId) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Lazy provider: reads the source directory when a session first asks.
#[derive(Debug)]
pub struct DirectoryContext {
    dir: PathBuf,
}

impl DirectoryContext {
    /// Create a provider over `dir`; nothing is read until [`fetch`].
    ///
    /// [`fetch`]: ContextProvider::fetch
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContextProvider for DirectoryContext {
    async fn fetch(&self, session: &SessionId) -> Result<String> {
        let text = read_directory(&self.dir)?;
        tracing::debug!(
            target: "rapport.context",
            session = %session,
            dir = %self.dir.display(),
            bytes = text.len(),
            "read lazy context for session"
        );
        Ok(text)
    }
}

/// Concatenate every file under `dir`, recursively, joined by a blank line.
///
/// Files are sorted lexically by full path so the result is reproducible
/// regardless of the filesystem's enumeration order.
fn read_directory(dir: &Path) -> Result<String> {
    if !dir.is_dir() {
        return Err(Error::ContextLoad(format!(
            "context source '{}' is not a readable directory",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            Error::ContextLoad(format!("failed to enumerate '{}': {e}", dir.display()))
        })?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut sections = Vec::with_capacity(paths.len());
    for path in &paths {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ContextLoad(format!("failed to read '{}': {e}", path.display()))
        })?;
        sections.push(content);
    }
    Ok(sections.join("\n\n"))
}
