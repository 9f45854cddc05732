// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier dispatch engine.

use thiserror::Error;

/// The primary error type used across all Courier crates.
///
/// Propagation policy: `Validation`, `NotFound`, and `InvalidTransition`
/// surface synchronously to the caller and are never retried. `Conflict` is
/// produced only after the transactional backend has exhausted its internal
/// retry budget. `Format` errors during a listing are caught per-thread and
/// logged; during a targeted read they surface directly.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Missing or malformed caller input (e.g. a request with no intent).
    #[error("validation error: {0}")]
    Validation(String),

    /// An unknown thread ref, message ref, or resource locator.
    #[error("{kind} not found: {reference}")]
    NotFound {
        /// What kind of entity was looked up ("thread", "message", "resource").
        kind: &'static str,
        /// The reference that failed to resolve.
        reference: String,
    },

    /// A status change not permitted by the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::types::Status,
        to: crate::types::Status,
    },

    /// Optimistic-concurrency retries exhausted at the storage layer.
    #[error("commit conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// Content exceeds a hard size ceiling even after externalization.
    #[error("size limit exceeded: {actual} bytes > {limit} byte ceiling")]
    SizeLimit { limit: u64, actual: u64 },

    /// A stored thread could not be parsed.
    #[error("unparseable thread data at {path}: {detail}")]
    Format { path: String, detail: String },

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend I/O or API errors (filesystem, remote tree commits).
    #[error("backend error: {source}")]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wrap an arbitrary backend failure.
    pub fn backend<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(source),
        }
    }

    /// Shorthand for a thread-level not-found error.
    pub fn thread_not_found(reference: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "thread",
            reference: reference.into(),
        }
    }
}

impl From<std::io::Error> for CourierError {
    fn from(err: std::io::Error) -> Self {
        Self::backend(err)
    }
}
