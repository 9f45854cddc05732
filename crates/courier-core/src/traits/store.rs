// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transactional storage adapter trait.
//!
//! Each mutating method is a single all-or-nothing unit: no reader may ever
//! observe a partially populated directory, a thread present in two
//! partitions, or a missing thread mid-move. Implementations that commit
//! optimistically retry internally and surface `CourierError::Conflict`
//! only after exhausting their retry budget.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{PathKind, TreeFile};

/// Adapter for atomic multi-file commits against a concrete backend
/// (local filesystem, or a remote tree-oriented commit API).
///
/// All paths are relative to the backend's storage root and use `/`
/// separators regardless of platform.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Write a new thread's entire file set under `dir` as one atomic unit.
    async fn create_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError>;

    /// Rewrite only the named files under `dir`, leaving others untouched.
    async fn update_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError>;

    /// Move every file under `old_dir` to `new_dir` and apply `updates`
    /// (paths relative to `new_dir`) in the same atomic unit. Used when a
    /// status change crosses a partition boundary.
    async fn move_directory(
        &self,
        old_dir: &str,
        new_dir: &str,
        updates: &[TreeFile],
    ) -> Result<(), CourierError>;

    /// Replace the legacy single file at `legacy_path` with the directory
    /// `dir` containing `files`, atomically. Used by format migration.
    async fn replace_with_directory(
        &self,
        legacy_path: &str,
        dir: &str,
        files: &[TreeFile],
    ) -> Result<(), CourierError>;

    /// What, if anything, exists at `path`.
    async fn path_kind(&self, path: &str) -> Result<Option<PathKind>, CourierError>;

    /// Read one file's bytes.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, CourierError>;

    /// Entry names directly under `dir` with their kinds. An absent
    /// directory lists as empty.
    async fn list_directory(&self, dir: &str) -> Result<Vec<(String, PathKind)>, CourierError>;
}
