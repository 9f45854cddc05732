// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote tree-commit implementation of [`TransactionalStore`].
//!
//! The backend shape is a tree-oriented version-control API: read the
//! current commit, build a new tree with deletions and insertions, commit,
//! and advance a branch pointer. A commit against a head that has moved
//! underneath us is a conflict. The adapter retries the whole
//! read-modify-write cycle a bounded number of times with short randomized
//! backoff; if any path this operation touches was changed by the
//! interfering commit, the retry is abandoned and `Conflict` surfaces so
//! the caller re-reads thread state.
//!
//! A partition move is one tree-rewrite commit that deletes every blob
//! under the old directory and recreates it under the new one. The thread
//! is never visible in two partitions, nor missing from both.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_config::model::RetryConfig;
use courier_core::error::CourierError;
use courier_core::traits::TransactionalStore;
use courier_core::types::{PathKind, TreeFile};
use rand::Rng;
use tracing::{debug, warn};

/// Minimal surface of a tree-oriented commit API.
///
/// Paths are `/`-separated and relative to the repository root. `commit`
/// must be atomic: it either advances the branch from exactly `base` to a
/// new commit containing the changes, or reports a conflict and changes
/// nothing.
#[async_trait]
pub trait TreeApi: Send + Sync {
    /// The branch head commit id.
    async fn head(&self) -> Result<String, CourierError>;

    /// The blob at `path` in `commit`, if present.
    async fn read_blob(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, CourierError>;

    /// All blob paths in `commit` starting with `prefix`.
    async fn list_prefix(&self, commit: &str, prefix: &str) -> Result<Vec<String>, CourierError>;

    /// Commit `deletes` and `writes` on top of `base`, advancing the branch.
    /// Returns the new commit id, or `None` if the branch no longer points
    /// at `base`.
    async fn commit(
        &self,
        base: &str,
        deletes: &[String],
        writes: &[TreeFile],
        message: &str,
    ) -> Result<Option<String>, CourierError>;
}

/// [`TransactionalStore`] over a [`TreeApi`] with optimistic-concurrency
/// retry.
pub struct TreeStore {
    api: Box<dyn TreeApi>,
    retry: RetryConfig,
}

impl TreeStore {
    pub fn new(api: Box<dyn TreeApi>, retry: RetryConfig) -> Self {
        Self { api, retry }
    }

    async fn backoff(&self, attempt: u32) {
        let base = self.retry.backoff_ms.max(1);
        let jitter = rand::thread_rng().gen_range(0..base);
        let delay = std::time::Duration::from_millis(base * u64::from(attempt) + jitter);
        tokio::time::sleep(delay).await;
    }

    /// Run one logical operation as an all-or-nothing commit, retrying the
    /// read-modify-write cycle on branch conflicts.
    ///
    /// `touched` must name every path whose content this operation read or
    /// assumed; if an interfering commit changed any of them, the operation
    /// is stale and surfaces `Conflict` instead of clobbering.
    async fn commit_with_retry(
        &self,
        base: String,
        touched: Vec<String>,
        deletes: Vec<String>,
        writes: Vec<TreeFile>,
        message: &str,
    ) -> Result<(), CourierError> {
        let mut base_blobs: HashMap<String, Option<Vec<u8>>> = HashMap::new();
        for path in &touched {
            base_blobs.insert(path.clone(), self.api.read_blob(&base, path).await?);
        }

        let mut current = base;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(commit) = self
                .api
                .commit(&current, &deletes, &writes, message)
                .await?
            {
                debug!(commit, attempt, message, "tree commit landed");
                return Ok(());
            }

            if attempt >= self.retry.attempts {
                warn!(attempt, message, "tree commit conflict budget exhausted");
                return Err(CourierError::Conflict { attempts: attempt });
            }

            self.backoff(attempt).await;
            let head = self.api.head().await?;
            for (path, blob) in &base_blobs {
                if self.api.read_blob(&head, path).await?.as_ref() != blob.as_ref() {
                    warn!(path, message, "interfering commit touched this thread");
                    return Err(CourierError::Conflict { attempts: attempt });
                }
            }
            // The branch moved for unrelated paths; rebase and try again.
            current = head;
        }
    }

    fn under(dir: &str, files: &[TreeFile]) -> Vec<TreeFile> {
        files
            .iter()
            .map(|file| TreeFile::new(format!("{dir}/{}", file.path), file.content.clone()))
            .collect()
    }
}

#[async_trait]
impl TransactionalStore for TreeStore {
    async fn create_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError> {
        let base = self.api.head().await?;
        let writes = Self::under(dir, files);
        let touched: Vec<String> = writes.iter().map(|f| f.path.clone()).collect();
        self.commit_with_retry(base, touched, Vec::new(), writes, &format!("create {dir}"))
            .await
    }

    async fn update_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError> {
        let base = self.api.head().await?;
        let writes = Self::under(dir, files);
        let touched: Vec<String> = writes.iter().map(|f| f.path.clone()).collect();
        self.commit_with_retry(base, touched, Vec::new(), writes, &format!("update {dir}"))
            .await
    }

    async fn move_directory(
        &self,
        old_dir: &str,
        new_dir: &str,
        updates: &[TreeFile],
    ) -> Result<(), CourierError> {
        let base = self.api.head().await?;
        let old_prefix = format!("{old_dir}/");
        let old_paths = self.api.list_prefix(&base, &old_prefix).await?;
        if old_paths.is_empty() {
            return Err(CourierError::NotFound {
                kind: "thread",
                reference: old_dir.to_string(),
            });
        }

        // Recreate every blob under the new prefix, overridden by updates,
        // and delete the old set in the same commit.
        let mut writes: Vec<TreeFile> = Vec::new();
        for path in &old_paths {
            let suffix = &path[old_prefix.len()..];
            if updates.iter().any(|u| u.path == suffix) {
                continue;
            }
            let content = self.api.read_blob(&base, path).await?.ok_or_else(|| {
                CourierError::Internal(format!("listed blob vanished: {path}"))
            })?;
            writes.push(TreeFile::new(format!("{new_dir}/{suffix}"), content));
        }
        writes.extend(Self::under(new_dir, updates));

        let mut touched = old_paths.clone();
        touched.extend(writes.iter().map(|f| f.path.clone()));
        self.commit_with_retry(
            base,
            touched,
            old_paths,
            writes,
            &format!("move {old_dir} -> {new_dir}"),
        )
        .await
    }

    async fn replace_with_directory(
        &self,
        legacy_path: &str,
        dir: &str,
        files: &[TreeFile],
    ) -> Result<(), CourierError> {
        let base = self.api.head().await?;
        let writes = Self::under(dir, files);
        let mut touched: Vec<String> = writes.iter().map(|f| f.path.clone()).collect();
        touched.push(legacy_path.to_string());
        self.commit_with_retry(
            base,
            touched,
            vec![legacy_path.to_string()],
            writes,
            &format!("migrate {legacy_path} -> {dir}"),
        )
        .await
    }

    async fn path_kind(&self, path: &str) -> Result<Option<PathKind>, CourierError> {
        let head = self.api.head().await?;
        if self.api.read_blob(&head, path).await?.is_some() {
            return Ok(Some(PathKind::File));
        }
        let children = self.api.list_prefix(&head, &format!("{path}/")).await?;
        if children.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathKind::Directory))
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, CourierError> {
        let head = self.api.head().await?;
        self.api
            .read_blob(&head, path)
            .await?
            .ok_or(CourierError::NotFound {
                kind: "file",
                reference: path.to_string(),
            })
    }

    async fn list_directory(&self, dir: &str) -> Result<Vec<(String, PathKind)>, CourierError> {
        let head = self.api.head().await?;
        let prefix = format!("{dir}/");
        let mut entries: Vec<(String, PathKind)> = Vec::new();
        for path in self.api.list_prefix(&head, &prefix).await? {
            let suffix = &path[prefix.len()..];
            let (name, kind) = match suffix.split_once('/') {
                Some((name, _)) => (name.to_string(), PathKind::Directory),
                None => (suffix.to_string(), PathKind::File),
            };
            if !entries.iter().any(|(existing, _)| *existing == name) {
                entries.push((name, kind));
            }
        }
        entries.sort();
        Ok(entries)
    }
}
