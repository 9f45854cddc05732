// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory tree API for deterministic backend testing.
//!
//! `MemoryTreeApi` implements the tree-commit surface with a
//! compare-and-swap head, so tests can exercise the optimistic-concurrency
//! retry path. `inject_conflicts(n)` makes the next `n` commits fail as if
//! the branch had moved, regardless of the base.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::error::CourierError;
use courier_core::types::TreeFile;
use courier_storage::tree_backend::TreeApi;
use tokio::sync::Mutex;

type Tree = BTreeMap<String, Vec<u8>>;

struct Repo {
    head: String,
    commits: BTreeMap<String, Tree>,
    counter: u64,
}

/// Shareable in-memory tree repository.
#[derive(Clone)]
pub struct MemoryTreeApi {
    repo: Arc<Mutex<Repo>>,
    forced_conflicts: Arc<AtomicU32>,
}

impl Default for MemoryTreeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTreeApi {
    pub fn new() -> Self {
        let mut commits = BTreeMap::new();
        commits.insert("c0".to_string(), Tree::new());
        Self {
            repo: Arc::new(Mutex::new(Repo {
                head: "c0".to_string(),
                commits,
                counter: 0,
            })),
            forced_conflicts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next `n` commit attempts fail with a branch conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// All paths at the current head, for assertions.
    pub async fn paths(&self) -> Vec<String> {
        let repo = self.repo.lock().await;
        repo.commits[&repo.head].keys().cloned().collect()
    }
}

#[async_trait]
impl TreeApi for MemoryTreeApi {
    async fn head(&self) -> Result<String, CourierError> {
        Ok(self.repo.lock().await.head.clone())
    }

    async fn read_blob(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, CourierError> {
        let repo = self.repo.lock().await;
        let tree = repo.commits.get(commit).ok_or_else(|| {
            CourierError::Internal(format!("unknown commit {commit}"))
        })?;
        Ok(tree.get(path).cloned())
    }

    async fn list_prefix(&self, commit: &str, prefix: &str) -> Result<Vec<String>, CourierError> {
        let repo = self.repo.lock().await;
        let tree = repo.commits.get(commit).ok_or_else(|| {
            CourierError::Internal(format!("unknown commit {commit}"))
        })?;
        Ok(tree
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        base: &str,
        deletes: &[String],
        writes: &[TreeFile],
        _message: &str,
    ) -> Result<Option<String>, CourierError> {
        if self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }

        let mut repo = self.repo.lock().await;
        if repo.head != base {
            return Ok(None);
        }
        let mut tree = repo.commits[&repo.head].clone();
        for path in deletes {
            tree.remove(path);
        }
        for file in writes {
            tree.insert(file.path.clone(), file.content.clone());
        }
        repo.counter += 1;
        let id = format!("c{}", repo.counter);
        repo.commits.insert(id.clone(), tree);
        repo.head = id.clone();
        Ok(Some(id))
    }
}
