// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local filesystem implementation of [`TransactionalStore`].
//!
//! Atomicity leans on rename: new thread directories are fully staged under
//! a hidden scratch name and renamed into place in one step, and partition
//! moves are a single directory rename. Individual file rewrites go through
//! a temp file plus rename so a reader never sees a torn log file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use courier_core::error::CourierError;
use courier_core::traits::TransactionalStore;
use courier_core::types::{PathKind, TreeFile};
use tokio::fs;
use tracing::debug;

/// Filesystem-backed transactional store rooted at one directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn scratch_name() -> String {
        let nonce: u32 = rand::random();
        format!(".stage-{nonce:08x}")
    }

    async fn write_file_set(base: &Path, files: &[TreeFile]) -> Result<(), CourierError> {
        for file in files {
            let path = base.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, &file.content).await?;
        }
        Ok(())
    }

    /// Atomically replace (or create) one file via a temp sibling.
    async fn write_file_atomic(path: &Path, content: &[u8]) -> Result<(), CourierError> {
        let parent = path
            .parent()
            .ok_or_else(|| CourierError::Internal(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent).await?;
        let tmp = parent.join(Self::scratch_name());
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for FsStore {
    async fn create_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError> {
        let target = self.abs(dir);
        if fs::metadata(&target).await.is_ok() {
            return Err(CourierError::Internal(format!("{dir} already exists")));
        }
        let parent = target
            .parent()
            .ok_or_else(|| CourierError::Internal(format!("no parent for {dir}")))?;
        fs::create_dir_all(parent).await?;

        // Stage the full file set, then a single rename makes it visible.
        let staging = parent.join(Self::scratch_name());
        fs::create_dir_all(&staging).await?;
        Self::write_file_set(&staging, files).await?;
        fs::rename(&staging, &target).await?;
        debug!(dir, files = files.len(), "created thread directory");
        Ok(())
    }

    async fn update_files(&self, dir: &str, files: &[TreeFile]) -> Result<(), CourierError> {
        let base = self.abs(dir);
        for file in files {
            Self::write_file_atomic(&base.join(&file.path), &file.content).await?;
        }
        Ok(())
    }

    async fn move_directory(
        &self,
        old_dir: &str,
        new_dir: &str,
        updates: &[TreeFile],
    ) -> Result<(), CourierError> {
        let old_path = self.abs(old_dir);
        let new_path = self.abs(new_dir);
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&old_path, &new_path).await?;
        for file in updates {
            Self::write_file_atomic(&new_path.join(&file.path), &file.content).await?;
        }
        debug!(old_dir, new_dir, "moved thread directory");
        Ok(())
    }

    async fn replace_with_directory(
        &self,
        legacy_path: &str,
        dir: &str,
        files: &[TreeFile],
    ) -> Result<(), CourierError> {
        let target = self.abs(dir);
        let parent = target
            .parent()
            .ok_or_else(|| CourierError::Internal(format!("no parent for {dir}")))?;
        fs::create_dir_all(parent).await?;

        // Stage and reveal the directory first; the dispatch in readers
        // prefers the directory form, so the thread is never unreadable
        // while the legacy file is still being removed.
        let staging = parent.join(Self::scratch_name());
        fs::create_dir_all(&staging).await?;
        Self::write_file_set(&staging, files).await?;
        fs::rename(&staging, &target).await?;
        fs::remove_file(self.abs(legacy_path)).await?;
        debug!(legacy_path, dir, "migrated legacy thread");
        Ok(())
    }

    async fn path_kind(&self, path: &str) -> Result<Option<PathKind>, CourierError> {
        match fs::metadata(self.abs(path)).await {
            Ok(meta) if meta.is_dir() => Ok(Some(PathKind::Directory)),
            Ok(_) => Ok(Some(PathKind::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, CourierError> {
        match fs::read(self.abs(path)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CourierError::NotFound {
                kind: "file",
                reference: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_directory(&self, dir: &str) -> Result<Vec<(String, PathKind)>, CourierError> {
        let mut entries = Vec::new();
        let mut reader = match fs::read_dir(self.abs(dir)).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Scratch directories from in-flight stages are not entries.
            if name.starts_with(".stage-") {
                continue;
            }
            let kind = if entry.file_type().await?.is_dir() {
                PathKind::Directory
            } else {
                PathKind::File
            };
            entries.push((name, kind));
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::new(temp.path());
        let files = vec![
            TreeFile::new("log-000.jsonl", b"line\n".to_vec()),
            TreeFile::new("att-001-image-door.jpg", vec![1, 2, 3]),
        ];
        store.create_files("received/2026-02-01-001", &files).await.unwrap();

        assert_eq!(
            store.path_kind("received/2026-02-01-001").await.unwrap(),
            Some(PathKind::Directory)
        );
        let bytes = store
            .read_file("received/2026-02-01-001/att-001-image-door.jpg")
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        let names: Vec<String> = store
            .list_directory("received/2026-02-01-001")
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["att-001-image-door.jpg", "log-000.jsonl"]);
    }

    #[tokio::test]
    async fn create_refuses_existing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::new(temp.path());
        let files = vec![TreeFile::new("log-000.jsonl", b"a\n".to_vec())];
        store.create_files("received/t", &files).await.unwrap();
        assert!(store.create_files("received/t", &files).await.is_err());
    }

    #[tokio::test]
    async fn move_applies_updates_and_leaves_one_copy() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::new(temp.path());
        store
            .create_files(
                "received/t",
                &[TreeFile::new("log-000.jsonl", b"old\n".to_vec())],
            )
            .await
            .unwrap();
        store
            .move_directory(
                "received/t",
                "executing/t",
                &[TreeFile::new("log-000.jsonl", b"new\n".to_vec())],
            )
            .await
            .unwrap();

        assert_eq!(store.path_kind("received/t").await.unwrap(), None);
        assert_eq!(
            store.read_file("executing/t/log-000.jsonl").await.unwrap(),
            b"new\n"
        );
    }

    #[tokio::test]
    async fn replace_swaps_file_for_directory() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::new(temp.path());
        store
            .update_files("received", &[TreeFile::new("t.jsonl", b"legacy\n".to_vec())])
            .await
            .unwrap();
        store
            .replace_with_directory(
                "received/t.jsonl",
                "received/t",
                &[TreeFile::new("log-000.jsonl", b"current\n".to_vec())],
            )
            .await
            .unwrap();

        assert_eq!(store.path_kind("received/t.jsonl").await.unwrap(), None);
        assert_eq!(
            store.path_kind("received/t").await.unwrap(),
            Some(PathKind::Directory)
        );
    }
}
