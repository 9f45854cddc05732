// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread persistence engine for the Courier dispatch engine.
//!
//! Provides the append-only thread file format with overflow and legacy
//! handling, the `ThreadStore` read/write API, attachment externalization
//! and resource locators, two transactional backends (local filesystem and
//! remote tree-commit API), event-log reconstruction, and the read-only
//! change poller.

pub mod attachments;
pub mod events;
pub mod format;
pub mod fs_backend;
pub mod poller;
pub mod store;
pub mod tree_backend;

pub use attachments::{thread_view, ResourceRegistry};
pub use events::{reconstruct, EventPayload, ThreadEvent};
pub use fs_backend::FsStore;
pub use poller::ChangePoller;
pub use store::{AppendRequest, CreateRequest, ThreadStore};
pub use tree_backend::{TreeApi, TreeStore};
