// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All cross-boundary collaborators (storage backends, notification hooks)
//! are object-safe async traits used behind `Arc<dyn …>` so callers never
//! special-case a concrete backend.

pub mod hooks;
pub mod store;

pub use hooks::{HookDispatcher, HookEvent, NoopHooks};
pub use store::TransactionalStore;
