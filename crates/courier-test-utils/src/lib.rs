// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles and fixtures for the Courier workspace.
//!
//! Provides an in-memory tree API with injectable commit conflicts, a
//! recording hook dispatcher, and fixture builders used by the storage
//! integration tests.

pub mod fixtures;
pub mod hooks;
pub mod logging;
pub mod memory_tree;

pub use hooks::RecordingHooks;
pub use logging::init_test_logging;
pub use memory_tree::MemoryTreeApi;
