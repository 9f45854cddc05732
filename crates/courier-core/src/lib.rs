// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier dispatch engine.
//!
//! This crate provides the domain types, error taxonomy, reference
//! addressing scheme, status state machine, and adapter traits used
//! throughout the Courier workspace. Persistence lives in
//! `courier-storage`; this crate stays free of I/O apart from the
//! capability catalog loader closure boundary.

pub mod catalog;
pub mod error;
pub mod refs;
pub mod state;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use state::{folder_for, Folder};
pub use traits::{HookDispatcher, HookEvent, NoopHooks, TransactionalStore};
pub use types::{
    ActorId, Attachment, Envelope, HistoryEntry, Message, MessageRef, PayloadBlock, Priority,
    Status, ThreadRef, ThreadSnapshot,
};
