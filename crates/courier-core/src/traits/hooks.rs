// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification hook boundary.
//!
//! Hooks run after a successful commit. Their failures are advisory: the
//! thread store logs them at `warn` and never unwinds the mutation.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{Envelope, MessageRef, Status};

/// What happened to a thread, for downstream notification dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    ThreadCreated,
    StatusChanged { from: Status, to: Status },
    MessageAdded { message_ref: Option<MessageRef> },
    /// A change observed by the poller that was made outside this process.
    ExternalChange { previous: Option<Status> },
}

/// Receives `{envelope, event}` after each committed mutation.
#[async_trait]
pub trait HookDispatcher: Send + Sync {
    async fn dispatch(&self, envelope: &Envelope, event: HookEvent) -> Result<(), CourierError>;
}

/// Default dispatcher that drops every event.
#[derive(Debug, Default)]
pub struct NoopHooks;

#[async_trait]
impl HookDispatcher for NoopHooks {
    async fn dispatch(&self, _envelope: &Envelope, _event: HookEvent) -> Result<(), CourierError> {
        Ok(())
    }
}
