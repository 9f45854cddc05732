// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording hook dispatcher for assertions in tests.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::error::CourierError;
use courier_core::traits::{HookDispatcher, HookEvent};
use courier_core::types::{Envelope, ThreadRef};
use tokio::sync::Mutex;

/// Captures every dispatched hook event.
///
/// With `fail_next(true)`, dispatches return an error so tests can verify
/// hook failures never unwind a commit.
#[derive(Default)]
pub struct RecordingHooks {
    events: Arc<Mutex<Vec<(ThreadRef, HookEvent)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(ThreadRef, HookEvent)> {
        self.events.lock().await.clone()
    }

    pub async fn fail_next(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }
}

#[async_trait]
impl HookDispatcher for RecordingHooks {
    async fn dispatch(&self, envelope: &Envelope, event: HookEvent) -> Result<(), CourierError> {
        self.events
            .lock()
            .await
            .push((envelope.thread_ref.clone(), event));
        if *self.fail.lock().await {
            return Err(CourierError::Internal("hook endpoint unreachable".into()));
        }
        Ok(())
    }
}
