// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only polling loop that detects externally-made changes.
//!
//! Executors may act on a thread outside this process (e.g. directly
//! against the remote tree). The poller lists envelopes on a fixed
//! interval, diffs status and executor against its last snapshot, and
//! dispatches `ExternalChange` hooks for differences. The loop is a single
//! cooperative consumer: a tick never starts while the previous tick's
//! comparison-and-notify pass is still running, and missed ticks are
//! skipped, never queued. It performs no writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_core::traits::{HookDispatcher, HookEvent};
use courier_core::types::{ActorId, Status, ThreadRef};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::store::ThreadStore;

/// Last-known state the poller tracks per thread.
type Snapshot = HashMap<ThreadRef, (Status, Option<ActorId>)>;

/// Detects and reports changes made outside this process.
pub struct ChangePoller {
    store: Arc<ThreadStore>,
    hooks: Arc<dyn HookDispatcher>,
    interval: Duration,
    last_seen: Snapshot,
    primed: bool,
}

impl ChangePoller {
    pub fn new(
        store: Arc<ThreadStore>,
        hooks: Arc<dyn HookDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            hooks,
            interval,
            last_seen: Snapshot::new(),
            primed: false,
        }
    }

    /// Run until `shutdown` flips to `true`. Owns the poller, so ticks can
    /// never overlap.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "poll tick failed");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        debug!("change poller shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One comparison-and-notify pass. Returns the threads that changed.
    ///
    /// The first pass only primes the baseline; nothing is reported for
    /// state that predates the poller.
    pub async fn tick(&mut self) -> Result<Vec<ThreadRef>, courier_core::CourierError> {
        let envelopes = self.store.list(None).await?;
        let mut current = Snapshot::new();
        for envelope in &envelopes {
            current.insert(
                envelope.thread_ref.clone(),
                (envelope.status, envelope.executor.clone()),
            );
        }

        let mut changed = Vec::new();
        if self.primed {
            for envelope in &envelopes {
                let previous = self.last_seen.get(&envelope.thread_ref);
                let now = (envelope.status, envelope.executor.clone());
                if previous != Some(&now) {
                    changed.push(envelope.thread_ref.clone());
                    let event = HookEvent::ExternalChange {
                        previous: previous.map(|(status, _)| *status),
                    };
                    if let Err(e) = self.hooks.dispatch(envelope, event).await {
                        warn!(thread = %envelope.thread_ref, error = %e, "external-change hook failed");
                    }
                }
            }
        }

        self.last_seen = current;
        self.primed = true;
        Ok(changed)
    }
}
