// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status state machine and storage partition mapping.
//!
//! The transition table is the single authority on which status changes are
//! legal. Anything not listed is illegal. Terminal statuses have no outgoing
//! edges.

use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::types::{ActorId, Envelope, HistoryEntry, MessageRef, Status};

/// Storage partition a thread lives in, derived from its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    Received,
    Executing,
    Finished,
    Canceled,
}

impl Folder {
    /// The on-disk directory name of this partition.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Executing => "executing",
            Self::Finished => "finished",
            Self::Canceled => "canceled",
        }
    }

    /// All partitions, in listing order.
    pub fn all() -> [Self; 4] {
        [Self::Received, Self::Executing, Self::Finished, Self::Canceled]
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal successor statuses of `from`. Empty for terminal statuses.
pub fn successors(from: Status) -> &'static [Status] {
    use Status::*;
    match from {
        Pending => &[Claimed, Expired, Cancelled],
        // An executor may finish directly from claimed without reporting
        // in_progress first.
        Claimed => &[InProgress, Declined, Cancelled, Completed, Partial, Failed],
        InProgress => &[
            NeedsInput,
            NeedsConfirmation,
            Waiting,
            Held,
            Completed,
            Partial,
            Failed,
            Cancelled,
        ],
        NeedsInput => &[InProgress],
        NeedsConfirmation => &[InProgress, Cancelled, Held],
        Waiting => &[InProgress, Expired],
        Held => &[InProgress, Expired],
        // Reserved for a retry-policy extension; no edges in this core.
        Retrying => &[],
        Completed | Partial | Failed | Declined | Expired | Cancelled | Superseded | Delegated => {
            &[]
        }
    }
}

/// Whether `from -> to` is an edge in the transition table.
pub fn is_legal(from: Status, to: Status) -> bool {
    successors(from).contains(&to)
}

/// Whether `status` permits no further transitions.
pub fn is_terminal(status: Status) -> bool {
    successors(status).is_empty()
}

/// The partition a thread with `status` belongs in.
pub fn folder_for(status: Status) -> Folder {
    use Status::*;
    match status {
        Pending => Folder::Received,
        Claimed | InProgress | Waiting | Held | NeedsInput | NeedsConfirmation | Retrying => {
            Folder::Executing
        }
        Completed | Partial => Folder::Finished,
        Failed | Declined | Cancelled | Expired | Delegated | Superseded => Folder::Canceled,
    }
}

/// Outcome of applying a status change to an envelope.
#[derive(Debug, PartialEq)]
pub enum Applied {
    /// The envelope changed; the new history entry has been appended.
    Changed(HistoryEntry),
    /// A re-claim by the current executor; nothing changed.
    NoOp,
}

/// Validate and apply a requested status change to `envelope`.
///
/// On a first `claimed` transition the acting party becomes the executor. A
/// re-claim by the same executor is an idempotent no-op; a claim attempt by
/// anyone else on an already-claimed thread is rejected as an invalid
/// transition. On success the envelope's status, executor, `updated` stamp,
/// and history are mutated and the appended history entry is returned.
pub fn apply(
    envelope: &mut Envelope,
    requested: Status,
    actor: &ActorId,
    at: DateTime<Utc>,
    message_ref: Option<MessageRef>,
) -> Result<Applied, CourierError> {
    if requested == Status::Claimed {
        match &envelope.executor {
            Some(current) if current == actor && envelope.status == Status::Claimed => {
                return Ok(Applied::NoOp);
            }
            Some(current) if current != actor => {
                return Err(CourierError::InvalidTransition {
                    from: envelope.status,
                    to: requested,
                });
            }
            _ => {}
        }
    }

    if !is_legal(envelope.status, requested) {
        return Err(CourierError::InvalidTransition {
            from: envelope.status,
            to: requested,
        });
    }

    envelope.status = requested;
    envelope.updated = at;
    if requested == Status::Claimed && envelope.executor.is_none() {
        envelope.executor = Some(actor.clone());
    }

    let entry = HistoryEntry {
        action: requested.to_string(),
        at,
        by: actor.clone(),
        message_ref,
    };
    envelope.history.push(entry.clone());
    Ok(Applied::Changed(entry))
}
