// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event-log reconstruction of thread state.
//!
//! Deployments that persist an ordered event log instead of materialized
//! thread files fold their events into the same read model the thread
//! store exposes, so the two persistence strategies are interchangeable
//! from a consumer's point of view. Reconstruction is a pure function of
//! the de-duplicated, time-sorted input: replaying the same events twice
//! yields identical envelopes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use courier_core::error::CourierError;
use courier_core::state;
use courier_core::types::{
    ActorId, Envelope, HistoryEntry, Message, Priority, Status, ThreadRef,
};
use serde::{Deserialize, Serialize};

/// What one event did to its thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ThreadCreated {
        #[serde(rename = "ref")]
        thread_ref: ThreadRef,
        intent: String,
        #[serde(default)]
        priority: Priority,
        message: Message,
    },
    StatusChanged {
        status: Status,
    },
    MessageAdded {
        message: Message,
    },
}

/// One event in a thread's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadEvent {
    /// Unique event identifier; duplicates are skipped during folding.
    pub id: String,
    pub at: DateTime<Utc>,
    pub actor: ActorId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Fold an arbitrarily-ordered, possibly duplicated event list into an
/// envelope and message list.
///
/// Events are sorted by `at` ascending (ties broken by `id` so equal
/// timestamps reorder deterministically), de-duplicated by id, then folded
/// sequentially. The first surviving event must be `thread_created`; status
/// changes go through the state machine exactly as a live transition would.
pub fn reconstruct(events: &[ThreadEvent]) -> Result<(Envelope, Vec<Message>), CourierError> {
    let mut ordered: Vec<&ThreadEvent> = events.iter().collect();
    ordered.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut envelope: Option<Envelope> = None;
    let mut messages = Vec::new();

    for event in ordered {
        if !seen.insert(event.id.as_str()) {
            continue;
        }
        match (&event.payload, envelope.as_mut()) {
            (
                EventPayload::ThreadCreated {
                    thread_ref,
                    intent,
                    priority,
                    message,
                },
                None,
            ) => {
                envelope = Some(Envelope {
                    thread_ref: thread_ref.clone(),
                    requestor: event.actor.clone(),
                    executor: None,
                    status: Status::Pending,
                    created: event.at,
                    updated: event.at,
                    intent: intent.clone(),
                    priority: *priority,
                    history: vec![HistoryEntry {
                        action: "created".to_string(),
                        at: event.at,
                        by: event.actor.clone(),
                        message_ref: message.message_ref.clone(),
                    }],
                });
                messages.push(message.clone());
            }
            (EventPayload::ThreadCreated { thread_ref, .. }, Some(_)) => {
                return Err(CourierError::Validation(format!(
                    "duplicate thread_created for {thread_ref}"
                )));
            }
            (EventPayload::StatusChanged { status }, Some(env)) => {
                state::apply(env, *status, &event.actor, event.at, None)?;
            }
            (EventPayload::MessageAdded { message }, Some(env)) => {
                env.updated = event.at;
                messages.push(message.clone());
            }
            (_, None) => {
                return Err(CourierError::Validation(
                    "event log does not begin with thread_created".to_string(),
                ));
            }
        }
    }

    let envelope = envelope.ok_or_else(|| {
        CourierError::Validation("empty event log".to_string())
    })?;
    Ok((envelope, messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::PayloadBlock;
    use proptest::prelude::*;
    use serde_json::Map;

    fn base_events() -> Vec<ThreadEvent> {
        let t0 = DateTime::parse_from_rfc3339("2026-02-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let message = Message {
            from: ActorId("agent-home".into()),
            received: t0,
            channel: None,
            re: None,
            message_ref: Some(courier_core::types::MessageRef(
                "2026-02-01-001/request-001".into(),
            )),
            blocks: vec![PayloadBlock::Request {
                intent: "check garage door".into(),
                extra: Map::new(),
            }],
        };
        vec![
            ThreadEvent {
                id: "ev-1".into(),
                at: t0,
                actor: ActorId("agent-home".into()),
                payload: EventPayload::ThreadCreated {
                    thread_ref: ThreadRef("2026-02-01-001".into()),
                    intent: "check garage door".into(),
                    priority: Priority::Normal,
                    message,
                },
            },
            ThreadEvent {
                id: "ev-2".into(),
                at: t0 + chrono::Duration::minutes(5),
                actor: ActorId("teague-phone".into()),
                payload: EventPayload::StatusChanged {
                    status: Status::Claimed,
                },
            },
            ThreadEvent {
                id: "ev-3".into(),
                at: t0 + chrono::Duration::minutes(6),
                actor: ActorId("teague-phone".into()),
                payload: EventPayload::MessageAdded {
                    message: Message {
                        from: ActorId("teague-phone".into()),
                        received: t0 + chrono::Duration::minutes(6),
                        channel: None,
                        re: None,
                        message_ref: Some(courier_core::types::MessageRef(
                            "2026-02-01-001/reply-002".into(),
                        )),
                        blocks: vec![PayloadBlock::Reply {
                            text: Some("on it".into()),
                            extra: Map::new(),
                        }],
                    },
                },
            },
        ]
    }

    #[test]
    fn fold_produces_thread_store_shape() {
        let (envelope, messages) = reconstruct(&base_events()).unwrap();
        assert_eq!(envelope.thread_ref.as_str(), "2026-02-01-001");
        assert_eq!(envelope.status, Status::Claimed);
        assert_eq!(envelope.executor, Some(ActorId("teague-phone".into())));
        assert_eq!(envelope.history.len(), 2);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn reordered_and_duplicated_input_folds_identically() {
        let events = base_events();
        let baseline = reconstruct(&events).unwrap();

        let mut shuffled = events.clone();
        shuffled.reverse();
        shuffled.push(events[1].clone()); // duplicate id
        assert_eq!(reconstruct(&shuffled).unwrap(), baseline);
    }

    #[test]
    fn empty_log_is_rejected() {
        assert!(matches!(
            reconstruct(&[]),
            Err(CourierError::Validation(_))
        ));
    }

    #[test]
    fn log_must_begin_with_creation() {
        let events = vec![base_events()[1].clone()];
        assert!(matches!(
            reconstruct(&events),
            Err(CourierError::Validation(_))
        ));
    }

    proptest! {
        /// Folding is invariant under shuffling and duplication.
        #[test]
        fn fold_is_idempotent_under_permutation(seed in 0u64..1000) {
            use rand::{seq::SliceRandom, SeedableRng};
            let events = base_events();
            let baseline = reconstruct(&events).unwrap();

            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut mutated = events.clone();
            mutated.extend(events.iter().cloned()); // duplicate everything
            mutated.shuffle(&mut rng);
            prop_assert_eq!(reconstruct(&mutated).unwrap(), baseline);
        }
    }
}
