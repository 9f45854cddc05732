// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for threads, messages, payload blocks, and attachments.
//!
//! A *thread* is one request-to-resolution conversation. Its mutable summary
//! record is the [`Envelope`]; everything else appended to a thread
//! (messages, attachments) is immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};

/// Canonical identifier of a thread: `{date}-{3-digit-serial}[-{slug}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef(pub String);

impl ThreadRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical identifier of a message: `{threadRef}/{type}-{3-digit-serial}[-{slug}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The thread ref portion of this message ref.
    pub fn thread_ref(&self) -> ThreadRef {
        match self.0.split_once('/') {
            Some((thread, _)) => ThreadRef(thread.to_string()),
            None => ThreadRef(self.0.clone()),
        }
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a participating actor (agent, executor, or the system itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a thread.
///
/// `Retrying` is named by the partition table but has no incoming edges in
/// the transition table; it is reserved for a retry-policy extension.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Claimed,
    InProgress,
    Waiting,
    Held,
    NeedsInput,
    NeedsConfirmation,
    Retrying,
    Completed,
    Partial,
    Failed,
    Declined,
    Expired,
    Cancelled,
    Superseded,
    Delegated,
}

/// Priority attached to a request by its originator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// One entry in an envelope's append-only history.
///
/// `message_ref` is present for any entry triggered by an addressable
/// (non-ack) message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub at: DateTime<Utc>,
    pub by: ActorId,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub message_ref: Option<MessageRef>,
}

/// The mutable summary record of a thread.
///
/// Exactly one envelope exists per thread. It is rewritten in place on every
/// status or executor change; everything else in a thread is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ref")]
    pub thread_ref: ThreadRef,
    pub requestor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ActorId>,
    pub status: Status,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub intent: String,
    #[serde(default)]
    pub priority: Priority,
    pub history: Vec<HistoryEntry>,
}

/// A typed payload block inside a message.
///
/// Callers may attach arbitrary extra fields to any block; unrecognized keys
/// are preserved verbatim through a read/write cycle via the flattened
/// `extra` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum PayloadBlock {
    /// The originating request of a thread.
    Request {
        intent: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A status change requested by the sender.
    Status {
        status: Status,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// An executor's substantive response.
    Response {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A free-form reply within the conversation.
    Reply {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// An answer to a `needs_input` question.
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A cancellation request from the requestor.
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// System-generated receipt confirmation. Acks never consume the
    /// per-thread message serial and never receive a message ref.
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accepted: Option<MessageRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A non-binding suggestion to another party.
    Suggestion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A configuration update for the thread.
    Config {
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A question directed at another party.
    Query {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Inline binary content, base64-encoded. Payloads over the inline
    /// ceiling are externalized into a `file_ref` before commit.
    Media {
        name: String,
        mime: String,
        content: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Reference to an externalized attachment stored alongside the thread.
    FileRef {
        name: String,
        mime: String,
        size: u64,
        path: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl PayloadBlock {
    /// The wire name of this block's type, as used in message refs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Status { .. } => "status",
            Self::Response { .. } => "response",
            Self::Reply { .. } => "reply",
            Self::Answer { .. } => "answer",
            Self::Cancel { .. } => "cancel",
            Self::Ack { .. } => "ack",
            Self::Suggestion { .. } => "suggestion",
            Self::Config { .. } => "config",
            Self::Query { .. } => "query",
            Self::Media { .. } => "media",
            Self::FileRef { .. } => "file_ref",
        }
    }

    /// Whether a message consisting of this block consumes the per-thread
    /// message serial and receives a canonical ref.
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Self::Ack { .. })
    }
}

/// A message appended to a thread. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: ActorId,
    pub received: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// What this message replies to: a canonical ref or a sender-local id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub re: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub message_ref: Option<MessageRef>,
    pub blocks: Vec<PayloadBlock>,
}

impl Message {
    /// A message is addressable unless every block it carries is an ack.
    pub fn is_addressable(&self) -> bool {
        self.blocks.iter().any(PayloadBlock::is_addressable)
    }
}

/// Broad content class of an attachment, derived from its MIME prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
}

/// Metadata and bytes of one attachment belonging to a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

/// The full read model of one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSnapshot {
    pub envelope: Envelope,
    pub messages: Vec<Message>,
    pub attachments: Vec<Attachment>,
}

/// One file in a thread's committed file set.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeFile {
    /// Path relative to the operation's thread directory, e.g. `log-000.jsonl`.
    pub path: String,
    pub content: Vec<u8>,
}

impl TreeFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// What a storage path currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathKind {
    /// A legacy single-file thread.
    File,
    /// A current-format thread directory.
    Directory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        use std::str::FromStr;
        for (status, text) in [
            (Status::Pending, "pending"),
            (Status::InProgress, "in_progress"),
            (Status::NeedsConfirmation, "needs_confirmation"),
            (Status::Superseded, "superseded"),
        ] {
            assert_eq!(status.to_string(), text);
            assert_eq!(Status::from_str(text).unwrap(), status);
        }
    }

    #[test]
    fn payload_block_preserves_unknown_keys() {
        let raw = r#"{"block":"request","intent":"water the plants","urgency_note":"before noon","site":{"room":"kitchen"}}"#;
        let block: PayloadBlock = serde_json::from_str(raw).unwrap();
        let PayloadBlock::Request { intent, extra } = &block else {
            panic!("expected request block");
        };
        assert_eq!(intent, "water the plants");
        assert_eq!(extra["urgency_note"], "before noon");
        assert_eq!(extra["site"]["room"], "kitchen");

        let rewritten = serde_json::to_value(&block).unwrap();
        assert_eq!(rewritten["urgency_note"], "before noon");
        assert_eq!(rewritten["site"]["room"], "kitchen");
    }

    #[test]
    fn ack_blocks_are_not_addressable() {
        let ack = PayloadBlock::Ack {
            accepted: None,
            local_id: Some("my-req-1".into()),
            extra: Map::new(),
        };
        assert!(!ack.is_addressable());
        let cancel = PayloadBlock::Cancel {
            reason: None,
            extra: Map::new(),
        };
        assert!(cancel.is_addressable());
    }

    #[test]
    fn message_ref_exposes_thread_portion() {
        let mref = MessageRef("2026-02-01-001/response-002".into());
        assert_eq!(mref.thread_ref().as_str(), "2026-02-01-001");
    }
}
