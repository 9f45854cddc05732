// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The thread store: create, append, read, list, and migrate threads.
//!
//! All mutations go through the injected [`TransactionalStore`], so a
//! logical operation is one all-or-nothing unit regardless of backend.
//! Notification hooks run only after a successful commit and their
//! failures never unwind it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::error::CourierError;
use courier_core::refs::{self, RefContext};
use courier_core::state::{self, Applied, Folder};
use courier_core::traits::{HookDispatcher, HookEvent, TransactionalStore};
use courier_core::types::{
    ActorId, Attachment, Envelope, HistoryEntry, Message, MessageRef, PathKind, PayloadBlock,
    Priority, Status, ThreadRef, ThreadSnapshot, TreeFile,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::attachments::{self, is_attachment_name};
use crate::format;

/// Inputs for creating a new thread.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub requestor: ActorId,
    pub intent: String,
    pub priority: Priority,
    /// Open-ended extra fields carried on the request block verbatim.
    pub context: Map<String, Value>,
    /// Sender-local id, slugged into the ref and mapped by the ack.
    pub local_id: Option<String>,
    pub channel: Option<String>,
    /// Timestamp override; defaults to now.
    pub at: Option<DateTime<Utc>>,
}

impl CreateRequest {
    pub fn new(requestor: impl Into<ActorId>, intent: impl Into<String>) -> Self {
        Self {
            requestor: requestor.into(),
            intent: intent.into(),
            priority: Priority::Normal,
            context: Map::new(),
            local_id: None,
            channel: None,
            at: None,
        }
    }
}

impl From<&str> for CreateRequest {
    fn from(intent: &str) -> Self {
        Self::new(ActorId("agent".into()), intent)
    }
}

/// Inputs for appending a message to an existing thread.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub blocks: Vec<PayloadBlock>,
    /// Explicit status override; defaults to the first `status` block.
    pub new_status: Option<Status>,
    pub local_id: Option<String>,
    pub channel: Option<String>,
    /// What this message replies to (canonical ref or sender-local id).
    pub re: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

impl AppendRequest {
    pub fn new(blocks: Vec<PayloadBlock>) -> Self {
        Self {
            blocks,
            new_status: None,
            local_id: None,
            channel: None,
            re: None,
            at: None,
        }
    }
}

/// Where and in what format a thread currently sits.
#[derive(Debug, Clone)]
enum StoredThread {
    /// Current directory format: `{partition}/{ref}/log-*.jsonl`.
    Directory { folder: Folder },
    /// Legacy single-file format: `{partition}/{ref}.jsonl`.
    Legacy { folder: Folder },
}

/// The read/write API for threads.
pub struct ThreadStore {
    backend: Arc<dyn TransactionalStore>,
    hooks: Arc<dyn HookDispatcher>,
    /// Actor id this node signs system acks with.
    node: ActorId,
    refs: Mutex<RefContext>,
}

impl ThreadStore {
    pub fn new(
        backend: Arc<dyn TransactionalStore>,
        hooks: Arc<dyn HookDispatcher>,
        node: ActorId,
    ) -> Self {
        Self {
            backend,
            hooks,
            node,
            refs: Mutex::new(RefContext::new()),
        }
    }

    fn dir_path(folder: Folder, thread_ref: &str) -> String {
        format!("{folder}/{thread_ref}")
    }

    fn legacy_path(folder: Folder, thread_ref: &str) -> String {
        format!("{folder}/{}", format::legacy_file_name(thread_ref))
    }

    /// Create a new thread from its originating request.
    ///
    /// Mints a ref, writes the request message plus a system ack, and
    /// commits the whole file set into the `received` partition atomically.
    pub async fn create(
        &self,
        request: CreateRequest,
    ) -> Result<(ThreadRef, Envelope), CourierError> {
        if request.intent.trim().is_empty() {
            return Err(CourierError::Validation(
                "request has no intent".to_string(),
            ));
        }
        let at = request.at.unwrap_or_else(Utc::now);

        // Serials are one past the maximum for the date across all
        // partitions, so a moved thread can never cause a collision.
        let mut existing = Vec::new();
        for folder in Folder::all() {
            for (name, _) in self.backend.list_directory(folder.as_str()).await? {
                existing.push(name.trim_end_matches(".jsonl").to_string());
            }
        }
        let thread_ref =
            refs::generate_thread_ref(at.date_naive(), &existing, request.local_id.as_deref());
        let request_ref =
            refs::generate_message_ref(&thread_ref, "request", 1, request.local_id.as_deref());

        let envelope = Envelope {
            thread_ref: thread_ref.clone(),
            requestor: request.requestor.clone(),
            executor: None,
            status: Status::Pending,
            created: at,
            updated: at,
            intent: request.intent.clone(),
            priority: request.priority,
            history: vec![HistoryEntry {
                action: "created".to_string(),
                at,
                by: request.requestor.clone(),
                message_ref: Some(request_ref.clone()),
            }],
        };

        let request_message = Message {
            from: request.requestor.clone(),
            received: at,
            channel: request.channel.clone(),
            re: None,
            message_ref: Some(request_ref.clone()),
            blocks: vec![PayloadBlock::Request {
                intent: request.intent.clone(),
                extra: request.context.clone(),
            }],
        };
        let ack = self.ack_message(at, Some(request_ref), request.local_id.as_deref());

        let files = format::serialize_thread(&envelope, &[request_message, ack])?;
        let dir = Self::dir_path(Folder::Received, thread_ref.as_str());
        self.backend.create_files(&dir, &files).await?;

        self.refs.lock().await.record_ack(
            &request.requestor,
            request.local_id.as_deref(),
            thread_ref.as_str(),
        );
        info!(thread = %thread_ref, intent = %request.intent, "thread created");
        self.fire_hook(&envelope, HookEvent::ThreadCreated).await;
        Ok((thread_ref, envelope))
    }

    /// Append a message to a thread, optionally changing its status.
    ///
    /// A status change is validated by the state machine; when it crosses a
    /// partition boundary the move and the file updates are one atomic
    /// unit. A legacy-format thread is migrated to the current format by
    /// this first mutation.
    pub async fn append(
        &self,
        reference: &str,
        actor: &ActorId,
        request: AppendRequest,
    ) -> Result<Envelope, CourierError> {
        if request.blocks.is_empty() {
            return Err(CourierError::Validation(
                "append carries no payload blocks".to_string(),
            ));
        }
        let at = request.at.unwrap_or_else(Utc::now);
        let thread_ref = self.resolve_thread_ref(reference, actor).await?;
        let (stored, snapshot) = self.load(&thread_ref).await?;
        let mut envelope = snapshot.envelope;
        let mut messages = snapshot.messages;
        let old_folder = match stored {
            StoredThread::Directory { folder } | StoredThread::Legacy { folder } => folder,
        };
        let before = format::serialize_thread(&envelope, &messages)?;

        // Mint the ref first so history can point at the message.
        let serial = messages
            .iter()
            .filter(|m| m.message_ref.is_some())
            .count() as u32
            + 1;
        let primary_kind = request
            .blocks
            .iter()
            .find(|b| b.is_addressable())
            .map_or("message", |b| b.kind());
        let message_ref = refs::generate_message_ref(
            &thread_ref,
            primary_kind,
            serial,
            request.local_id.as_deref(),
        );

        let message = Message {
            from: actor.clone(),
            received: at,
            channel: request.channel.clone(),
            re: request.re.clone(),
            message_ref: Some(message_ref.clone()),
            blocks: request.blocks.clone(),
        };

        // Externalize oversized payloads before anything is committed.
        let next_attachment_serial = snapshot.attachments.len() as u32 + 1;
        let externalized = attachments::externalize_message(message, next_attachment_serial)?;
        messages.push(externalized.message);

        // Status change, if requested and different.
        // A cancel block is a cancellation request even without an explicit
        // status block.
        let requested_status = request.new_status.or_else(|| {
            request.blocks.iter().find_map(|b| match b {
                PayloadBlock::Status { status, .. } => Some(*status),
                PayloadBlock::Cancel { .. } => Some(Status::Cancelled),
                _ => None,
            })
        });
        // Every append refreshes the update stamp, whether or not the
        // status moves; a real transition stamps it again inside `apply`.
        envelope.updated = at;
        let mut status_change = None;
        if let Some(new_status) = requested_status {
            if new_status != envelope.status {
                let from = envelope.status;
                match state::apply(&mut envelope, new_status, actor, at, Some(message_ref.clone()))?
                {
                    Applied::Changed(_) => status_change = Some((from, new_status)),
                    Applied::NoOp => {}
                }
            } else if new_status == Status::Claimed {
                // Same-status claim: run the executor check for a foreign
                // claimer; a re-claim by the holder is an idempotent no-op.
                if let Applied::Changed(_) =
                    state::apply(&mut envelope, new_status, actor, at, Some(message_ref.clone()))?
                {
                    status_change = Some((new_status, new_status));
                }
            }
        }

        messages.push(self.ack_message(at, Some(message_ref.clone()), request.local_id.as_deref()));

        let after = format::serialize_thread(&envelope, &messages)?;
        let mut updates = format::changed_files(&before, &after);
        updates.extend(externalized.files);

        let new_folder = state::folder_for(envelope.status);
        let new_dir = Self::dir_path(new_folder, thread_ref.as_str());
        match stored {
            StoredThread::Legacy { folder } => {
                // Migration-on-write: the legacy file is deleted and the
                // directory written in the same atomic unit, wherever the
                // new status puts it.
                let legacy = Self::legacy_path(folder, thread_ref.as_str());
                let mut full = after;
                full.extend(
                    snapshot
                        .attachments
                        .iter()
                        .map(|a| TreeFile::new(a.name.clone(), a.bytes.clone())),
                );
                full.extend(updates.iter().filter(|f| is_attachment_name(&f.path)).cloned());
                self.backend
                    .replace_with_directory(&legacy, &new_dir, &full)
                    .await?;
                info!(thread = %thread_ref, "migrated legacy thread on write");
            }
            StoredThread::Directory { .. } if new_folder != old_folder => {
                let old_dir = Self::dir_path(old_folder, thread_ref.as_str());
                self.backend
                    .move_directory(&old_dir, &new_dir, &updates)
                    .await?;
            }
            StoredThread::Directory { .. } => {
                self.backend.update_files(&new_dir, &updates).await?;
            }
        }

        self.refs
            .lock()
            .await
            .record_ack(actor, request.local_id.as_deref(), message_ref.as_str());
        debug!(thread = %thread_ref, message = %message_ref, "message appended");

        if let Some((from, to)) = status_change {
            self.fire_hook(&envelope, HookEvent::StatusChanged { from, to })
                .await;
        } else {
            self.fire_hook(
                &envelope,
                HookEvent::MessageAdded {
                    message_ref: Some(message_ref),
                },
            )
            .await;
        }
        Ok(envelope)
    }

    /// Read a thread's full state, transparently handling either format.
    pub async fn read(&self, reference: &str) -> Result<ThreadSnapshot, CourierError> {
        let thread_ref = ThreadRef(reference.to_string());
        let (_, snapshot) = self.load(&thread_ref).await?;
        Ok(snapshot)
    }

    /// List envelopes, optionally filtered by status.
    ///
    /// Best-effort: a thread whose stored files fail to parse is skipped
    /// with a log entry, never aborting the listing.
    pub async fn list(&self, status: Option<Status>) -> Result<Vec<Envelope>, CourierError> {
        let folders: Vec<Folder> = match status {
            Some(s) => vec![state::folder_for(s)],
            None => Folder::all().to_vec(),
        };

        let mut envelopes = Vec::new();
        for folder in folders {
            for (name, kind) in self.backend.list_directory(folder.as_str()).await? {
                let thread_ref = match kind {
                    PathKind::Directory => ThreadRef(name),
                    PathKind::File => match name.strip_suffix(".jsonl") {
                        Some(stem) => ThreadRef(stem.to_string()),
                        None => continue,
                    },
                };
                if !refs::is_thread_ref(thread_ref.as_str()) {
                    continue;
                }
                match self.load(&thread_ref).await {
                    Ok((_, snapshot)) => {
                        if status.is_none() || status == Some(snapshot.envelope.status) {
                            envelopes.push(snapshot.envelope);
                        }
                    }
                    Err(CourierError::Format { path, detail }) => {
                        warn!(thread = %thread_ref, %path, %detail, "skipping unparseable thread");
                    }
                    Err(other) => return Err(other),
                }
            }
        }
        Ok(envelopes)
    }

    /// Rewrite a legacy-format thread in the current format at its current
    /// partition, deleting the legacy file in the same atomic operation.
    ///
    /// No-op for threads already in the current format.
    pub async fn migrate(&self, reference: &str) -> Result<(), CourierError> {
        let thread_ref = ThreadRef(reference.to_string());
        let (stored, snapshot) = self.load(&thread_ref).await?;
        let StoredThread::Legacy { folder } = stored else {
            return Ok(());
        };
        let files = format::serialize_thread(&snapshot.envelope, &snapshot.messages)?;
        let legacy = Self::legacy_path(folder, thread_ref.as_str());
        let dir = Self::dir_path(folder, thread_ref.as_str());
        self.backend
            .replace_with_directory(&legacy, &dir, &files)
            .await?;
        info!(thread = %thread_ref, "migrated legacy thread");
        Ok(())
    }

    /// Resolve any accepted reference form to a thread ref.
    pub async fn resolve_thread_ref(
        &self,
        reference: &str,
        actor: &ActorId,
    ) -> Result<ThreadRef, CourierError> {
        let canonical = self.refs.lock().await.resolve(reference, actor)?;
        // A message ref addresses its containing thread.
        match canonical.split_once('/') {
            Some((thread, _)) => Ok(ThreadRef(thread.to_string())),
            None => Ok(ThreadRef(canonical)),
        }
    }

    /// System ack confirming receipt; never consumes the message serial.
    fn ack_message(
        &self,
        at: DateTime<Utc>,
        accepted: Option<MessageRef>,
        local_id: Option<&str>,
    ) -> Message {
        Message {
            from: self.node.clone(),
            received: at,
            channel: None,
            re: None,
            message_ref: None,
            blocks: vec![PayloadBlock::Ack {
                accepted,
                local_id: local_id.map(str::to_string),
                extra: Map::new(),
            }],
        }
    }

    /// Locate and parse a thread in whichever partition and format it is
    /// stored. The partition invariant guarantees at most one location.
    async fn load(
        &self,
        thread_ref: &ThreadRef,
    ) -> Result<(StoredThread, ThreadSnapshot), CourierError> {
        for folder in Folder::all() {
            let dir = Self::dir_path(folder, thread_ref.as_str());
            match self.backend.path_kind(&dir).await? {
                Some(PathKind::Directory) => {
                    let snapshot = self.read_directory(&dir, thread_ref).await?;
                    return Ok((StoredThread::Directory { folder }, snapshot));
                }
                _ => {
                    let legacy = Self::legacy_path(folder, thread_ref.as_str());
                    if self.backend.path_kind(&legacy).await? == Some(PathKind::File) {
                        let bytes = self.backend.read_file(&legacy).await?;
                        let (envelope, messages) = format::parse_documents(&bytes, &legacy)?;
                        return Ok((
                            StoredThread::Legacy { folder },
                            ThreadSnapshot {
                                envelope,
                                messages,
                                attachments: Vec::new(),
                            },
                        ));
                    }
                }
            }
        }
        Err(CourierError::thread_not_found(thread_ref.as_str()))
    }

    /// Read a current-format thread: concatenate log files ascending, then
    /// collect attachment blobs.
    async fn read_directory(
        &self,
        dir: &str,
        thread_ref: &ThreadRef,
    ) -> Result<ThreadSnapshot, CourierError> {
        let mut logs: Vec<(u32, String)> = Vec::new();
        let mut attachment_names = Vec::new();
        for (name, kind) in self.backend.list_directory(dir).await? {
            if kind != PathKind::File {
                continue;
            }
            if let Some(seq) = format::parse_log_seq(&name) {
                logs.push((seq, name));
            } else if is_attachment_name(&name) {
                attachment_names.push(name);
            }
        }
        if logs.is_empty() {
            return Err(CourierError::Format {
                path: dir.to_string(),
                detail: "no log files".to_string(),
            });
        }
        logs.sort();

        let mut concatenated = Vec::new();
        for (_, name) in &logs {
            concatenated.extend(self.backend.read_file(&format!("{dir}/{name}")).await?);
        }
        let (envelope, messages) = format::parse_documents(&concatenated, dir)?;

        // Attachment metadata lives on the file_ref blocks; bytes on disk.
        let mut attachments = Vec::new();
        for name in attachment_names {
            let bytes = self.backend.read_file(&format!("{dir}/{name}")).await?;
            let mime = messages
                .iter()
                .flat_map(|m| m.blocks.iter())
                .find_map(|block| match block {
                    PayloadBlock::FileRef { path, mime, .. } if *path == name => {
                        Some(mime.clone())
                    }
                    _ => None,
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            attachments.push(Attachment {
                name,
                mime,
                size: bytes.len() as u64,
                bytes,
            });
        }

        if envelope.thread_ref != *thread_ref {
            return Err(CourierError::Format {
                path: dir.to_string(),
                detail: format!(
                    "envelope ref {} does not match location",
                    envelope.thread_ref
                ),
            });
        }
        Ok(ThreadSnapshot {
            envelope,
            messages,
            attachments,
        })
    }

    /// Hooks are advisory: run after the commit, failures logged only.
    async fn fire_hook(&self, envelope: &Envelope, event: HookEvent) {
        if let Err(e) = self.hooks.dispatch(envelope, event).await {
            warn!(thread = %envelope.thread_ref, error = %e, "hook dispatch failed");
        }
    }
}
