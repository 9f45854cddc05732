// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment handling: inline-vs-external placement and resource URIs.
//!
//! Binary payloads arrive inside messages as base64 `media` blocks. A
//! payload whose stored form is over the inline ceiling is externalized
//! before commit: its bytes become a standalone attachment file next to the
//! thread's log files, and the block is replaced in place by a `file_ref`
//! carrying the same metadata plus the attachment's relative path. The
//! inline ceiling sits below the log-file ceiling so an envelope plus
//! message metadata always fits alongside whatever stays inline; a message
//! whose serialized line would still not fit sheds further media blocks,
//! largest first, until it does.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use courier_core::error::CourierError;
use courier_core::types::{
    Attachment, AttachmentKind, Message, PayloadBlock, ThreadSnapshot, TreeFile,
};
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::format;

/// Inline payloads above this many stored (base64) bytes are externalized,
/// leaving headroom under the 1 MiB file ceiling for envelope and message
/// metadata.
pub const INLINE_CEILING: usize = 768 * 1024;

/// Classify a MIME type by its prefix, defaulting to `file`.
pub fn classify(mime: &str) -> AttachmentKind {
    if mime.starts_with("image/") {
        AttachmentKind::Image
    } else if mime.starts_with("audio/") {
        AttachmentKind::Audio
    } else if mime.starts_with("video/") {
        AttachmentKind::Video
    } else {
        AttachmentKind::File
    }
}

/// Whether an inline payload stored as `encoded_size` bytes must leave the
/// message.
pub fn should_externalize(encoded_size: usize) -> bool {
    encoded_size > INLINE_CEILING
}

/// Reduce an original file name to a safe lowercase fragment.
fn sanitize_name(name: &str) -> String {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    courier_core::refs::tokenize(stem).unwrap_or_else(|| "file".to_string())
}

fn extension_of(name: &str, mime: &str) -> String {
    if let Some((_, ext)) = name.rsplit_once('.') {
        if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_ascii_lowercase();
        }
    }
    // Fall back to the MIME subtype.
    mime.rsplit_once('/').map_or("bin", |(_, sub)| sub).to_string()
}

/// Build the on-disk attachment file name:
/// `att-{3-digit-serial}-{type}-{sanitizedName}.{ext}`.
pub fn build_filename(serial: u32, kind: AttachmentKind, sanitized: &str, ext: &str) -> String {
    format!("att-{serial:03}-{kind}-{sanitized}.{ext}")
}

/// Whether a directory entry name is an attachment blob.
pub fn is_attachment_name(name: &str) -> bool {
    name.starts_with("att-")
}

/// Result of externalizing one message.
pub struct Externalized {
    /// The message with oversized media blocks replaced by `file_ref`s.
    pub message: Message,
    /// Attachment files to commit alongside the log files.
    pub files: Vec<TreeFile>,
    /// Metadata for the newly created attachments.
    pub attachments: Vec<Attachment>,
}

fn externalize_block(
    name: String,
    mime: String,
    content: &str,
    extra: Map<String, Value>,
    serial: u32,
) -> Result<(PayloadBlock, TreeFile, Attachment), CourierError> {
    let bytes = BASE64.decode(content.as_bytes()).map_err(|e| {
        CourierError::Validation(format!("media block `{name}` is not valid base64: {e}"))
    })?;
    let filename = build_filename(
        serial,
        classify(&mime),
        &sanitize_name(&name),
        &extension_of(&name, &mime),
    );
    let size = bytes.len() as u64;
    let attachment = Attachment {
        name: filename.clone(),
        mime: mime.clone(),
        size,
        bytes: bytes.clone(),
    };
    let file = TreeFile::new(filename.clone(), bytes);
    let block = PayloadBlock::FileRef {
        name,
        mime,
        size,
        path: filename,
        extra,
    };
    Ok((block, file, attachment))
}

/// Externalize every oversized `media` block in `message`.
///
/// `next_serial` is one past the highest attachment serial already used in
/// the thread; serials stay unique and monotonically increasing even across
/// partition moves. Payloads stored at or under the inline ceiling stay
/// inline, unless the message's serialized line would exceed the log-file
/// ceiling, in which case media blocks are shed largest first until it fits.
pub fn externalize_message(
    message: Message,
    next_serial: u32,
) -> Result<Externalized, CourierError> {
    let mut serial = next_serial;
    let mut files = Vec::new();
    let mut attachments = Vec::new();
    let mut blocks = Vec::with_capacity(message.blocks.len());

    for block in message.blocks {
        match block {
            PayloadBlock::Media {
                name,
                mime,
                content,
                extra,
            } => {
                if should_externalize(content.len()) {
                    let (block, file, attachment) =
                        externalize_block(name, mime, &content, extra, serial)?;
                    serial += 1;
                    files.push(file);
                    attachments.push(attachment);
                    blocks.push(block);
                } else {
                    // Validate the encoding even for payloads staying inline.
                    BASE64.decode(content.as_bytes()).map_err(|e| {
                        CourierError::Validation(format!(
                            "media block `{name}` is not valid base64: {e}"
                        ))
                    })?;
                    blocks.push(PayloadBlock::Media {
                        name,
                        mime,
                        content,
                        extra,
                    });
                }
            }
            other => blocks.push(other),
        }
    }
    let mut message = Message { blocks, ..message };

    // Several sub-ceiling payloads can still exceed the log-file ceiling as
    // one serialized line.
    while format::message_line_len(&message)? > format::FILE_CEILING {
        let largest = message
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, block)| match block {
                PayloadBlock::Media { content, .. } => Some((i, content.len())),
                _ => None,
            })
            .max_by_key(|(_, len)| *len)
            .map(|(i, _)| i);
        let Some(idx) = largest else { break };
        if let PayloadBlock::Media {
            name,
            mime,
            content,
            extra,
        } = message.blocks.remove(idx)
        {
            let (block, file, attachment) =
                externalize_block(name, mime, &content, extra, serial)?;
            serial += 1;
            files.push(file);
            attachments.push(attachment);
            message.blocks.insert(idx, block);
        }
    }

    Ok(Externalized {
        message,
        files,
        attachments,
    })
}

/// Resolve a `thread://{threadRef}[/envelope|/latest]` locator against a
/// snapshot to a structured JSON view.
///
/// The bare form returns the whole thread (envelope plus messages);
/// `/envelope` returns the envelope alone; `/latest` the most recent
/// addressable message.
pub fn thread_view(
    snapshot: &ThreadSnapshot,
    uri: &str,
) -> Result<serde_json::Value, CourierError> {
    let not_found = || CourierError::NotFound {
        kind: "resource",
        reference: uri.to_string(),
    };
    let rest = uri.strip_prefix("thread://").ok_or_else(not_found)?;
    let (thread_ref, view) = match rest.split_once('/') {
        Some((thread_ref, view)) => (thread_ref, Some(view)),
        None => (rest, None),
    };
    if thread_ref != snapshot.envelope.thread_ref.as_str() {
        return Err(not_found());
    }

    let encode = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(|e| CourierError::Internal(format!("view encoding failed: {e}")))
    };
    match view {
        None => Ok(serde_json::json!({
            "envelope": encode(serde_json::to_value(&snapshot.envelope))?,
            "messages": encode(serde_json::to_value(&snapshot.messages))?,
        })),
        Some("envelope") => encode(serde_json::to_value(&snapshot.envelope)),
        Some("latest") => match snapshot.messages.iter().rev().find(|m| m.is_addressable()) {
            Some(message) => encode(serde_json::to_value(message)),
            None => Err(not_found()),
        },
        Some(_) => Err(not_found()),
    }
}

/// Process-wide registry mapping `content://` locators to attachment bytes.
///
/// Explicitly constructed and injected wherever threads are exposed to
/// consumers that must not receive large inline payloads; never a hidden
/// global. Entries are dropped per thread via `invalidate_thread`.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: DashMap<String, (Vec<u8>, String)>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn uri_for(thread_ref: &str, filename: &str) -> String {
        format!("content://{thread_ref}/{filename}")
    }

    /// Copy `snapshot` with every attachment (inline or external) replaced
    /// by a `content://{threadRef}/{filename}` locator, registering the
    /// underlying bytes for later retrieval by that locator.
    pub fn to_resource_uris(&self, snapshot: &ThreadSnapshot) -> ThreadSnapshot {
        let thread_ref = snapshot.envelope.thread_ref.as_str().to_string();
        // External attachments already have stable names on disk.
        for attachment in &snapshot.attachments {
            self.entries.insert(
                Self::uri_for(&thread_ref, &attachment.name),
                (attachment.bytes.clone(), attachment.mime.clone()),
            );
        }

        // Inline media gets locator names numbered past the externalized
        // attachments so the two can never collide.
        let mut inline_serial = snapshot.attachments.len() as u32;
        let messages = snapshot
            .messages
            .iter()
            .map(|message| {
                let blocks = message
                    .blocks
                    .iter()
                    .map(|block| match block {
                        PayloadBlock::Media {
                            name,
                            mime,
                            content,
                            extra,
                        } => match BASE64.decode(content.as_bytes()) {
                            Ok(bytes) => {
                                inline_serial += 1;
                                let filename = build_filename(
                                    inline_serial,
                                    classify(mime),
                                    &sanitize_name(name),
                                    &extension_of(name, mime),
                                );
                                let size = bytes.len() as u64;
                                let uri = Self::uri_for(&thread_ref, &filename);
                                self.entries.insert(uri.clone(), (bytes, mime.clone()));
                                PayloadBlock::FileRef {
                                    name: name.clone(),
                                    mime: mime.clone(),
                                    size,
                                    path: uri,
                                    extra: extra.clone(),
                                }
                            }
                            // An undecodable inline payload stays as-is and
                            // is never registered.
                            Err(_) => PayloadBlock::Media {
                                name: name.clone(),
                                mime: mime.clone(),
                                content: content.clone(),
                                extra: extra.clone(),
                            },
                        },
                        PayloadBlock::FileRef {
                            name,
                            mime,
                            size,
                            path,
                            extra,
                        } => PayloadBlock::FileRef {
                            name: name.clone(),
                            mime: mime.clone(),
                            size: *size,
                            path: Self::uri_for(&thread_ref, path),
                            extra: extra.clone(),
                        },
                        other => other.clone(),
                    })
                    .collect();
                Message {
                    blocks,
                    ..message.clone()
                }
            })
            .collect();

        ThreadSnapshot {
            envelope: snapshot.envelope.clone(),
            messages,
            attachments: snapshot.attachments.clone(),
        }
    }

    /// The bytes and MIME type behind a `content://` locator.
    pub fn resolve(&self, uri: &str) -> Result<(Vec<u8>, String), CourierError> {
        self.entries
            .get(uri)
            .map(|entry| entry.value().clone())
            .ok_or(CourierError::NotFound {
                kind: "resource",
                reference: uri.to_string(),
            })
    }

    /// Drop every registered locator belonging to `thread_ref`.
    pub fn invalidate_thread(&self, thread_ref: &str) {
        let prefix = format!("content://{thread_ref}/");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::types::{
        ActorId, Envelope, HistoryEntry, Priority, Status, ThreadRef,
    };
    use serde_json::Map;

    // 576 KiB of raw bytes encode to exactly the 768 KiB inline ceiling.
    const CEILING_RAW: usize = 576 * 1024;

    fn media_message(size: usize) -> Message {
        Message {
            from: ActorId("teague-phone".into()),
            received: Utc::now(),
            channel: None,
            re: None,
            message_ref: None,
            blocks: vec![PayloadBlock::Media {
                name: "Garage Door.JPG".into(),
                mime: "image/jpeg".into(),
                content: BASE64.encode(vec![0u8; size]),
                extra: Map::new(),
            }],
        }
    }

    fn sample_envelope() -> Envelope {
        let at = Utc::now();
        Envelope {
            thread_ref: ThreadRef("2026-02-01-001".into()),
            requestor: ActorId("agent-home".into()),
            executor: None,
            status: Status::Pending,
            created: at,
            updated: at,
            intent: "check garage door".into(),
            priority: Priority::Normal,
            history: vec![HistoryEntry {
                action: "created".into(),
                at,
                by: ActorId("agent-home".into()),
                message_ref: None,
            }],
        }
    }

    #[test]
    fn classify_by_mime_prefix() {
        assert_eq!(classify("image/png"), AttachmentKind::Image);
        assert_eq!(classify("audio/ogg"), AttachmentKind::Audio);
        assert_eq!(classify("video/mp4"), AttachmentKind::Video);
        assert_eq!(classify("application/pdf"), AttachmentKind::File);
        assert_eq!(classify("text/plain"), AttachmentKind::File);
    }

    #[test]
    fn payload_at_the_inline_ceiling_stays_inline() {
        let message = media_message(CEILING_RAW);
        let PayloadBlock::Media { content, .. } = &message.blocks[0] else {
            panic!("expected media");
        };
        assert_eq!(content.len(), INLINE_CEILING);

        let result = externalize_message(message, 1).unwrap();
        assert!(result.files.is_empty());
        assert!(matches!(result.message.blocks[0], PayloadBlock::Media { .. }));
    }

    #[test]
    fn payload_over_the_inline_ceiling_is_externalized() {
        let result = externalize_message(media_message(CEILING_RAW + 1), 1).unwrap();
        assert_eq!(result.files.len(), 1);
        let PayloadBlock::FileRef { size, path, mime, .. } = &result.message.blocks[0] else {
            panic!("expected file_ref");
        };
        assert_eq!(*size, (CEILING_RAW + 1) as u64);
        assert_eq!(mime, "image/jpeg");
        assert_eq!(path, "att-001-image-garage-door.jpg");
        assert_eq!(result.attachments[0].size, (CEILING_RAW + 1) as u64);
    }

    #[test]
    fn payload_whose_line_cannot_fit_is_externalized() {
        // 768 KiB of raw bytes encode to a full 1 MiB, which can never
        // share a log file with the envelope.
        let result = externalize_message(media_message(INLINE_CEILING), 1).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.attachments[0].size, INLINE_CEILING as u64);
        assert!(matches!(result.message.blocks[0], PayloadBlock::FileRef { .. }));
    }

    #[test]
    fn oversized_line_sheds_sub_ceiling_payloads_largest_first() {
        let message = Message {
            blocks: vec![
                media_message(500 * 1024).blocks.remove(0),
                media_message(560 * 1024).blocks.remove(0),
            ],
            ..media_message(0)
        };
        let result = externalize_message(message, 1).unwrap();
        // Each payload stores under the inline ceiling, but the pair would
        // serialize past the file ceiling; only the larger one leaves.
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.attachments[0].size, (560 * 1024) as u64);
        assert!(matches!(result.message.blocks[0], PayloadBlock::Media { .. }));
        assert!(matches!(result.message.blocks[1], PayloadBlock::FileRef { .. }));
    }

    #[test]
    fn attachment_serials_continue_from_caller() {
        let message = Message {
            blocks: vec![
                media_message(INLINE_CEILING + 1).blocks.remove(0),
                media_message(INLINE_CEILING + 2).blocks.remove(0),
            ],
            ..media_message(0)
        };
        let result = externalize_message(message, 3).unwrap();
        assert_eq!(result.files[0].path, "att-003-image-garage-door.jpg");
        assert_eq!(result.files[1].path, "att-004-image-garage-door.jpg");
    }

    #[test]
    fn bad_base64_is_a_validation_error() {
        let mut message = media_message(0);
        message.blocks[0] = PayloadBlock::Media {
            name: "x.bin".into(),
            mime: "application/octet-stream".into(),
            content: "!!not-base64!!".into(),
            extra: Map::new(),
        };
        assert!(matches!(
            externalize_message(message, 1),
            Err(CourierError::Validation(_))
        ));
    }

    #[test]
    fn undecodable_inline_media_is_left_in_place() {
        let mut message = media_message(0);
        message.blocks[0] = PayloadBlock::Media {
            name: "x.bin".into(),
            mime: "application/octet-stream".into(),
            content: "!!not-base64!!".into(),
            extra: Map::new(),
        };
        let snapshot = ThreadSnapshot {
            envelope: sample_envelope(),
            messages: vec![message],
            attachments: Vec::new(),
        };

        let registry = ResourceRegistry::new();
        let exposed = registry.to_resource_uris(&snapshot);
        assert!(matches!(
            exposed.messages[0].blocks[0],
            PayloadBlock::Media { .. }
        ));
        assert!(registry.entries.is_empty());
    }

    #[test]
    fn thread_views_resolve_by_suffix() {
        let mut reply = media_message(0);
        reply.blocks = vec![PayloadBlock::Reply {
            text: Some("done".into()),
            extra: serde_json::Map::new(),
        }];
        let snapshot = ThreadSnapshot {
            envelope: sample_envelope(),
            messages: vec![reply],
            attachments: Vec::new(),
        };

        let envelope_view = thread_view(&snapshot, "thread://2026-02-01-001/envelope").unwrap();
        assert_eq!(envelope_view["status"], "pending");

        let latest = thread_view(&snapshot, "thread://2026-02-01-001/latest").unwrap();
        assert_eq!(latest["blocks"][0]["text"], "done");

        let whole = thread_view(&snapshot, "thread://2026-02-01-001").unwrap();
        assert_eq!(whole["envelope"]["ref"], "2026-02-01-001");
        assert_eq!(whole["messages"].as_array().unwrap().len(), 1);

        assert!(thread_view(&snapshot, "thread://2026-02-01-002").is_err());
        assert!(thread_view(&snapshot, "thread://2026-02-01-001/bogus").is_err());
    }

    #[test]
    fn filename_shape() {
        assert_eq!(
            build_filename(7, AttachmentKind::Image, "garage-door", "jpg"),
            "att-007-image-garage-door.jpg"
        );
        assert!(is_attachment_name("att-007-image-garage-door.jpg"));
        assert!(!is_attachment_name("log-000.jsonl"));
    }
}
