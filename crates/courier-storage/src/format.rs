// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk thread format.
//!
//! A thread in the current format is a directory of sequence-numbered
//! JSON-lines files (`log-000.jsonl`, `log-001.jsonl`, …) plus attachment
//! blobs. Each line is one tagged document; the envelope document lives only
//! in file `000`, as its first line. When appending a message would push the
//! current log file past the 1 MiB ceiling, a new sequence-numbered overflow
//! file is started instead. Readers concatenate all log files in ascending
//! numeric order before parsing, so overflow is invisible to callers.
//!
//! The legacy format is a single `{ref}.jsonl` file holding the same
//! document lines. Format dispatch is by what exists at the path (directory
//! vs file); migration happens on first mutation.

use courier_core::error::CourierError;
use courier_core::types::{Envelope, Message, TreeFile};
use serde::{Deserialize, Serialize};

/// Hard ceiling for one primary/overflow log file, chosen to match common
/// remote-API payload limits.
pub const FILE_CEILING: usize = 1024 * 1024;

/// Extension shared by the legacy single-file format and log files.
pub const LOG_EXT: &str = "jsonl";

/// One line of a thread log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doc", rename_all = "snake_case")]
pub enum Document {
    Envelope(Envelope),
    Message(Message),
}

/// The log file name for sequence number `seq`.
pub fn log_file_name(seq: u32) -> String {
    format!("log-{seq:03}.{LOG_EXT}")
}

/// Parse the sequence number out of a log file name.
pub fn parse_log_seq(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("log-")?.strip_suffix(".jsonl")?;
    if digits.len() == 3 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// The legacy single-file name for a thread ref.
pub fn legacy_file_name(thread_ref: &str) -> String {
    format!("{thread_ref}.{LOG_EXT}")
}

fn encode_line(document: &Document) -> Result<Vec<u8>, CourierError> {
    let mut line = serde_json::to_vec(document)
        .map_err(|e| CourierError::Internal(format!("document encoding failed: {e}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Serialized length of one message, as the document line it would occupy
/// in a log file, trailing newline included.
pub fn message_line_len(message: &Message) -> Result<usize, CourierError> {
    Ok(encode_line(&Document::Message(message.clone()))?.len())
}

/// Serialize a thread into its full set of log files.
///
/// Deterministic for a given `(envelope, messages)` pair: callers diff two
/// serializations to learn which files an append actually changed. Fails
/// with `SizeLimit` if any single document exceeds the file ceiling; large
/// payloads must have been externalized before serialization.
pub fn serialize_thread(
    envelope: &Envelope,
    messages: &[Message],
) -> Result<Vec<TreeFile>, CourierError> {
    let mut files: Vec<TreeFile> = Vec::new();
    let mut seq = 0u32;
    let mut current: Vec<u8> = encode_line(&Document::Envelope(envelope.clone()))?;

    for message in messages {
        let line = encode_line(&Document::Message(message.clone()))?;
        if line.len() > FILE_CEILING {
            return Err(CourierError::SizeLimit {
                limit: FILE_CEILING as u64,
                actual: line.len() as u64,
            });
        }
        if current.len() + line.len() > FILE_CEILING && !current.is_empty() {
            files.push(TreeFile::new(log_file_name(seq), std::mem::take(&mut current)));
            seq += 1;
        }
        current.extend_from_slice(&line);
    }
    files.push(TreeFile::new(log_file_name(seq), current));
    Ok(files)
}

/// Parse concatenated document lines into an envelope and its messages.
///
/// `path` is used only for error reporting.
pub fn parse_documents(bytes: &[u8], path: &str) -> Result<(Envelope, Vec<Message>), CourierError> {
    let text = std::str::from_utf8(bytes).map_err(|e| CourierError::Format {
        path: path.to_string(),
        detail: format!("not valid UTF-8: {e}"),
    })?;

    let mut envelope = None;
    let mut messages = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let document: Document =
            serde_json::from_str(line).map_err(|e| CourierError::Format {
                path: path.to_string(),
                detail: format!("line {}: {e}", lineno + 1),
            })?;
        match document {
            Document::Envelope(env) => {
                if envelope.is_some() {
                    return Err(CourierError::Format {
                        path: path.to_string(),
                        detail: format!("line {}: duplicate envelope document", lineno + 1),
                    });
                }
                envelope = Some(env);
            }
            Document::Message(message) => messages.push(message),
        }
    }

    let envelope = envelope.ok_or_else(|| CourierError::Format {
        path: path.to_string(),
        detail: "no envelope document".to_string(),
    })?;
    Ok((envelope, messages))
}

/// Which files differ between two serializations of the same thread.
///
/// An append rewrites only the envelope file and whatever log file the new
/// message landed in; unchanged overflow files and attachments are left
/// untouched.
pub fn changed_files(before: &[TreeFile], after: &[TreeFile]) -> Vec<TreeFile> {
    after
        .iter()
        .filter(|file| {
            before
                .iter()
                .find(|old| old.path == file.path)
                .is_none_or(|old| old.content != file.content)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::types::{
        ActorId, HistoryEntry, PayloadBlock, Priority, Status, ThreadRef,
    };
    use serde_json::Map;

    fn sample_envelope() -> Envelope {
        Envelope {
            thread_ref: ThreadRef("2026-02-01-001".into()),
            requestor: ActorId("agent-home".into()),
            executor: None,
            status: Status::Pending,
            created: Utc::now(),
            updated: Utc::now(),
            intent: "check garage door".into(),
            priority: Priority::Normal,
            history: vec![HistoryEntry {
                action: "created".into(),
                at: Utc::now(),
                by: ActorId("agent-home".into()),
                message_ref: None,
            }],
        }
    }

    fn reply(text: &str) -> Message {
        Message {
            from: ActorId("teague-phone".into()),
            received: Utc::now(),
            channel: None,
            re: None,
            message_ref: None,
            blocks: vec![PayloadBlock::Reply {
                text: Some(text.to_string()),
                extra: Map::new(),
            }],
        }
    }

    #[test]
    fn round_trip_single_file() {
        let envelope = sample_envelope();
        let messages = vec![reply("on my way"), reply("done")];
        let files = serialize_thread(&envelope, &messages).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "log-000.jsonl");

        let (parsed_env, parsed_msgs) = parse_documents(&files[0].content, "test").unwrap();
        assert_eq!(parsed_env, envelope);
        assert_eq!(parsed_msgs, messages);
    }

    #[test]
    fn round_trip_with_overflow() {
        let envelope = sample_envelope();
        // Each message is ~300 KiB serialized, so four of them overflow 1 MiB.
        let big = "x".repeat(300 * 1024);
        let messages: Vec<Message> = (0..4).map(|_| reply(&big)).collect();

        let files = serialize_thread(&envelope, &messages).unwrap();
        assert!(files.len() > 1, "expected overflow files");
        for file in &files {
            assert!(file.content.len() <= FILE_CEILING);
        }
        assert_eq!(files[0].path, "log-000.jsonl");
        assert_eq!(files[1].path, "log-001.jsonl");

        // Reading concatenates ascending, so overflow is invisible.
        let mut concatenated = Vec::new();
        for file in &files {
            concatenated.extend_from_slice(&file.content);
        }
        let (parsed_env, parsed_msgs) = parse_documents(&concatenated, "test").unwrap();
        assert_eq!(parsed_env, envelope);
        assert_eq!(parsed_msgs, messages);
    }

    #[test]
    fn envelope_lives_only_in_file_zero() {
        let envelope = sample_envelope();
        let big = "x".repeat(600 * 1024);
        let messages: Vec<Message> = (0..3).map(|_| reply(&big)).collect();
        let files = serialize_thread(&envelope, &messages).unwrap();
        assert!(files.len() > 1);
        for file in &files[1..] {
            let text = std::str::from_utf8(&file.content).unwrap();
            assert!(!text.contains(r#""doc":"envelope""#));
        }
    }

    #[test]
    fn oversized_document_is_rejected() {
        let envelope = sample_envelope();
        let messages = vec![reply(&"x".repeat(FILE_CEILING + 1))];
        assert!(matches!(
            serialize_thread(&envelope, &messages),
            Err(CourierError::SizeLimit { .. })
        ));
    }

    #[test]
    fn changed_files_reports_only_differences() {
        let envelope = sample_envelope();
        let mut messages = vec![reply("first")];
        let before = serialize_thread(&envelope, &messages).unwrap();
        messages.push(reply("second"));
        let after = serialize_thread(&envelope, &messages).unwrap();

        let changed = changed_files(&before, &after);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path, "log-000.jsonl");
    }

    #[test]
    fn corrupt_line_surfaces_format_error() {
        let bytes = b"{\"doc\":\"envelope\"\n";
        let err = parse_documents(bytes, "received/x").unwrap_err();
        assert!(matches!(err, CourierError::Format { .. }));
    }

    #[test]
    fn log_names_parse_back() {
        assert_eq!(log_file_name(0), "log-000.jsonl");
        assert_eq!(parse_log_seq("log-007.jsonl"), Some(7));
        assert_eq!(parse_log_seq("att-001-image-door.jpg"), None);
        assert_eq!(parse_log_seq("log-1.jsonl"), None);
    }
}
