// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The three-tier addressing scheme: canonical refs, sender-local ids, and
//! reply-to pointers.
//!
//! Thread refs follow `{date}-{3-digit-serial}[-{slug}]`; message refs are
//! `{threadRef}/{type}-{3-digit-serial}[-{slug}]`. Serials are minted one
//! past the maximum already in use, scanning across all partitions so a
//! thread that moved between partitions can never cause a collision.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::CourierError;
use crate::types::{ActorId, MessageRef, ThreadRef};

/// Maximum length of the human-readable slug appended to a generated ref.
const SLUG_MAX: usize = 24;

/// Lowercase `text`, collapse non-alphanumeric runs to single hyphens, and
/// trim to a bounded length. Returns `None` when nothing survives.
pub fn tokenize(text: &str) -> Option<String> {
    let mut slug = String::new();
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
        if slug.len() >= SLUG_MAX {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { None } else { Some(slug) }
}

/// Parse the `{date}-{serial}` head of a thread ref name. Returns the date
/// string and serial when the name follows the canonical grammar.
fn parse_thread_name(name: &str) -> Option<(&str, u32)> {
    // "YYYY-MM-DD-NNN" is 14 characters; a slug may follow after a hyphen.
    if !name.is_ascii() || name.len() < 14 {
        return None;
    }
    let (date, rest) = name.split_at(10);
    if !date
        .char_indices()
        .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() })
    {
        return None;
    }
    let rest = rest.strip_prefix('-')?;
    let serial_part = rest.get(..3)?;
    if !serial_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match rest.as_bytes().get(3) {
        None | Some(b'-') => serial_part.parse().ok().map(|s| (date, s)),
        Some(_) => None,
    }
}

/// Whether `text` is a canonical thread ref.
pub fn is_thread_ref(text: &str) -> bool {
    parse_thread_name(text).is_some()
}

/// Whether `text` is a canonical message ref (`{threadRef}/{type}-{serial}`).
pub fn is_message_ref(text: &str) -> bool {
    match text.split_once('/') {
        Some((thread, tail)) => is_thread_ref(thread) && !tail.is_empty(),
        None => false,
    }
}

/// Mint a thread ref for `date`, one past the highest serial already used
/// for that date among `existing` thread names from all partitions.
pub fn generate_thread_ref(
    date: NaiveDate,
    existing: &[String],
    local_id: Option<&str>,
) -> ThreadRef {
    let date_str = date.format("%Y-%m-%d").to_string();
    let max_serial = existing
        .iter()
        .filter_map(|name| parse_thread_name(name))
        .filter(|(d, _)| *d == date_str)
        .map(|(_, serial)| serial)
        .max()
        .unwrap_or(0);
    let mut reference = format!("{date_str}-{:03}", max_serial + 1);
    if let Some(slug) = local_id.and_then(tokenize) {
        reference.push('-');
        reference.push_str(&slug);
    }
    ThreadRef(reference)
}

/// Mint a message ref within `thread_ref`. The serial is the caller's
/// per-thread addressable-message counter; acks never reach this function.
pub fn generate_message_ref(
    thread_ref: &ThreadRef,
    message_type: &str,
    serial: u32,
    local_id: Option<&str>,
) -> MessageRef {
    let mut reference = format!("{thread_ref}/{message_type}-{serial:03}");
    if let Some(slug) = local_id.and_then(tokenize) {
        reference.push('-');
        reference.push_str(&slug);
    }
    MessageRef(reference)
}

/// Mutable resolution context: the ack-derived local-id mapping plus the
/// most recent ref each actor produced.
///
/// Modeled as an explicitly constructed, injectable service; the thread
/// store owns one and feeds it as acks are emitted.
#[derive(Debug, Default)]
pub struct RefContext {
    /// `(actor, local id) -> canonical ref`, from the most recent ack.
    acks: HashMap<(ActorId, String), String>,
    /// Most recent canonical ref each actor produced.
    last: HashMap<ActorId, String>,
}

impl RefContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mapping carried by a system ack.
    pub fn record_ack(&mut self, actor: &ActorId, local_id: Option<&str>, canonical: &str) {
        if let Some(local) = local_id {
            self.acks
                .insert((actor.clone(), local.to_string()), canonical.to_string());
        }
        self.last.insert(actor.clone(), canonical.to_string());
    }

    /// Resolve `reference` on behalf of `actor` to a canonical ref.
    ///
    /// Accepts a canonical thread or message ref, a sender-local id from a
    /// previous ack, or the literal token `last`.
    pub fn resolve(&self, reference: &str, actor: &ActorId) -> Result<String, CourierError> {
        if reference == "last" {
            return self.last.get(actor).cloned().ok_or(CourierError::NotFound {
                kind: "reference",
                reference: reference.to_string(),
            });
        }
        if is_thread_ref(reference) || is_message_ref(reference) {
            return Ok(reference.to_string());
        }
        self.acks
            .get(&(actor.clone(), reference.to_string()))
            .cloned()
            .ok_or(CourierError::NotFound {
                kind: "reference",
                reference: reference.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tokenize_collapses_and_bounds() {
        assert_eq!(tokenize("Check the Garage Door!"), Some("check-the-garage-door".into()));
        assert_eq!(tokenize("  ***  "), None);
        assert_eq!(tokenize("a__b--c"), Some("a-b-c".into()));
        let long = tokenize("the quick brown fox jumps over the lazy dog").unwrap();
        assert!(long.len() <= SLUG_MAX);
        assert!(!long.ends_with('-'));
    }

    proptest! {
        #[test]
        fn tokenize_output_is_always_canonical(input in ".*") {
            if let Some(slug) = tokenize(&input) {
                prop_assert!(slug.len() <= SLUG_MAX);
                prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
                prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || c == '-'));
                prop_assert!(!slug.contains("--"));
            }
        }
    }

    #[test]
    fn thread_serial_scans_across_partitions() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let existing = vec![
            "2026-02-01-001".to_string(),
            "2026-02-01-003-garage".to_string(),
            "2026-01-31-007".to_string(),
            "notes.txt".to_string(),
        ];
        let reference = generate_thread_ref(date, &existing, None);
        assert_eq!(reference.as_str(), "2026-02-01-004");
    }

    #[test]
    fn first_thread_of_a_day_gets_serial_one() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let reference = generate_thread_ref(date, &[], Some("Garage Door"));
        assert_eq!(reference.as_str(), "2026-02-01-001-garage-door");
    }

    #[test]
    fn message_ref_carries_type_and_serial() {
        let thread = ThreadRef("2026-02-01-001".into());
        let mref = generate_message_ref(&thread, "response", 2, None);
        assert_eq!(mref.as_str(), "2026-02-01-001/response-002");
        assert!(is_message_ref(mref.as_str()));
    }

    #[test]
    fn resolve_prefers_canonical_then_ack_then_fails() {
        let mut ctx = RefContext::new();
        let agent = ActorId("agent-home".into());
        ctx.record_ack(&agent, Some("my-req-1"), "2026-02-01-001");

        assert_eq!(
            ctx.resolve("2026-02-01-001", &agent).unwrap(),
            "2026-02-01-001"
        );
        assert_eq!(ctx.resolve("my-req-1", &agent).unwrap(), "2026-02-01-001");
        assert_eq!(ctx.resolve("last", &agent).unwrap(), "2026-02-01-001");

        let stranger = ActorId("roomba".into());
        assert!(matches!(
            ctx.resolve("my-req-1", &stranger),
            Err(CourierError::NotFound { .. })
        ));
        assert!(matches!(
            ctx.resolve("last", &stranger),
            Err(CourierError::NotFound { .. })
        ));
    }
}
