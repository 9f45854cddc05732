// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixture builders shared across integration tests.

use chrono::{DateTime, TimeZone, Utc};
use courier_core::types::{ActorId, PayloadBlock, Status};
use courier_storage::store::{AppendRequest, CreateRequest};
use serde_json::Map;

/// A fixed "now" so minted refs are stable: 2026-02-01 08:00 UTC.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
}

/// A create request pinned to [`fixed_time`].
pub fn create_request(requestor: &str, intent: &str) -> CreateRequest {
    let mut request = CreateRequest::new(ActorId(requestor.to_string()), intent);
    request.at = Some(fixed_time());
    request
}

/// An append that requests a status change.
pub fn status_append(status: Status) -> AppendRequest {
    let mut request = AppendRequest::new(vec![PayloadBlock::Status {
        status,
        extra: Map::new(),
    }]);
    request.at = Some(fixed_time());
    request
}

/// An append carrying one free-form reply.
pub fn reply_append(text: &str) -> AppendRequest {
    let mut request = AppendRequest::new(vec![PayloadBlock::Reply {
        text: Some(text.to_string()),
        extra: Map::new(),
    }]);
    request.at = Some(fixed_time());
    request
}
