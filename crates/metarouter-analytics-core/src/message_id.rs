// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Message identifiers: `"{epoch_millis}-{uuid_v4}"`.
//!
//! The millisecond prefix makes ids roughly sortable by creation time while
//! the UUID suffix keeps them collision-free across devices.

use chrono::Utc;
use uuid::Uuid;

/// Mints a new message id from the current clock and a fresh v4 UUID.
pub fn message_id() -> String {
	format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4())
}

/// Returns true if `candidate` has the shape of a minted message id.
///
/// Accepts any string whose first dash-separated segment parses as a signed
/// 64-bit integer and whose remaining five segments form a lexically valid
/// UUID.
pub fn is_valid_message_id(candidate: &str) -> bool {
	let segments: Vec<&str> = candidate.split('-').collect();
	if segments.len() != 6 {
		return false;
	}
	if segments[0].parse::<i64>().is_err() {
		return false;
	}
	Uuid::parse_str(&segments[1..].join("-")).is_ok()
}

/// Extracts the embedded epoch-millisecond prefix, if the id is valid.
pub fn embedded_millis(candidate: &str) -> Option<i64> {
	if !is_valid_message_id(candidate) {
		return None;
	}
	candidate.split('-').next()?.parse().ok()
}
