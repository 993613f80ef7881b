// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The enriched wire event and the batch envelope POSTed upstream.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::call::CallKind;
use crate::context::Context;

/// Formats a timestamp the way the collector expects it: ISO-8601 UTC with
/// millisecond precision and a `Z` suffix.
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A fully enriched event: the queue element and the wire element.
///
/// Optional fields that were never set are omitted from the JSON entirely;
/// an empty property map is represented as an absent field, not `{}`.
/// `sent_at` stays unset until the dispatcher commits the event to a batch
/// attempt, at which point it is stamped with the attempt time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
	#[serde(rename = "type")]
	pub kind: CallKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub event: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub anonymous_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub group_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub properties: Option<Map<String, Value>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub traits: Option<Map<String, Value>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub integrations: Option<Map<String, Value>>,
	pub timestamp: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sent_at: Option<String>,
	pub write_key: String,
	pub message_id: String,
	pub context: Context,
}

/// The `{"batch": [...]}` envelope, borrowed for serialisation at drain time.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
	pub batch: &'a [EnrichedEvent],
}
