// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enrichment: a semantic call plus identity, context and metadata becomes a
//! wire event.

use std::sync::Arc;

use chrono::Utc;
use metarouter_analytics_core::{
	message_id, wire_timestamp, Call, EnrichedEvent, Properties,
};
use serde_json::{Map, Value};

use crate::context::ContextProvider;
use crate::identity::IdentityStore;

/// Builds enriched events from raw calls.
///
/// Identify and group calls update the identity store as a side effect, so
/// later events carry the new identifiers.
pub struct Enricher {
	write_key: String,
	identity: Arc<IdentityStore>,
	context: Arc<dyn ContextProvider>,
}

impl Enricher {
	pub fn new(
		write_key: String,
		identity: Arc<IdentityStore>,
		context: Arc<dyn ContextProvider>,
	) -> Self {
		Self {
			write_key,
			identity,
			context,
		}
	}

	/// Enriches `call` into a wire event. A caller-supplied `timestamp` is
	/// taken verbatim; otherwise the current clock is stamped. `sent_at`
	/// stays unset until the dispatcher commits the event to an attempt.
	pub async fn enrich(&self, call: Call, timestamp: Option<String>) -> EnrichedEvent {
		// Capture the pre-call user id first: alias events report it as
		// `previousId`.
		let prior_user_id = self.identity.snapshot().await.user_id;

		match &call {
			Call::Identify { user_id, .. } => self.identity.set_user_id(user_id).await,
			Call::Group { group_id, .. } => self.identity.set_group_id(group_id).await,
			_ => {}
		}

		let identity = self.identity.snapshot().await;
		let context = self.context.context().await;
		let kind = call.kind();

		let mut event = EnrichedEvent {
			kind,
			event: None,
			name: None,
			anonymous_id: identity.anonymous_id,
			user_id: None,
			group_id: identity.group_id,
			properties: None,
			traits: None,
			integrations: None,
			timestamp: timestamp.unwrap_or_else(|| wire_timestamp(Utc::now())),
			sent_at: None,
			write_key: self.write_key.clone(),
			message_id: message_id(),
			context,
		};

		match call {
			Call::Track {
				event: event_name,
				properties,
			} => {
				event.event = Some(event_name);
				event.properties = non_empty(properties);
			}
			Call::Identify { user_id, traits } => {
				event.user_id = Some(user_id);
				event.traits = non_empty(traits);
			}
			Call::Group { group_id, traits } => {
				let mut properties = Map::new();
				if !group_id.is_empty() {
					properties.insert("groupId".to_string(), Value::String(group_id));
				}
				if !properties.is_empty() {
					event.properties = Some(properties);
				}
				event.traits = non_empty(traits);
			}
			Call::Screen { name, properties } => {
				event.name = Some(name.clone());
				event.properties = Some(named(properties, name));
			}
			Call::Page { name, properties } => {
				event.name = Some(name.clone());
				event.properties = Some(named(properties, name));
			}
			Call::Alias { new_user_id } => {
				event.user_id = Some(new_user_id);
				if let Some(previous) = prior_user_id {
					let mut properties = Map::new();
					properties.insert("previousId".to_string(), Value::String(previous));
					event.properties = Some(properties);
				}
			}
		}

		// Fill the user id from the identity snapshot when the call itself
		// did not carry one.
		if event.user_id.is_none() {
			event.user_id = identity.user_id;
		}

		event
	}
}

/// Empty property sets become absent wire fields, not `{}`.
fn non_empty(properties: Option<Properties>) -> Option<Map<String, Value>> {
	properties.and_then(|p| {
		if p.is_empty() {
			None
		} else {
			Some(p.into_map())
		}
	})
}

/// Merges the call's properties and assigns the screen/page name.
fn named(properties: Option<Properties>, name: String) -> Map<String, Value> {
	let mut map = properties.map(Properties::into_map).unwrap_or_default();
	map.insert("name".to_string(), Value::String(name));
	map
}
