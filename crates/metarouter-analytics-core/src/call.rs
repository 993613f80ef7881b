// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The semantic analytics calls accepted by the public API.

use serde::{Deserialize, Serialize};

use crate::properties::Properties;

/// A raw semantic call, before identity and context enrichment.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	/// A named action the user performed.
	Track {
		event: String,
		properties: Option<Properties>,
	},
	/// Links the current anonymous session to a known user.
	Identify {
		user_id: String,
		traits: Option<Properties>,
	},
	/// Associates the current user with a group (organisation, account).
	Group {
		group_id: String,
		traits: Option<Properties>,
	},
	/// A screen view on mobile surfaces.
	Screen {
		name: String,
		properties: Option<Properties>,
	},
	/// A page view on web surfaces.
	Page {
		name: String,
		properties: Option<Properties>,
	},
	/// Renames the user id, preserving the prior id for stitching.
	Alias { new_user_id: String },
}

impl Call {
	/// Returns the wire kind tag for this call.
	pub fn kind(&self) -> CallKind {
		match self {
			Call::Track { .. } => CallKind::Track,
			Call::Identify { .. } => CallKind::Identify,
			Call::Group { .. } => CallKind::Group,
			Call::Screen { .. } => CallKind::Screen,
			Call::Page { .. } => CallKind::Page,
			Call::Alias { .. } => CallKind::Alias,
		}
	}
}

/// The `type` discriminator carried by every wire event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
	Track,
	Identify,
	Group,
	Screen,
	Page,
	Alias,
}

impl CallKind {
	/// Returns the lowercase wire representation.
	pub fn as_str(&self) -> &'static str {
		match self {
			CallKind::Track => "track",
			CallKind::Identify => "identify",
			CallKind::Group => "group",
			CallKind::Screen => "screen",
			CallKind::Page => "page",
			CallKind::Alias => "alias",
		}
	}
}

impl std::fmt::Display for CallKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}
