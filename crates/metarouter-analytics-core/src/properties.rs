// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Builder for event properties and identity traits.

use serde_json::{Map, Value};

/// A builder for the free-form property and trait maps attached to events.
///
/// Keys are unique; inserting an existing key overwrites it. Member order is
/// not observable on the wire.
///
/// # Example
///
/// ```
/// use metarouter_analytics_core::Properties;
///
/// let props = Properties::new()
///     .insert("plan", "enterprise")
///     .insert("seats", 42)
///     .insert("trial", false);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	/// Creates an empty property set.
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair, overwriting any existing value for the key.
	///
	/// The value can be any type that converts into `serde_json::Value`,
	/// including nested arrays and objects.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Merges another property set into this one; `other` wins on key clashes.
	pub fn merge(mut self, other: Properties) -> Self {
		for (k, v) in other.inner {
			self.inner.insert(k, v);
		}
		self
	}

	/// Returns true if no properties have been set.
	///
	/// An empty set is distinguishable from an absent one: the enrichment
	/// stage omits empty sets from the wire event entirely.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Returns the number of properties.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Gets a value by key.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	/// Consumes the builder, returning the underlying JSON object map.
	pub fn into_map(self) -> Map<String, Value> {
		self.inner
	}
}

impl From<Properties> for Value {
	fn from(props: Properties) -> Self {
		Value::Object(props.inner)
	}
}

impl From<Map<String, Value>> for Properties {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			_ => Self::new(),
		}
	}
}
