// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context provider seam.
//!
//! Real implementations probe the platform (device model, screen metrics,
//! reachability) and are host-specific; the pipeline only requires that a
//! context record can be produced on demand and that a stale cache can be
//! dropped, e.g. after the advertising id changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use metarouter_analytics_core::Context;

/// Supplies the immutable context record stamped onto every event.
#[async_trait]
pub trait ContextProvider: Send + Sync {
	/// Returns the current context, materialising it if needed.
	async fn context(&self) -> Context;

	/// Drops any cached record so the next `context` call re-materialises.
	fn clear_cache(&self);
}

/// A provider over a fixed context record.
///
/// Suitable for server-side hosts and tests, where the environment does not
/// change underneath the process. The record is cached after the first
/// `context` call and rebuilt from the template after `clear_cache`.
pub struct StaticContextProvider {
	template: Context,
	cached: RwLock<Option<Context>>,
	fills: AtomicU64,
}

impl StaticContextProvider {
	pub fn new(template: Context) -> Self {
		Self {
			template,
			cached: RwLock::new(None),
			fills: AtomicU64::new(0),
		}
	}

	/// Number of cache fills performed; test observability.
	pub fn fill_count(&self) -> u64 {
		self.fills.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
	async fn context(&self) -> Context {
		if let Some(cached) = self.cached.read().expect("context cache poisoned").as_ref() {
			return cached.clone();
		}
		let mut slot = self.cached.write().expect("context cache poisoned");
		// Another caller may have filled the cache while we waited.
		if let Some(cached) = slot.as_ref() {
			return cached.clone();
		}
		self.fills.fetch_add(1, Ordering::Relaxed);
		*slot = Some(self.template.clone());
		self.template.clone()
	}

	fn clear_cache(&self) {
		*self.cached.write().expect("context cache poisoned") = None;
	}
}
