// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity cache backed by the persistent key-value store.
//!
//! Four identifiers survive process restarts under fixed keys. The anonymous
//! id is minted on first use and only changes across a `reset`. All mutations
//! write through to the store; store failures are logged and the in-memory
//! value stays authoritative for the rest of the process.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::KeyValueStore;

pub const ANONYMOUS_ID_KEY: &str = "metarouter:anonymous_id";
pub const USER_ID_KEY: &str = "metarouter:user_id";
pub const GROUP_ID_KEY: &str = "metarouter:group_id";
pub const ADVERTISING_ID_KEY: &str = "metarouter:advertising_id";

/// A point-in-time copy of the identity fields, as stamped onto events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
	pub anonymous_id: String,
	pub user_id: Option<String>,
	pub group_id: Option<String>,
	pub advertising_id: Option<String>,
}

/// Serialised writer over the four persistent identifiers.
pub struct IdentityStore {
	store: Arc<dyn KeyValueStore>,
	inner: RwLock<Identity>,
}

impl IdentityStore {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self {
			store,
			inner: RwLock::new(Identity::default()),
		}
	}

	/// Loads all four identifiers from the store, minting and persisting a
	/// fresh anonymous id when none exists yet.
	pub async fn load(&self) {
		let mut identity = self.inner.write().await;

		identity.anonymous_id = match self.read(ANONYMOUS_ID_KEY).await {
			Some(existing) => existing,
			None => {
				let minted = Uuid::new_v4().to_string();
				debug!(anonymous_id = %minted, "minted new anonymous id");
				self.write(ANONYMOUS_ID_KEY, &minted).await;
				minted
			}
		};
		identity.user_id = self.read(USER_ID_KEY).await;
		identity.group_id = self.read(GROUP_ID_KEY).await;
		identity.advertising_id = self.read(ADVERTISING_ID_KEY).await;
	}

	/// Returns a copy of the current identity fields.
	pub async fn snapshot(&self) -> Identity {
		self.inner.read().await.clone()
	}

	/// Records the authenticated user id, writing through to the store.
	pub async fn set_user_id(&self, user_id: &str) {
		self.inner.write().await.user_id = Some(user_id.to_string());
		self.write(USER_ID_KEY, user_id).await;
	}

	/// Records the group id, writing through to the store.
	pub async fn set_group_id(&self, group_id: &str) {
		self.inner.write().await.group_id = Some(group_id.to_string());
		self.write(GROUP_ID_KEY, group_id).await;
	}

	/// Records or clears the advertising id, writing through to the store.
	pub async fn set_advertising_id(&self, advertising_id: Option<&str>) {
		self.inner.write().await.advertising_id = advertising_id.map(str::to_string);
		match advertising_id {
			Some(id) => self.write(ADVERTISING_ID_KEY, id).await,
			None => self.remove(ADVERTISING_ID_KEY).await,
		}
	}

	/// Clears the in-memory identity and removes all four persisted keys.
	/// The next `load` mints a fresh anonymous id.
	pub async fn reset(&self) {
		*self.inner.write().await = Identity::default();
		for key in [
			ANONYMOUS_ID_KEY,
			USER_ID_KEY,
			GROUP_ID_KEY,
			ADVERTISING_ID_KEY,
		] {
			self.remove(key).await;
		}
	}

	async fn read(&self, key: &str) -> Option<String> {
		match self.store.get(key).await {
			Ok(value) => value,
			Err(e) => {
				warn!(key, error = %e, "identity store read failed");
				None
			}
		}
	}

	async fn write(&self, key: &str, value: &str) {
		if let Err(e) = self.store.set(key, value).await {
			warn!(key, error = %e, "identity store write failed");
		}
	}

	async fn remove(&self, key: &str) {
		if let Err(e) = self.store.remove(key).await {
			warn!(key, error = %e, "identity store remove failed");
		}
	}
}
