// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistent key-value seam for identifier storage.
//!
//! Platform embedders plug in whatever the host offers (UserDefaults,
//! SharedPreferences, a config directory). The SDK ships a process-local
//! memory store and a JSON-file store for desktop hosts.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;

/// String-keyed persistent storage. Removal deletes the key outright rather
/// than writing an empty value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
	async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Nothing survives the process; useful for tests and for
/// hosts that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
	inner: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.inner
			.write()
			.await
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.inner.write().await.remove(key);
		Ok(())
	}
}

/// JSON-file store: a single flat object map rewritten on every mutation.
///
/// Writes are serialised through an internal mutex; external writers to the
/// same file are outside the contract.
#[derive(Debug)]
pub struct FileKeyValueStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileKeyValueStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	async fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| StoreError::Serialization(e.to_string())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
			Err(e) => Err(StoreError::Io(e.to_string())),
		}
	}

	async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| StoreError::Io(e.to_string()))?;
		}
		let bytes = serde_json::to_vec_pretty(map)
			.map_err(|e| StoreError::Serialization(e.to_string()))?;
		tokio::fs::write(&self.path, bytes)
			.await
			.map_err(|e| StoreError::Io(e.to_string()))
	}
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.read_map().await?.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut map = self.read_map().await?;
		map.insert(key.to_string(), value.to_string());
		self.write_map(&map).await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut map = self.read_map().await?;
		if map.remove(key).is_none() {
			return Ok(());
		}
		self.write_map(&map).await
	}
}
