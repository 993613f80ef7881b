// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Initialisation options and their validation.

use std::time::Duration;

use crate::error::ConfigError;

/// Default endpoint path appended to the ingestion host.
pub const ENDPOINT_PATH: &str = "/v1/batch";

/// Options accepted by `initialize`. String hosts are trimmed and stripped of
/// trailing slashes at construction time; validation happens at `initialize`
/// and is the SDK's only fail-fast surface.
#[derive(Debug, Clone)]
pub struct InitOptions {
	/// Tenant credential echoed into every event. Must be non-empty.
	pub write_key: String,
	/// Absolute collector URL without a trailing slash.
	pub ingestion_host: String,
	/// Marks the session for verbose diagnostics.
	pub debug: bool,
	/// Periodic flush interval, clamped to ≥ 1 second.
	pub flush_interval_seconds: u64,
	/// Event queue capacity, clamped to ≥ 1.
	pub max_queue_events: usize,
	/// Advertising identifier to persist and stamp into the device context.
	pub advertising_id: Option<String>,
}

impl InitOptions {
	/// Creates options with defaults, normalising the host string: leading and
	/// trailing whitespace is trimmed and trailing slashes are removed.
	pub fn new(write_key: impl Into<String>, ingestion_host: impl Into<String>) -> Self {
		let host = ingestion_host.into();
		let host = host.trim().trim_end_matches('/').to_string();
		Self {
			write_key: write_key.into().trim().to_string(),
			ingestion_host: host,
			debug: false,
			flush_interval_seconds: 10,
			max_queue_events: 2000,
			advertising_id: None,
		}
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn flush_interval_seconds(mut self, seconds: u64) -> Self {
		self.flush_interval_seconds = seconds;
		self
	}

	pub fn max_queue_events(mut self, capacity: usize) -> Self {
		self.max_queue_events = capacity;
		self
	}

	pub fn advertising_id(mut self, id: impl Into<String>) -> Self {
		self.advertising_id = Some(id.into());
		self
	}

	/// The flush interval with the ≥ 1 s clamp applied.
	pub fn flush_interval(&self) -> Duration {
		Duration::from_secs(self.flush_interval_seconds.max(1))
	}

	/// Validates the options, returning the fully joined collector endpoint.
	pub fn validate(&self) -> Result<String, ConfigError> {
		if self.write_key.trim().is_empty() {
			return Err(ConfigError::EmptyWriteKey);
		}
		let host = self.ingestion_host.trim();
		if host.ends_with('/') {
			return Err(ConfigError::TrailingSlashHost(host.to_string()));
		}
		let url = reqwest::Url::parse(host)
			.map_err(|_| ConfigError::InvalidHost(host.to_string()))?;
		if !url.has_host() {
			return Err(ConfigError::InvalidHost(host.to_string()));
		}
		Ok(format!("{host}{ENDPOINT_PATH}"))
	}
}
