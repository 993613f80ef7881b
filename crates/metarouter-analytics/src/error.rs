// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics SDK.
//!
//! Delivery failures never surface to the calling application; they are
//! absorbed by the retry machinery and observable through logs and
//! [`crate::client::Analytics::debug_info`]. The only caller-visible failure
//! is initialisation with invalid options.

use thiserror::Error;

/// Rejected initialisation options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	/// The write key is empty (after trimming).
	#[error("write key must not be empty")]
	EmptyWriteKey,

	/// The ingestion host is not an absolute URL with a scheme.
	#[error("invalid ingestion host: {0}")]
	InvalidHost(String),

	/// The ingestion host ends with a `/`, which would double the slash in
	/// the endpoint path.
	#[error("ingestion host must not end with '/': {0}")]
	TrailingSlashHost(String),
}

/// Failures of the persistent key-value store backing identity.
///
/// Store failures are logged and tolerated: the identity cache keeps working
/// in memory for the rest of the process lifetime.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage i/o failed: {0}")]
	Io(String),

	#[error("storage serialization failed: {0}")]
	Serialization(String),
}

/// Result alias for the SDK's one fallible public operation.
pub type Result<T> = std::result::Result<T, ConfigError>;
