// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP transport seam.
//!
//! The dispatcher only ever performs one kind of call: `POST` a JSON body and
//! read back status, headers and body. Keeping that behind a trait lets tests
//! script responses without a network (and keeps reqwest out of the policy
//! code entirely).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("metarouter-analytics-rust/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure, before any HTTP status exists.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("request timed out")]
	Timeout,

	#[error("connection failed: {0}")]
	Connect(String),

	#[error("i/o error: {0}")]
	Io(String),
}

/// Response headers with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct Headers {
	inner: HashMap<String, String>,
}

impl Headers {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores a header; the name is lowercased so lookups are
	/// case-insensitive.
	pub fn insert(&mut self, name: &str, value: impl Into<String>) {
		self.inner.insert(name.to_ascii_lowercase(), value.into());
	}

	/// Looks up a header by name, ignoring case.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.inner.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for Headers {
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		let mut headers = Headers::new();
		for (name, value) in iter {
			headers.insert(name.as_ref(), value);
		}
		headers
	}
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
	pub status: u16,
	pub headers: Headers,
	pub body: Vec<u8>,
}

/// The single HTTP operation the delivery pipeline needs.
#[async_trait]
pub trait HttpTransport: Send + Sync {
	/// POSTs `body` as `application/json` to `url`, honouring `timeout`.
	async fn post_json(
		&self,
		url: &str,
		body: Vec<u8>,
		timeout: Duration,
	) -> Result<TransportResponse, TransportError>;
}

/// Parses a `Retry-After` header into a delay.
///
/// Bare decimal digits are seconds; anything else is tried as an RFC 7231
/// HTTP-date, yielding the time remaining until that date (clamped at zero
/// when the date is in the past). Unparseable values yield `None`.
pub fn parse_retry_after(headers: &Headers) -> Option<Duration> {
	let value = headers.get("retry-after")?.trim();
	if value.is_empty() {
		return None;
	}
	if value.chars().all(|c| c.is_ascii_digit()) {
		return value.parse::<u64>().ok().map(Duration::from_secs);
	}
	let date = DateTime::parse_from_rfc2822(value).ok()?;
	let delta = date.with_timezone(&Utc) - Utc::now();
	Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Production transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
	client: reqwest::Client,
}

impl ReqwestTransport {
	/// Builds the transport with the SDK User-Agent.
	pub fn new() -> Self {
		let client = reqwest::Client::builder()
			.user_agent(USER_AGENT)
			.build()
			.expect("failed to build HTTP client");
		Self { client }
	}
}

impl Default for ReqwestTransport {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
	async fn post_json(
		&self,
		url: &str,
		body: Vec<u8>,
		timeout: Duration,
	) -> Result<TransportResponse, TransportError> {
		let response = self
			.client
			.post(url)
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.timeout(timeout)
			.body(body)
			.send()
			.await
			.map_err(classify)?;

		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.map(|(name, value)| {
				(
					name.as_str().to_string(),
					value.to_str().unwrap_or_default().to_string(),
				)
			})
			.collect();
		let body = response
			.bytes()
			.await
			.map_err(classify)?
			.to_vec();

		Ok(TransportResponse {
			status,
			headers,
			body,
		})
	}
}

fn classify(err: reqwest::Error) -> TransportError {
	if err.is_timeout() {
		TransportError::Timeout
	} else if err.is_connect() {
		TransportError::Connect(err.to_string())
	} else {
		TransportError::Io(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_lookup_is_case_insensitive() {
		let mut headers = Headers::new();
		headers.insert("Retry-After", "5");

		assert_eq!(headers.get("retry-after"), Some("5"));
		assert_eq!(headers.get("RETRY-AFTER"), Some("5"));
		assert_eq!(headers.get("Retry-After"), Some("5"));
		assert_eq!(headers.get("content-type"), None);
	}

	#[test]
	fn retry_after_decimal_seconds() {
		let headers: Headers = [("Retry-After", "3")].into_iter().collect();
		assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
	}

	#[test]
	fn retry_after_zero_is_zero() {
		let headers: Headers = [("retry-after", "0")].into_iter().collect();
		assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
	}

	#[test]
	fn retry_after_http_date_in_future() {
		let future = Utc::now() + chrono::Duration::seconds(30);
		let headers: Headers = [("Retry-After", future.to_rfc2822())].into_iter().collect();

		let delay = parse_retry_after(&headers).unwrap();
		assert!(delay > Duration::from_secs(25) && delay <= Duration::from_secs(31));
	}

	#[test]
	fn retry_after_http_date_in_past_clamps_to_zero() {
		let past = Utc::now() - chrono::Duration::seconds(30);
		let headers: Headers = [("Retry-After", past.to_rfc2822())].into_iter().collect();

		assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
	}

	#[test]
	fn retry_after_garbage_is_none() {
		let headers: Headers = [("Retry-After", "soon")].into_iter().collect();
		assert_eq!(parse_retry_after(&headers), None);

		let headers: Headers = [("Retry-After", "-3")].into_iter().collect();
		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn retry_after_absent_is_none() {
		assert_eq!(parse_retry_after(&Headers::new()), None);
	}
}
