// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Circuit breaker guarding the collector endpoint.
//!
//! ```text
//! CLOSED ──failure_threshold──> OPEN ──cooldown──> HALF_OPEN
//!   │                            │                    │
//!   └──────────────── success ───┴──── failure ──────┘
//! ```
//!
//! The breaker is a plain mutex-guarded value rather than an owned task: every
//! operation is O(1) and never touches I/O, and `before_request` is called
//! from inside the dispatcher's batch loop.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

/// Advisory delay returned while the half-open probe budget is exhausted.
/// A fixed heuristic, deliberately not derived from the backoff schedule.
const HALF_OPEN_SATURATED_DELAY: Duration = Duration::from_millis(200);

/// Breaker tuning. Immutable after construction.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
	/// Consecutive failures in `Closed` before tripping open.
	pub failure_threshold: u32,
	/// Cooldown after the first trip; doubles on every subsequent trip.
	pub base_cooldown: Duration,
	/// Ceiling for the exponential cooldown.
	pub max_cooldown: Duration,
	/// Symmetric jitter applied to each cooldown, as a fraction of the delay.
	pub jitter_ratio: f64,
	/// Probe requests allowed in flight while half-open.
	pub half_open_max_concurrent: u32,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 3,
			base_cooldown: Duration::from_secs(10),
			max_cooldown: Duration::from_secs(120),
			jitter_ratio: 0.2,
			half_open_max_concurrent: 1,
		}
	}
}

/// The externally observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug)]
struct Inner {
	state: BreakerState,
	consecutive_failures: u32,
	open_count: u32,
	open_until: Option<Instant>,
	half_open_in_flight: u32,
}

/// Failure-counting circuit breaker with exponential jittered cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
	config: BreakerConfig,
	inner: Mutex<Inner>,
}

impl CircuitBreaker {
	/// Creates a breaker in the `Closed` state. Out-of-range configuration is
	/// clamped rather than rejected.
	pub fn new(config: BreakerConfig) -> Self {
		let config = BreakerConfig {
			failure_threshold: config.failure_threshold.max(1),
			max_cooldown: config.max_cooldown.max(config.base_cooldown),
			jitter_ratio: config.jitter_ratio.max(0.0),
			half_open_max_concurrent: config.half_open_max_concurrent.max(1),
			..config
		};
		Self {
			config,
			inner: Mutex::new(Inner {
				state: BreakerState::Closed,
				consecutive_failures: 0,
				open_count: 0,
				open_until: None,
				half_open_in_flight: 0,
			}),
		}
	}

	/// Records a successful request: failures zero out and the breaker closes
	/// from any state.
	pub fn on_success(&self) {
		let mut inner = self.inner.lock().expect("breaker poisoned");
		inner.consecutive_failures = 0;
		if inner.state != BreakerState::Closed {
			info!(from = ?inner.state, "circuit breaker closed after success");
			inner.state = BreakerState::Closed;
			inner.open_until = None;
			inner.half_open_in_flight = 0;
		}
	}

	/// Records a retryable failure. Trips open at the threshold, or
	/// immediately when a half-open probe fails.
	pub fn on_failure(&self) {
		let mut inner = self.inner.lock().expect("breaker poisoned");
		inner.consecutive_failures += 1;
		match inner.state {
			BreakerState::Closed => {
				if inner.consecutive_failures >= self.config.failure_threshold {
					self.trip_open(&mut inner);
				}
			}
			BreakerState::HalfOpen => self.trip_open(&mut inner),
			BreakerState::Open => {}
		}
	}

	/// Records a non-retryable response (bad payload, oversize). Resets the
	/// failure streak without touching the state: a rejected request proves
	/// the endpoint is reachable. A half-open probe that ends this way is no
	/// longer outstanding, so its slot is released.
	pub fn on_non_retryable(&self) {
		let mut inner = self.inner.lock().expect("breaker poisoned");
		inner.consecutive_failures = 0;
		if inner.state == BreakerState::HalfOpen {
			inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
		}
	}

	/// Gate to call before every request. `Duration::ZERO` means proceed;
	/// anything larger is how long the caller should wait before asking again.
	pub fn before_request(&self) -> Duration {
		let mut inner = self.inner.lock().expect("breaker poisoned");
		match inner.state {
			BreakerState::Closed => Duration::ZERO,
			BreakerState::Open => {
				let until = inner.open_until.unwrap_or_else(Instant::now);
				let now = Instant::now();
				if now >= until {
					info!("circuit breaker half-open, probing");
					inner.state = BreakerState::HalfOpen;
					inner.half_open_in_flight = 1;
					Duration::ZERO
				} else {
					until - now
				}
			}
			BreakerState::HalfOpen => {
				if inner.half_open_in_flight >= self.config.half_open_max_concurrent {
					HALF_OPEN_SATURATED_DELAY
				} else {
					inner.half_open_in_flight += 1;
					Duration::ZERO
				}
			}
		}
	}

	/// The current state.
	pub fn state(&self) -> BreakerState {
		self.inner.lock().expect("breaker poisoned").state
	}

	/// Time remaining until an open breaker will allow a probe; zero when not
	/// open or when the cooldown has already elapsed.
	pub fn remaining_cooldown(&self) -> Duration {
		let inner = self.inner.lock().expect("breaker poisoned");
		match (inner.state, inner.open_until) {
			(BreakerState::Open, Some(until)) => until.saturating_duration_since(Instant::now()),
			_ => Duration::ZERO,
		}
	}

	fn trip_open(&self, inner: &mut Inner) {
		inner.open_count += 1;
		let exponent = inner.open_count.saturating_sub(1).min(31);
		let uncapped = self
			.config
			.base_cooldown
			.saturating_mul(1u32 << exponent);
		let capped = uncapped.min(self.config.max_cooldown);
		let delay = self.jittered(capped);

		info!(
			open_count = inner.open_count,
			cooldown_ms = delay.as_millis() as u64,
			"circuit breaker opened"
		);

		inner.state = BreakerState::Open;
		inner.open_until = Some(Instant::now() + delay);
		inner.consecutive_failures = 0;
		inner.half_open_in_flight = 0;
	}

	fn jittered(&self, delay: Duration) -> Duration {
		if self.config.jitter_ratio == 0.0 {
			return delay;
		}
		// Symmetric jitter in [-ratio, +ratio].
		let spread = self.config.jitter_ratio * (2.0 * fastrand::f64() - 1.0);
		let factor = (1.0 + spread).max(0.0);
		delay.mul_f64(factor)
	}
}
