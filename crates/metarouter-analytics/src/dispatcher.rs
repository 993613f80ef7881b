// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The batching dispatcher: owns the queue, the breaker, the flush timer and
//! the HTTP-status retry policy.
//!
//! One flush runs at a time (`flush_in_flight`); re-entrant flush calls return
//! immediately. The loop drains a batch, stamps `sentAt`, POSTs, and reacts
//! per status class:
//!
//! | status        | breaker          | queue            | then              |
//! |---------------|------------------|------------------|-------------------|
//! | 2xx           | success          | removed          | next batch        |
//! | 408, 5xx      | failure          | requeue to front | retry ≥ 100 ms    |
//! | 429           | failure          | requeue to front | retry ≥ 1 s       |
//! | 413           | non-retryable    | requeue + halve  | retry immediately |
//! | 401, 403, 404 | untouched        | cleared          | disabled          |
//! | other 4xx     | non-retryable    | dropped          | next batch        |

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metarouter_analytics_core::{wire_timestamp, BatchPayload, EnrichedEvent};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::queue::EventQueue;
use crate::transport::{parse_retry_after, HttpTransport, TransportResponse};

/// Floor for every failure-driven retry delay.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Floor for throttle (429) retries.
const MIN_THROTTLE_DELAY: Duration = Duration::from_millis(1000);

/// Invoked once, with the offending status, when the collector rejects the
/// client configuration outright (401/403/404).
pub type FatalConfigHandler = Box<dyn Fn(u16) + Send + Sync>;

/// Dispatcher tuning. `endpoint` is the fully joined collector URL.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	pub endpoint: String,
	pub timeout: Duration,
	pub auto_flush_threshold: usize,
	pub initial_max_batch_size: usize,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			endpoint: String::new(),
			timeout: Duration::from_millis(8000),
			auto_flush_threshold: 20,
			initial_max_batch_size: 100,
		}
	}
}

/// Point-in-time dispatcher observability.
#[derive(Debug, Clone)]
pub struct DispatcherDebug {
	pub queue_len: usize,
	pub flush_in_flight: bool,
	pub breaker_state: BreakerState,
	pub remaining_cooldown: Duration,
	pub max_batch_size: usize,
}

/// What the status policy decided about the batch just attempted.
enum Flow {
	/// Batch resolved; keep draining.
	Continue,
	/// Batch requeued by the 413 shrink path; keep draining and skip the
	/// breaker gate for the immediately following attempt.
	ContinueSkipBreaker,
	/// Batch requeued; leave the loop and come back after the delay.
	Retry(Duration),
	/// Fatal configuration; delivery is over until a reset.
	Stop,
}

pub struct Dispatcher {
	inner: Arc<Inner>,
}

struct Inner {
	config: DispatcherConfig,
	queue: EventQueue,
	breaker: CircuitBreaker,
	transport: Arc<dyn HttpTransport>,
	max_batch_size: AtomicUsize,
	flush_in_flight: AtomicBool,
	/// Bumped by `reset`; an in-flight batch whose generation is stale is
	/// dropped on completion instead of requeued.
	generation: AtomicU64,
	stopped: AtomicBool,
	retry_task: Mutex<Option<JoinHandle<()>>>,
	flush_task: Mutex<Option<JoinHandle<()>>>,
	fatal_handler: Mutex<Option<FatalConfigHandler>>,
	fatal_fired: AtomicBool,
}

impl Dispatcher {
	pub fn new(
		config: DispatcherConfig,
		queue: EventQueue,
		breaker: CircuitBreaker,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		let initial_max = config.initial_max_batch_size.max(1);
		Self {
			inner: Arc::new(Inner {
				config,
				queue,
				breaker,
				transport,
				max_batch_size: AtomicUsize::new(initial_max),
				flush_in_flight: AtomicBool::new(false),
				generation: AtomicU64::new(0),
				stopped: AtomicBool::new(false),
				retry_task: Mutex::new(None),
				flush_task: Mutex::new(None),
				fatal_handler: Mutex::new(None),
				fatal_fired: AtomicBool::new(false),
			}),
		}
	}

	/// Registers the callback fired once on the first 401/403/404 response.
	pub fn set_fatal_config_handler(&self, handler: FatalConfigHandler) {
		*self.inner.fatal_handler.lock().expect("handler poisoned") = Some(handler);
	}

	/// Enqueues an event; crossing the auto-flush threshold kicks off a
	/// background flush.
	pub fn offer(&self, event: EnrichedEvent) {
		if self.inner.stopped.load(Ordering::SeqCst) {
			debug!(message_id = %event.message_id, "dispatcher stopped, dropping event");
			return;
		}
		self.inner.queue.enqueue(event);
		if self.inner.queue.len() >= self.inner.config.auto_flush_threshold
			&& !self.inner.flush_in_flight.load(Ordering::SeqCst)
		{
			let inner = Arc::clone(&self.inner);
			tokio::spawn(async move { Inner::flush(inner).await });
		}
	}

	/// Drains the queue until empty, a retry is scheduled, or delivery stops.
	/// Returns immediately when a flush is already in progress.
	pub async fn flush(&self) {
		Inner::flush(Arc::clone(&self.inner)).await;
	}

	/// Starts (or restarts) the periodic flush timer.
	pub fn start_flush_loop(&self, interval: Duration) {
		let interval = interval.max(Duration::from_secs(1));
		let inner = Arc::clone(&self.inner);
		let mut slot = self.inner.flush_task.lock().expect("flush task poisoned");
		if let Some(prior) = slot.take() {
			prior.abort();
		}
		debug!(interval_secs = interval.as_secs(), "starting flush loop");
		*slot = Some(tokio::spawn(async move {
			loop {
				tokio::time::sleep(interval).await;
				Inner::flush(Arc::clone(&inner)).await;
			}
		}));
	}

	/// Cancels the periodic flush timer.
	pub fn stop_flush_loop(&self) {
		if let Some(task) = self
			.inner
			.flush_task
			.lock()
			.expect("flush task poisoned")
			.take()
		{
			task.abort();
		}
	}

	/// Cancels a pending backoff-scheduled retry, if any.
	pub fn cancel_scheduled_retry(&self) {
		if let Some(task) = self
			.inner
			.retry_task
			.lock()
			.expect("retry task poisoned")
			.take()
		{
			task.abort();
		}
	}

	/// Empties the queue.
	pub fn clear_all(&self) {
		self.inner.queue.clear();
	}

	/// Tears delivery down for a lifecycle reset: any in-flight batch is
	/// dropped on completion, timers and retries are cancelled, the queue is
	/// emptied.
	pub fn reset(&self) {
		self.inner.generation.fetch_add(1, Ordering::SeqCst);
		self.stop_flush_loop();
		self.cancel_scheduled_retry();
		self.clear_all();
	}

	/// Current observability snapshot.
	pub fn debug_info(&self) -> DispatcherDebug {
		DispatcherDebug {
			queue_len: self.inner.queue.len(),
			flush_in_flight: self.inner.flush_in_flight.load(Ordering::SeqCst),
			breaker_state: self.inner.breaker.state(),
			remaining_cooldown: self.inner.breaker.remaining_cooldown(),
			max_batch_size: self.inner.max_batch_size.load(Ordering::SeqCst),
		}
	}

	/// Queue length, for the auto-flush threshold and debug info.
	pub fn queue_len(&self) -> usize {
		self.inner.queue.len()
	}
}

impl Inner {
	async fn flush(self: Arc<Self>) {
		if self.flush_in_flight.swap(true, Ordering::SeqCst) {
			return;
		}
		Inner::process_until_empty(&self).await;
		self.flush_in_flight.store(false, Ordering::SeqCst);
	}

	async fn process_until_empty(this: &Arc<Self>) {
		let mut skip_breaker_once = false;
		loop {
			if this.stopped.load(Ordering::SeqCst) || this.queue.is_empty() {
				return;
			}

			if !skip_breaker_once {
				let wait = this.breaker.before_request();
				if wait > Duration::ZERO {
					Inner::schedule_retry(this, wait);
					return;
				}
			}
			skip_breaker_once = false;

			let max = this.max_batch_size.load(Ordering::SeqCst);
			let mut batch = this.queue.drain(max);
			if batch.is_empty() {
				return;
			}

			// sentAt reflects this attempt, not enqueue time; a requeued
			// batch gets a fresh stamp on its next attempt.
			let sent_at = wire_timestamp(Utc::now());
			for event in &mut batch {
				event.sent_at = Some(sent_at.clone());
			}

			let body = match serde_json::to_vec(&BatchPayload { batch: &batch }) {
				Ok(body) => body,
				Err(e) => {
					error!(
						count = batch.len(),
						error = %e,
						"batch serialisation failed, dropping batch"
					);
					continue;
				}
			};

			debug!(
				count = batch.len(),
				bytes = body.len(),
				"sending batch"
			);

			let generation = this.generation.load(Ordering::SeqCst);
			let result = this
				.transport
				.post_json(&this.config.endpoint, body, this.config.timeout)
				.await;

			if this.generation.load(Ordering::SeqCst) != generation {
				debug!(count = batch.len(), "reset during flight, dropping batch");
				return;
			}

			match result {
				Err(e) => {
					warn!(error = %e, count = batch.len(), "transport failure, requeueing batch");
					this.breaker.on_failure();
					this.queue.requeue_to_front(batch);
					let delay = this.breaker.before_request().max(MIN_RETRY_DELAY);
					Inner::schedule_retry(this, delay);
					return;
				}
				Ok(response) => match this.handle_response(response, batch) {
					Flow::Continue => {}
					Flow::ContinueSkipBreaker => skip_breaker_once = true,
					Flow::Retry(delay) => {
						Inner::schedule_retry(this, delay);
						return;
					}
					Flow::Stop => return,
				},
			}
		}
	}

	fn handle_response(
		&self,
		response: TransportResponse,
		batch: Vec<EnrichedEvent>,
	) -> Flow {
		let status = response.status;
		match status {
			200..=299 => {
				debug!(status, count = batch.len(), "batch delivered");
				self.breaker.on_success();
				Flow::Continue
			}
			408 | 500..=599 => {
				warn!(status, count = batch.len(), "retryable server error, requeueing batch");
				self.breaker.on_failure();
				self.queue.requeue_to_front(batch);
				let delay = parse_retry_after(&response.headers)
					.unwrap_or_else(|| self.breaker.before_request())
					.max(MIN_RETRY_DELAY);
				Flow::Retry(delay)
			}
			429 => {
				warn!(status, count = batch.len(), "throttled, requeueing batch");
				self.breaker.on_failure();
				self.queue.requeue_to_front(batch);
				let delay = parse_retry_after(&response.headers)
					.unwrap_or(Duration::ZERO)
					.max(self.breaker.before_request())
					.max(MIN_THROTTLE_DELAY);
				Flow::Retry(delay)
			}
			413 => {
				self.breaker.on_non_retryable();
				let max = self.max_batch_size.load(Ordering::SeqCst);
				if max > 1 {
					let halved = (max / 2).max(1);
					self.max_batch_size.store(halved, Ordering::SeqCst);
					warn!(
						status,
						from = max,
						to = halved,
						"payload too large, shrinking batch size and retrying"
					);
					self.queue.requeue_to_front(batch);
					Flow::ContinueSkipBreaker
				} else {
					let message_ids: Vec<&str> =
						batch.iter().map(|e| e.message_id.as_str()).collect();
					warn!(
						status,
						?message_ids,
						"payload too large at batch size 1, dropping event"
					);
					Flow::Continue
				}
			}
			401 | 403 | 404 => {
				error!(status, "fatal configuration response, disabling delivery");
				self.queue.clear();
				self.stopped.store(true, Ordering::SeqCst);
				if !self.fatal_fired.swap(true, Ordering::SeqCst) {
					if let Some(handler) =
						self.fatal_handler.lock().expect("handler poisoned").as_ref()
					{
						handler(status);
					}
				}
				Flow::Stop
			}
			_ => {
				warn!(status, count = batch.len(), "non-retryable response, dropping batch");
				self.breaker.on_non_retryable();
				Flow::Continue
			}
		}
	}

	/// Replaces any pending retry with one that fires after `delay`.
	fn schedule_retry(this: &Arc<Self>, delay: Duration) {
		let mut slot = this.retry_task.lock().expect("retry task poisoned");
		if let Some(prior) = slot.take() {
			prior.abort();
		}
		if this.stopped.load(Ordering::SeqCst) {
			return;
		}
		debug!(delay_ms = delay.as_millis() as u64, "scheduling retry");
		let inner = Arc::clone(this);
		*slot = Some(tokio::spawn(async move {
			if delay > Duration::ZERO {
				tokio::time::sleep(delay).await;
			}
			Inner::flush(inner).await;
		}));
	}
}

impl Drop for Dispatcher {
	fn drop(&mut self) {
		self.stop_flush_loop();
		self.cancel_scheduled_retry();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::breaker::BreakerConfig;
	use crate::queue::OverflowPolicy;
	use crate::transport::{Headers, TransportError};
	use async_trait::async_trait;
	use metarouter_analytics_core::{message_id, CallKind, Context};
	use std::collections::VecDeque;

	fn event(tag: &str) -> EnrichedEvent {
		EnrichedEvent {
			kind: CallKind::Track,
			event: Some(tag.to_string()),
			name: None,
			anonymous_id: "anon".to_string(),
			user_id: None,
			group_id: None,
			properties: None,
			traits: None,
			integrations: None,
			timestamp: wire_timestamp(Utc::now()),
			sent_at: None,
			write_key: "wk".to_string(),
			message_id: message_id(),
			context: Context::default(),
		}
	}

	/// Scripted transport: pops one canned response per request and records
	/// every request body.
	struct ScriptedTransport {
		script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
		requests: Mutex<Vec<Vec<u8>>>,
	}

	impl ScriptedTransport {
		fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
			Arc::new(Self {
				script: Mutex::new(script.into()),
				requests: Mutex::new(Vec::new()),
			})
		}

		fn response(status: u16) -> Result<TransportResponse, TransportError> {
			Ok(TransportResponse {
				status,
				headers: Headers::new(),
				body: Vec::new(),
			})
		}

		fn response_with_headers(
			status: u16,
			headers: Headers,
		) -> Result<TransportResponse, TransportError> {
			Ok(TransportResponse {
				status,
				headers,
				body: Vec::new(),
			})
		}

		fn request_count(&self) -> usize {
			self.requests.lock().unwrap().len()
		}

		fn batch_events(&self, request: usize) -> Vec<String> {
			let requests = self.requests.lock().unwrap();
			let json: serde_json::Value = serde_json::from_slice(&requests[request]).unwrap();
			json["batch"]
				.as_array()
				.unwrap()
				.iter()
				.map(|e| e["event"].as_str().unwrap().to_string())
				.collect()
		}

		fn batch_sent_at(&self, request: usize) -> Vec<String> {
			let requests = self.requests.lock().unwrap();
			let json: serde_json::Value = serde_json::from_slice(&requests[request]).unwrap();
			json["batch"]
				.as_array()
				.unwrap()
				.iter()
				.map(|e| e["sentAt"].as_str().unwrap().to_string())
				.collect()
		}
	}

	#[async_trait]
	impl HttpTransport for ScriptedTransport {
		async fn post_json(
			&self,
			_url: &str,
			body: Vec<u8>,
			_timeout: Duration,
		) -> Result<TransportResponse, TransportError> {
			self.requests.lock().unwrap().push(body);
			self.script
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or_else(|| ScriptedTransport::response(200))
		}
	}

	fn dispatcher(transport: Arc<ScriptedTransport>) -> Dispatcher {
		dispatcher_with(transport, BreakerConfig::default(), 100)
	}

	fn dispatcher_with(
		transport: Arc<ScriptedTransport>,
		breaker: BreakerConfig,
		initial_max_batch_size: usize,
	) -> Dispatcher {
		Dispatcher::new(
			DispatcherConfig {
				endpoint: "https://collector.test/v1/batch".to_string(),
				timeout: Duration::from_millis(8000),
				auto_flush_threshold: 20,
				initial_max_batch_size,
			},
			EventQueue::new(2000, OverflowPolicy::DropOldest),
			CircuitBreaker::new(breaker),
			transport,
		)
	}

	#[tokio::test]
	async fn delivers_queue_in_order_on_success() {
		let transport = ScriptedTransport::new(vec![]);
		let dispatcher = dispatcher(transport.clone());

		for tag in ["a", "b", "c"] {
			dispatcher.offer(event(tag));
		}
		dispatcher.flush().await;

		assert_eq!(transport.request_count(), 1);
		assert_eq!(transport.batch_events(0), vec!["a", "b", "c"]);
		assert_eq!(dispatcher.queue_len(), 0);
		assert_eq!(dispatcher.debug_info().breaker_state, BreakerState::Closed);
	}

	#[tokio::test]
	async fn splits_batches_at_max_batch_size() {
		let transport = ScriptedTransport::new(vec![]);
		let dispatcher = dispatcher_with(transport.clone(), BreakerConfig::default(), 2);

		for tag in ["a", "b", "c"] {
			dispatcher.offer(event(tag));
		}
		dispatcher.flush().await;

		assert_eq!(transport.request_count(), 2);
		assert_eq!(transport.batch_events(0), vec!["a", "b"]);
		assert_eq!(transport.batch_events(1), vec!["c"]);
	}

	#[tokio::test]
	async fn stamps_fresh_sent_at_per_attempt() {
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response(500),
			ScriptedTransport::response(200),
		]);
		let breaker = BreakerConfig {
			failure_threshold: 5,
			base_cooldown: Duration::from_millis(10),
			..BreakerConfig::default()
		};
		let dispatcher = dispatcher_with(transport.clone(), breaker, 100);

		for tag in ["a", "b", "c"] {
			dispatcher.offer(event(tag));
		}
		dispatcher.flush().await;

		// First attempt failed; the batch is requeued and a retry scheduled.
		assert_eq!(transport.request_count(), 1);
		assert_eq!(dispatcher.queue_len(), 3);

		// Wait for the scheduled retry (floor 100ms) to fire and succeed.
		tokio::time::sleep(Duration::from_millis(400)).await;
		assert_eq!(transport.request_count(), 2);
		assert_eq!(dispatcher.queue_len(), 0);

		// Same three events, same order, fresh sentAt.
		assert_eq!(transport.batch_events(1), vec!["a", "b", "c"]);
		assert_ne!(transport.batch_sent_at(0), transport.batch_sent_at(1));
	}

	#[tokio::test]
	async fn transport_failure_requeues_and_counts_toward_breaker() {
		let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
		let breaker = BreakerConfig {
			failure_threshold: 1,
			base_cooldown: Duration::from_secs(60),
			jitter_ratio: 0.0,
			..BreakerConfig::default()
		};
		let dispatcher = dispatcher_with(transport.clone(), breaker, 100);

		dispatcher.offer(event("a"));
		dispatcher.flush().await;

		assert_eq!(dispatcher.queue_len(), 1);
		assert_eq!(dispatcher.debug_info().breaker_state, BreakerState::Open);
		dispatcher.cancel_scheduled_retry();
	}

	#[tokio::test]
	async fn shrinks_batch_size_through_413_chain() {
		// Seven 413s walk 100 -> 50 -> 25 -> 12 -> 6 -> 3 -> 1, then the
		// final 413 at size 1 drops the head event.
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
			ScriptedTransport::response(413),
		]);
		let dispatcher = dispatcher_with(transport.clone(), BreakerConfig::default(), 100);

		for i in 0..100 {
			dispatcher.offer(event(&format!("e{i}")));
		}
		dispatcher.flush().await;

		// Batch sizes observed per attempt.
		let sizes: Vec<usize> = (0..transport.request_count())
			.map(|i| transport.batch_events(i).len())
			.collect();
		assert_eq!(sizes[..7], [100, 50, 25, 12, 6, 3, 1]);
		assert_eq!(dispatcher.debug_info().max_batch_size, 1);

		// The size-1 drop lost exactly one event; the rest were delivered by
		// the default-200 tail of the script.
		assert_eq!(dispatcher.queue_len(), 0);
		let delivered: usize = (7..transport.request_count())
			.map(|i| transport.batch_events(i).len())
			.sum();
		assert_eq!(delivered, 99);
		// The dropped event is the head of the original queue.
		assert_eq!(transport.batch_events(7)[0], "e1");
	}

	#[tokio::test]
	async fn post_413_retry_bypasses_breaker_gate() {
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response(413),
			ScriptedTransport::response(200),
		]);
		let breaker = BreakerConfig {
			failure_threshold: 1,
			base_cooldown: Duration::from_millis(50),
			jitter_ratio: 0.0,
			..BreakerConfig::default()
		};
		let dispatcher = dispatcher_with(transport.clone(), breaker, 4);

		// Trip the breaker, then let the cooldown elapse so the flush enters
		// as the single half-open probe.
		dispatcher.inner.breaker.on_failure();
		assert_eq!(dispatcher.inner.breaker.state(), BreakerState::Open);
		tokio::time::sleep(Duration::from_millis(60)).await;

		dispatcher.offer(event("a"));
		dispatcher.offer(event("b"));
		dispatcher.flush().await;

		// The 413 shrink retried within the same flush. Had the retry gone
		// back through the gate, the saturated half-open breaker would have
		// parked it on the advisory delay and flush would have returned with
		// the batch still queued.
		assert_eq!(transport.request_count(), 2);
		assert_eq!(dispatcher.debug_info().max_batch_size, 2);
		assert_eq!(dispatcher.queue_len(), 0);
		assert_eq!(dispatcher.debug_info().breaker_state, BreakerState::Closed);
	}

	#[tokio::test]
	async fn fatal_config_clears_queue_and_fires_handler_once() {
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response(401),
			ScriptedTransport::response(401),
		]);
		let dispatcher = dispatcher(transport.clone());

		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		dispatcher.set_fatal_config_handler(Box::new(move |status| {
			sink.lock().unwrap().push(status);
		}));

		for tag in ["a", "b"] {
			dispatcher.offer(event(tag));
		}
		dispatcher.flush().await;

		assert_eq!(dispatcher.queue_len(), 0);
		assert_eq!(*seen.lock().unwrap(), vec![401]);

		// Subsequent offers are dropped silently and never reach the wire.
		dispatcher.offer(event("c"));
		dispatcher.flush().await;
		assert_eq!(transport.request_count(), 1);
		assert_eq!(*seen.lock().unwrap(), vec![401]);
	}

	#[tokio::test]
	async fn non_retryable_4xx_drops_batch_and_continues() {
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response(400),
			ScriptedTransport::response(200),
		]);
		let dispatcher = dispatcher_with(transport.clone(), BreakerConfig::default(), 2);

		for tag in ["a", "b", "c"] {
			dispatcher.offer(event(tag));
		}
		dispatcher.flush().await;

		// First batch [a, b] dropped on 400; [c] delivered by the next loop
		// iteration without any scheduled retry.
		assert_eq!(transport.request_count(), 2);
		assert_eq!(transport.batch_events(1), vec!["c"]);
		assert_eq!(dispatcher.queue_len(), 0);
		assert_eq!(dispatcher.debug_info().breaker_state, BreakerState::Closed);
	}

	#[tokio::test]
	async fn throttle_respects_retry_after_floor() {
		let mut headers = Headers::new();
		headers.insert("Retry-After", "0");
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::response_with_headers(429, headers),
			ScriptedTransport::response(200),
		]);
		let breaker = BreakerConfig {
			failure_threshold: 5,
			..BreakerConfig::default()
		};
		let dispatcher = dispatcher_with(transport.clone(), breaker, 100);

		dispatcher.offer(event("a"));
		let start = std::time::Instant::now();
		dispatcher.flush().await;

		assert_eq!(dispatcher.queue_len(), 1);

		// The retry must not fire before the 1s throttle floor.
		tokio::time::sleep(Duration::from_millis(500)).await;
		assert_eq!(transport.request_count(), 1);

		tokio::time::sleep(Duration::from_millis(800)).await;
		assert_eq!(transport.request_count(), 2);
		assert!(start.elapsed() >= Duration::from_secs(1));
		assert_eq!(dispatcher.queue_len(), 0);
	}

	#[tokio::test]
	async fn flush_is_not_reentrant() {
		let transport = ScriptedTransport::new(vec![]);
		let dispatcher = dispatcher(transport.clone());
		dispatcher.inner.flush_in_flight.store(true, Ordering::SeqCst);

		dispatcher.offer(event("a"));
		dispatcher.flush().await; // guard held: returns immediately

		assert_eq!(transport.request_count(), 0);
		dispatcher.inner.flush_in_flight.store(false, Ordering::SeqCst);
	}

	#[tokio::test]
	async fn auto_flush_triggers_at_threshold() {
		let transport = ScriptedTransport::new(vec![]);
		let dispatcher = Dispatcher::new(
			DispatcherConfig {
				endpoint: "https://collector.test/v1/batch".to_string(),
				auto_flush_threshold: 3,
				..DispatcherConfig::default()
			},
			EventQueue::new(2000, OverflowPolicy::DropOldest),
			CircuitBreaker::new(BreakerConfig::default()),
			transport.clone(),
		);

		for tag in ["a", "b", "c"] {
			dispatcher.offer(event(tag));
		}

		// The threshold flush runs in the background.
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(transport.request_count(), 1);
		assert_eq!(transport.batch_events(0), vec!["a", "b", "c"]);
	}

	#[tokio::test]
	async fn reset_during_flight_drops_batch() {
		// A transport that parks until told to finish, simulating a slow
		// in-flight request.
		struct ParkedTransport {
			release: tokio::sync::Notify,
			requests: AtomicUsize,
		}

		#[async_trait]
		impl HttpTransport for ParkedTransport {
			async fn post_json(
				&self,
				_url: &str,
				_body: Vec<u8>,
				_timeout: Duration,
			) -> Result<TransportResponse, TransportError> {
				self.requests.fetch_add(1, Ordering::SeqCst);
				self.release.notified().await;
				Ok(TransportResponse {
					status: 500,
					headers: Headers::new(),
					body: Vec::new(),
				})
			}
		}

		let transport = Arc::new(ParkedTransport {
			release: tokio::sync::Notify::new(),
			requests: AtomicUsize::new(0),
		});
		let dispatcher = Dispatcher::new(
			DispatcherConfig {
				endpoint: "https://collector.test/v1/batch".to_string(),
				..DispatcherConfig::default()
			},
			EventQueue::new(2000, OverflowPolicy::DropOldest),
			CircuitBreaker::new(BreakerConfig::default()),
			transport.clone(),
		);

		dispatcher.offer(event("a"));
		let inner = Arc::clone(&dispatcher.inner);
		let flight = tokio::spawn(async move { Inner::flush(inner).await });

		// Let the request start, then reset mid-flight and release it.
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(transport.requests.load(Ordering::SeqCst), 1);
		dispatcher.reset();
		transport.release.notify_one();
		flight.await.unwrap();

		// The 500 would normally requeue; the reset generation drops it.
		assert_eq!(dispatcher.queue_len(), 0);
	}

	#[tokio::test]
	async fn periodic_flush_loop_delivers() {
		let transport = ScriptedTransport::new(vec![]);
		let dispatcher = dispatcher(transport.clone());

		dispatcher.offer(event("a"));
		dispatcher.start_flush_loop(Duration::from_secs(1));

		tokio::time::sleep(Duration::from_millis(1300)).await;
		assert_eq!(transport.request_count(), 1);

		dispatcher.stop_flush_loop();
	}
}
