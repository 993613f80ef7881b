// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded FIFO queue of enriched events awaiting delivery.
//!
//! The buffer is in-memory only. All operations are total and atomic with
//! respect to each other; producers enqueue concurrently while the dispatcher
//! drains. None of the operations await, so the lock is a plain
//! `std::sync::Mutex`.

use std::collections::VecDeque;
use std::sync::Mutex;

use metarouter_analytics_core::EnrichedEvent;
use tracing::warn;

/// What to do when an enqueue would exceed capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
	/// Remove the head (oldest event) to make room. The default.
	#[default]
	DropOldest,
	/// Refuse the incoming event.
	DropNewest,
}

/// Bounded FIFO with front-requeue support for retried batches.
#[derive(Debug)]
pub struct EventQueue {
	inner: Mutex<VecDeque<EnrichedEvent>>,
	capacity: usize,
	policy: OverflowPolicy,
}

impl EventQueue {
	/// Creates a queue holding at most `capacity` events (clamped to ≥ 1).
	pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
		Self {
			inner: Mutex::new(VecDeque::new()),
			capacity: capacity.max(1),
			policy,
		}
	}

	/// Appends an event at the tail, applying the overflow policy when full.
	pub fn enqueue(&self, event: EnrichedEvent) {
		let mut queue = self.inner.lock().expect("event queue poisoned");
		if queue.len() >= self.capacity {
			match self.policy {
				OverflowPolicy::DropOldest => {
					if let Some(dropped) = queue.pop_front() {
						warn!(
							message_id = %dropped.message_id,
							capacity = self.capacity,
							"event queue full, dropping oldest event"
						);
					}
				}
				OverflowPolicy::DropNewest => {
					warn!(
						message_id = %event.message_id,
						capacity = self.capacity,
						"event queue full, refusing incoming event"
					);
					return;
				}
			}
		}
		queue.push_back(event);
	}

	/// Removes and returns up to `max` events from the head, in order.
	pub fn drain(&self, max: usize) -> Vec<EnrichedEvent> {
		let mut queue = self.inner.lock().expect("event queue poisoned");
		let count = max.min(queue.len());
		queue.drain(..count).collect()
	}

	/// Reinserts a drained batch at the head, preserving its internal order.
	///
	/// If the reinsertion overflows capacity the just-requeued events are the
	/// ones kept: under drop-oldest the queue tail is discarded, under
	/// drop-newest the events that were sitting behind the batch are.
	pub fn requeue_to_front(&self, batch: Vec<EnrichedEvent>) {
		if batch.is_empty() {
			return;
		}
		let mut queue = self.inner.lock().expect("event queue poisoned");
		let batch_len = batch.len();
		for event in batch.into_iter().rev() {
			queue.push_front(event);
		}
		let excess = queue.len().saturating_sub(self.capacity);
		if excess == 0 {
			return;
		}
		warn!(
			dropped = excess,
			capacity = self.capacity,
			"requeue overflowed queue capacity"
		);
		match self.policy {
			OverflowPolicy::DropOldest => {
				queue.truncate(self.capacity);
			}
			OverflowPolicy::DropNewest => {
				let keep = batch_len.min(self.capacity);
				for _ in 0..excess {
					let _ = queue.remove(keep);
				}
			}
		}
	}

	/// Discards up to `n` events from the head without returning them.
	pub fn drop_front(&self, n: usize) {
		let mut queue = self.inner.lock().expect("event queue poisoned");
		let count = n.min(queue.len());
		queue.drain(..count);
	}

	/// Empties the queue.
	pub fn clear(&self) {
		self.inner.lock().expect("event queue poisoned").clear();
	}

	/// Current number of queued events.
	pub fn len(&self) -> usize {
		self.inner.lock().expect("event queue poisoned").len()
	}

	/// Returns true if no events are queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The configured capacity.
	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
