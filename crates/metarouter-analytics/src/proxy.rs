// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Thread-safe front-end that accepts calls before the pipeline is ready.
//!
//! While unbound, calls are recorded in a small bounded buffer; `bind` replays
//! them in order into the client and flips to direct forwarding. The single
//! mutex is the serialisation point: replay happens under it, so a call that
//! arrives after `bind` completes can never overtake a buffered one.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use metarouter_analytics_core::Call;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Pre-ready calls kept while unbound. Deliberately small: the buffer exists
/// to absorb the startup window, not to be a second queue.
const REPLAY_BUFFER_CAPACITY: usize = 20;

/// Destination of forwarded calls. Implemented by the SDK client; tests plug
/// in recorders.
#[async_trait]
pub trait ProxySink: Send + Sync {
	async fn dispatch(&self, call: Call);
	async fn flush(&self);
}

/// A call captured while unbound.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferedCall {
	Call(Call),
	Flush,
}

enum ProxyState {
	Unbound { buffer: VecDeque<BufferedCall> },
	Bound { sink: Arc<dyn ProxySink> },
}

/// Public façade ahead of the lifecycle-resolved client.
pub struct Proxy {
	state: Mutex<ProxyState>,
}

impl Proxy {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(ProxyState::Unbound {
				buffer: VecDeque::new(),
			}),
		}
	}

	/// Forwards a call when bound; records it when not. The forward happens
	/// under the state lock so the lock-acquisition order is the order events
	/// reach the client.
	pub async fn dispatch(&self, call: Call) {
		let mut state = self.state.lock().await;
		match &mut *state {
			ProxyState::Unbound { buffer } => {
				Self::buffer_call(buffer, BufferedCall::Call(call));
			}
			ProxyState::Bound { sink } => sink.dispatch(call).await,
		}
	}

	/// Forwards a flush when bound; records it when not.
	pub async fn flush(&self) {
		let mut state = self.state.lock().await;
		match &mut *state {
			ProxyState::Unbound { buffer } => {
				Self::buffer_call(buffer, BufferedCall::Flush);
			}
			ProxyState::Bound { sink } => sink.flush().await,
		}
	}

	/// Flips to bound and replays every buffered call, in order, before
	/// returning. Calls arriving concurrently serialise behind the replay.
	pub async fn bind(&self, sink: Arc<dyn ProxySink>) {
		let mut state = self.state.lock().await;
		let buffered = match &mut *state {
			ProxyState::Unbound { buffer } => std::mem::take(buffer),
			ProxyState::Bound { .. } => VecDeque::new(),
		};
		if !buffered.is_empty() {
			debug!(count = buffered.len(), "replaying buffered calls");
		}
		for call in buffered {
			match call {
				BufferedCall::Call(call) => sink.dispatch(call).await,
				BufferedCall::Flush => sink.flush().await,
			}
		}
		*state = ProxyState::Bound { sink };
	}

	/// Flips back to unbound with an empty buffer.
	pub async fn unbind(&self) {
		let mut state = self.state.lock().await;
		*state = ProxyState::Unbound {
			buffer: VecDeque::new(),
		};
	}

	/// True once `bind` has completed.
	pub async fn is_bound(&self) -> bool {
		matches!(*self.state.lock().await, ProxyState::Bound { .. })
	}

	/// Number of calls waiting for a bind.
	pub async fn buffered_len(&self) -> usize {
		match &*self.state.lock().await {
			ProxyState::Unbound { buffer } => buffer.len(),
			ProxyState::Bound { .. } => 0,
		}
	}

	fn buffer_call(buffer: &mut VecDeque<BufferedCall>, call: BufferedCall) {
		if buffer.len() >= REPLAY_BUFFER_CAPACITY {
			warn!("pre-ready buffer full, dropping oldest call");
			buffer.pop_front();
		}
		buffer.push_back(call);
	}
}

impl Default for Proxy {
	fn default() -> Self {
		Self::new()
	}
}
