// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lifecycle controller: wires pipeline startup, foreground/background
//! signals, fatal-config disable and reset.
//!
//! ```text
//! Idle ──initialize──▶ Initializing ──identity loaded──▶ Ready
//! Ready ──fatal config (401/403/404)──▶ Disabled
//! Ready | Disabled ──reset──▶ Resetting ──teardown──▶ Idle
//! ```

use std::sync::{Arc, RwLock};

use tracing::{error, info, warn};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::client::Client;
use crate::context::ContextProvider;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::enrich::Enricher;
use crate::error::ConfigError;
use crate::identity::IdentityStore;
use crate::options::InitOptions;
use crate::queue::{EventQueue, OverflowPolicy};
use crate::store::KeyValueStore;
use crate::transport::HttpTransport;

/// Where the SDK is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Idle,
	Initializing,
	Ready,
	Resetting,
	/// The collector rejected the configuration; every enqueue is dropped
	/// silently until a reset.
	Disabled,
}

/// Shared, cheaply readable lifecycle state. The dispatcher's fatal-config
/// handler and every enqueue path consult it without awaiting.
pub type SharedState = Arc<RwLock<LifecycleState>>;

/// Builds, owns and tears down the delivery pipeline.
pub struct LifecycleController {
	state: SharedState,
	client: tokio::sync::Mutex<Option<Arc<Client>>>,
	transport: Arc<dyn HttpTransport>,
	store: Arc<dyn KeyValueStore>,
	context_provider: Arc<dyn ContextProvider>,
}

impl LifecycleController {
	pub fn new(
		transport: Arc<dyn HttpTransport>,
		store: Arc<dyn KeyValueStore>,
		context_provider: Arc<dyn ContextProvider>,
	) -> Self {
		Self {
			state: Arc::new(RwLock::new(LifecycleState::Idle)),
			client: tokio::sync::Mutex::new(None),
			transport,
			store,
			context_provider,
		}
	}

	pub fn state(&self) -> LifecycleState {
		*self.state.read().expect("lifecycle state poisoned")
	}

	/// The currently wired client, if initialisation has completed.
	pub async fn client(&self) -> Option<Arc<Client>> {
		self.client.lock().await.clone()
	}

	/// Validates `options`, builds the pipeline and brings it to `Ready`.
	/// Returns only after teardown-to-ready completes. Re-initialising an
	/// already-running pipeline returns the existing client unchanged.
	pub async fn initialize(&self, options: InitOptions) -> Result<Arc<Client>, ConfigError> {
		let endpoint = options.validate()?;

		let mut slot = self.client.lock().await;
		match self.state() {
			LifecycleState::Idle => {}
			state => {
				if let Some(existing) = slot.as_ref() {
					warn!(?state, "initialize called while pipeline is active, keeping it");
					return Ok(Arc::clone(existing));
				}
				// Transient states without a client resolve to a fresh build.
			}
		}
		self.set_state(LifecycleState::Initializing);
		if options.debug {
			info!(host = %options.ingestion_host, "initialising analytics in debug mode");
		}

		let identity = Arc::new(IdentityStore::new(Arc::clone(&self.store)));
		identity.load().await;
		if let Some(advertising_id) = options.advertising_id.as_deref() {
			identity.set_advertising_id(Some(advertising_id)).await;
			self.context_provider.clear_cache();
		}

		let queue = EventQueue::new(options.max_queue_events.max(1), OverflowPolicy::DropOldest);
		let breaker = CircuitBreaker::new(BreakerConfig::default());
		let dispatcher = Dispatcher::new(
			DispatcherConfig {
				endpoint,
				..DispatcherConfig::default()
			},
			queue,
			breaker,
			Arc::clone(&self.transport),
		);

		let state = Arc::clone(&self.state);
		dispatcher.set_fatal_config_handler(Box::new(move |status| {
			error!(status, "disabling analytics after fatal configuration response");
			*state.write().expect("lifecycle state poisoned") = LifecycleState::Disabled;
		}));

		let enricher = Enricher::new(
			options.write_key.clone(),
			Arc::clone(&identity),
			Arc::clone(&self.context_provider),
		);

		let client = Arc::new(Client::new(
			Arc::clone(&self.state),
			enricher,
			dispatcher,
			identity,
			options.flush_interval(),
		));
		client.dispatcher().start_flush_loop(options.flush_interval());

		self.set_state(LifecycleState::Ready);
		info!(host = %options.ingestion_host, "analytics pipeline ready");
		*slot = Some(Arc::clone(&client));
		Ok(client)
	}

	/// Foreground signal: restart the flush timer and flush promptly.
	pub async fn on_foreground(&self) {
		if self.state() != LifecycleState::Ready {
			return;
		}
		if let Some(client) = self.client().await {
			client.dispatcher().start_flush_loop(client.flush_interval());
			let flushing = Arc::clone(&client);
			tokio::spawn(async move { flushing.dispatcher().flush().await });
		}
	}

	/// Background signal: flush what we have, then go quiet.
	pub async fn on_background(&self) {
		if let Some(client) = self.client().await {
			client.dispatcher().flush().await;
			client.dispatcher().stop_flush_loop();
			client.dispatcher().cancel_scheduled_retry();
		}
	}

	/// Tears the pipeline down and returns to `Idle`. Completes teardown
	/// before returning; repeated resets are no-ops.
	pub async fn reset(&self) {
		let mut slot = self.client.lock().await;
		if slot.is_none() && self.state() == LifecycleState::Idle {
			return;
		}
		self.set_state(LifecycleState::Resetting);

		if let Some(client) = slot.take() {
			client.dispatcher().reset();
			client.identity().reset().await;
		}
		self.context_provider.clear_cache();

		self.set_state(LifecycleState::Idle);
		info!("analytics pipeline reset");
	}

	fn set_state(&self, state: LifecycleState) {
		*self.state.write().expect("lifecycle state poisoned") = state;
	}
}
