// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The public analytics handle and the lifecycle-resolved client behind it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metarouter_analytics_core::{Call, Context, Properties};
use tracing::debug;

use crate::context::{ContextProvider, StaticContextProvider};
use crate::dispatcher::{Dispatcher, DispatcherDebug};
use crate::enrich::Enricher;
use crate::error::Result;
use crate::identity::IdentityStore;
use crate::lifecycle::{LifecycleController, LifecycleState, SharedState};
use crate::options::InitOptions;
use crate::proxy::{Proxy, ProxySink};
use crate::store::{KeyValueStore, MemoryKeyValueStore};
use crate::transport::{HttpTransport, ReqwestTransport};

/// The bound destination of proxy calls: enrichment plus dispatch.
///
/// Constructed by the lifecycle controller once identity has loaded; not
/// normally touched by applications directly.
pub struct Client {
	state: SharedState,
	enricher: Enricher,
	dispatcher: Dispatcher,
	identity: Arc<IdentityStore>,
	flush_interval: Duration,
}

impl Client {
	pub(crate) fn new(
		state: SharedState,
		enricher: Enricher,
		dispatcher: Dispatcher,
		identity: Arc<IdentityStore>,
		flush_interval: Duration,
	) -> Self {
		Self {
			state,
			enricher,
			dispatcher,
			identity,
			flush_interval,
		}
	}

	pub(crate) fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	pub(crate) fn identity(&self) -> &Arc<IdentityStore> {
		&self.identity
	}

	pub(crate) fn flush_interval(&self) -> Duration {
		self.flush_interval
	}

	pub(crate) fn debug_info(&self) -> DispatcherDebug {
		self.dispatcher.debug_info()
	}

	fn is_deliverable(&self) -> bool {
		*self.state.read().expect("lifecycle state poisoned") == LifecycleState::Ready
	}
}

#[async_trait]
impl ProxySink for Client {
	async fn dispatch(&self, call: Call) {
		if !self.is_deliverable() {
			debug!(kind = %call.kind(), "pipeline not ready, dropping call");
			return;
		}
		let event = self.enricher.enrich(call, None).await;
		self.dispatcher.offer(event);
	}

	async fn flush(&self) {
		self.dispatcher.flush().await;
	}
}

/// Pipeline observability for `debug_info`.
#[derive(Debug, Clone)]
pub struct DebugInfo {
	pub lifecycle: LifecycleState,
	pub queue_len: usize,
	pub flush_in_flight: bool,
	pub breaker_state: crate::breaker::BreakerState,
	pub remaining_cooldown: Duration,
	pub max_batch_size: usize,
}

/// Builder wiring the platform seams before initialisation.
///
/// # Example
///
/// ```ignore
/// use metarouter_analytics::{Analytics, InitOptions, Properties};
///
/// let analytics = Analytics::builder().build();
/// analytics
///     .initialize(InitOptions::new("wk_live_abc", "https://ingest.example.com"))
///     .await?;
///
/// analytics
///     .track("Order Completed", Properties::new().insert("total", 42.5))
///     .await;
/// ```
pub struct AnalyticsBuilder {
	transport: Option<Arc<dyn HttpTransport>>,
	store: Option<Arc<dyn KeyValueStore>>,
	context_provider: Option<Arc<dyn ContextProvider>>,
}

impl AnalyticsBuilder {
	pub fn new() -> Self {
		Self {
			transport: None,
			store: None,
			context_provider: None,
		}
	}

	/// Swaps the HTTP transport; tests use scripted implementations.
	pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Swaps the persistent key-value store backing identity.
	pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.store = Some(store);
		self
	}

	/// Swaps the context provider.
	pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
		self.context_provider = Some(provider);
		self
	}

	/// Builds the handle in the `Idle` state. Calls made before
	/// `initialize` completes are buffered and replayed in order.
	pub fn build(self) -> Analytics {
		let transport = self
			.transport
			.unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
		let store = self
			.store
			.unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
		let context_provider = self
			.context_provider
			.unwrap_or_else(|| Arc::new(StaticContextProvider::new(Context::default())));

		Analytics {
			proxy: Arc::new(Proxy::new()),
			lifecycle: Arc::new(LifecycleController::new(
				transport,
				store,
				context_provider,
			)),
		}
	}
}

impl Default for AnalyticsBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// The application-facing analytics handle.
///
/// Semantic calls are accepted from any task at any time: before
/// initialisation they land in a small replay buffer, afterwards they flow
/// straight into the delivery pipeline. Delivery failures never surface here.
pub struct Analytics {
	proxy: Arc<Proxy>,
	lifecycle: Arc<LifecycleController>,
}

impl Analytics {
	pub fn builder() -> AnalyticsBuilder {
		AnalyticsBuilder::new()
	}

	/// Validates `options`, brings the pipeline to `Ready` and replays any
	/// buffered calls. The only failure mode is invalid options.
	pub async fn initialize(&self, options: InitOptions) -> Result<()> {
		let client = self.lifecycle.initialize(options).await?;
		self.proxy.bind(client).await;
		Ok(())
	}

	/// Records a named action.
	pub async fn track(&self, event: impl Into<String>, properties: Properties) {
		self.proxy
			.dispatch(Call::Track {
				event: event.into(),
				properties: some_if_set(properties),
			})
			.await;
	}

	/// Links the session to an authenticated user.
	pub async fn identify(&self, user_id: impl Into<String>, traits: Properties) {
		self.proxy
			.dispatch(Call::Identify {
				user_id: user_id.into(),
				traits: some_if_set(traits),
			})
			.await;
	}

	/// Associates the user with a group.
	pub async fn group(&self, group_id: impl Into<String>, traits: Properties) {
		self.proxy
			.dispatch(Call::Group {
				group_id: group_id.into(),
				traits: some_if_set(traits),
			})
			.await;
	}

	/// Records a screen view.
	pub async fn screen(&self, name: impl Into<String>, properties: Properties) {
		self.proxy
			.dispatch(Call::Screen {
				name: name.into(),
				properties: some_if_set(properties),
			})
			.await;
	}

	/// Records a page view.
	pub async fn page(&self, name: impl Into<String>, properties: Properties) {
		self.proxy
			.dispatch(Call::Page {
				name: name.into(),
				properties: some_if_set(properties),
			})
			.await;
	}

	/// Renames the user id.
	pub async fn alias(&self, new_user_id: impl Into<String>) {
		self.proxy
			.dispatch(Call::Alias {
				new_user_id: new_user_id.into(),
			})
			.await;
	}

	/// Forces a delivery attempt of everything queued.
	pub async fn flush(&self) {
		self.proxy.flush().await;
	}

	/// Tears the pipeline down, clears queued events and persisted identity,
	/// and returns to `Idle`. Completes teardown before returning.
	pub async fn reset(&self) {
		self.proxy.unbind().await;
		self.lifecycle.reset().await;
	}

	/// Platform foreground signal: resume the flush timer and flush promptly.
	pub async fn on_foreground(&self) {
		self.lifecycle.on_foreground().await;
	}

	/// Platform background signal: final flush, then stop timers.
	pub async fn on_background(&self) {
		self.lifecycle.on_background().await;
	}

	/// Current lifecycle state.
	pub fn lifecycle_state(&self) -> LifecycleState {
		self.lifecycle.state()
	}

	/// Pipeline observability snapshot.
	pub async fn debug_info(&self) -> DebugInfo {
		let lifecycle = self.lifecycle.state();
		match self.lifecycle.client().await {
			Some(client) => {
				let dispatcher = client.debug_info();
				DebugInfo {
					lifecycle,
					queue_len: dispatcher.queue_len,
					flush_in_flight: dispatcher.flush_in_flight,
					breaker_state: dispatcher.breaker_state,
					remaining_cooldown: dispatcher.remaining_cooldown,
					max_batch_size: dispatcher.max_batch_size,
				}
			}
			None => DebugInfo {
				lifecycle,
				queue_len: 0,
				flush_in_flight: false,
				breaker_state: crate::breaker::BreakerState::Closed,
				remaining_cooldown: Duration::ZERO,
				max_batch_size: 0,
			},
		}
	}
}

/// Empty property sets are passed along as absent.
fn some_if_set(properties: Properties) -> Option<Properties> {
	if properties.is_empty() {
		None
	} else {
		Some(properties)
	}
}
